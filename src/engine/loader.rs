//! Template source loaders

use super::error::Error;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Finds template sources by name
///
/// `resolve` turns a name (possibly relative to the referencing template
/// `base`) into the path handed to `open`. The resolved path also serves as the
/// cache key.
pub trait Loader: fmt::Debug + Send + Sync {
    fn resolve(&self, base: Option<&str>, name: &str) -> String;
    fn open(&self, path: &str) -> Result<String, Error>;
}

/// Loads templates from disk
///
/// With a base directory every name is resolved against it. Without one,
/// names are resolved relative to the directory of the referencing template
/// (or the working directory for top-level loads).
#[derive(Debug, Clone, Default)]
pub struct FileSystemLoader {
    base_dir: Option<PathBuf>,
}

impl FileSystemLoader {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Names of all template files below the base directory, relative to it
    pub fn template_names(&self) -> Vec<String> {
        let Some(base) = &self.base_dir else {
            return Vec::new();
        };
        let mut names: Vec<String> = WalkDir::new(base)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(base)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        names.sort();
        names
    }
}

impl Loader for FileSystemLoader {
    fn resolve(&self, base: Option<&str>, name: &str) -> String {
        let path = Path::new(name);
        if path.is_absolute() {
            return name.to_string();
        }
        let resolved = match (&self.base_dir, base) {
            (Some(dir), _) => dir.join(path),
            (None, Some(base)) => match Path::new(base).parent() {
                Some(parent) => parent.join(path),
                None => path.to_path_buf(),
            },
            (None, None) => path.to_path_buf(),
        };
        resolved.to_string_lossy().into_owned()
    }

    fn open(&self, path: &str) -> Result<String, Error> {
        fs::read_to_string(path).map_err(|e| Error::loader(path, e.to_string()))
    }
}

/// Templates held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, source: &str) {
        self.templates.insert(name.to_string(), source.to_string());
    }

    pub fn with(mut self, name: &str, source: &str) -> Self {
        self.insert(name, source);
        self
    }
}

impl Loader for MemoryLoader {
    fn resolve(&self, _base: Option<&str>, name: &str) -> String {
        name.to_string()
    }

    fn open(&self, path: &str) -> Result<String, Error> {
        self.templates
            .get(path)
            .cloned()
            .ok_or_else(|| Error::loader(path, "no such template in memory"))
    }
}
