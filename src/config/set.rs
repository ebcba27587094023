//! Template set configuration (tessera.yml / tessera.toml)

use crate::engine::lexer::LexerOptions;
use crate::engine::template::RenderOptions;
use anyhow::{bail, Context as _, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings of a template set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetConfig {
    // Output
    pub autoescape: bool,
    pub trim_blocks: bool,
    pub lstrip_blocks: bool,

    // Caching
    /// Recompile templates on every load instead of caching them
    pub debug: bool,

    // Limits
    pub max_recursion_depth: usize,
    pub max_expression_depth: usize,
    /// Deepest allowed nesting of block tags such as `if`, `for` or `with`
    pub max_nesting_depth: usize,

    // Loading
    pub template_dirs: Vec<PathBuf>,

    // Sandbox
    pub banned_filters: Vec<String>,
    pub banned_tags: Vec<String>,

    /// Values visible to every template of the set
    pub globals: IndexMap<String, serde_json::Value>,
}

impl Default for SetConfig {
    fn default() -> Self {
        Self {
            autoescape: true,
            trim_blocks: false,
            lstrip_blocks: false,
            debug: false,
            max_recursion_depth: 100,
            max_expression_depth: 150,
            max_nesting_depth: 64,
            template_dirs: Vec::new(),
            banned_filters: Vec::new(),
            banned_tags: Vec::new(),
            globals: IndexMap::new(),
        }
    }
}

impl SetConfig {
    /// Load configuration from a YAML, TOML or JSON file, chosen by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut config: SetConfig = match extension.as_str() {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            other => bail!("Unsupported config format '{}' for {:?}", other, path),
        };

        // template directories are relative to the config file
        if let Some(base) = path.parent() {
            for dir in &mut config.template_dirs {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }

        tracing::debug!("Loaded set config from {:?}", path);
        Ok(config)
    }

    pub fn lexer_options(&self) -> LexerOptions {
        LexerOptions {
            trim_blocks: self.trim_blocks,
            lstrip_blocks: self.lstrip_blocks,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            autoescape: self.autoescape,
            max_recursion_depth: self.max_recursion_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SetConfig::default();
        assert!(config.autoescape);
        assert!(!config.debug);
        assert_eq!(config.max_recursion_depth, 100);
        assert_eq!(config.max_nesting_depth, 64);
        assert!(config.template_dirs.is_empty());
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
autoescape: false
trim_blocks: true
banned_filters: [markdown]
globals:
  site: Example
  year: 2024
"#;
        let config: SetConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.autoescape);
        assert!(config.trim_blocks);
        assert_eq!(config.banned_filters, vec!["markdown".to_string()]);
        assert_eq!(config.globals["site"], serde_json::json!("Example"));
        assert_eq!(config.max_recursion_depth, 100);
    }

    #[test]
    fn test_load_toml_resolves_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tessera.toml");
        fs::write(
            &path,
            "template_dirs = [\"templates\"]\nbanned_tags = [\"include\"]\n",
        )
        .unwrap();

        let config = SetConfig::load(&path).unwrap();
        assert_eq!(config.template_dirs, vec![dir.path().join("templates")]);
        assert_eq!(config.banned_tags, vec!["include".to_string()]);
    }

    #[test]
    fn test_load_rejects_unknown_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tessera.ini");
        fs::write(&path, "autoescape = false").unwrap();
        assert!(SetConfig::load(&path).is_err());
    }
}
