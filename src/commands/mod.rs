//! Subcommands of the `tessera` binary

pub mod check;
pub mod render;
pub mod tokens;

use crate::config::SetConfig;
use crate::engine::{Context, Error, TemplateSet};
use anyhow::{anyhow, bail, Context as _, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Load the set configuration, adding extra template directories
pub fn load_config(config: Option<&Path>, dirs: &[PathBuf]) -> Result<SetConfig> {
    let mut config = match config {
        Some(path) => SetConfig::load(path)?,
        None => SetConfig::default(),
    };
    config.template_dirs.extend(dirs.iter().cloned());
    Ok(config)
}

/// Read a render context from a JSON, YAML or TOML file
pub fn load_context(path: &Path) -> Result<Context> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file {:?}", path))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let json: serde_json::Value = match extension.as_str() {
        "json" => serde_json::from_str(&content)?,
        "yml" | "yaml" => serde_yaml::from_str(&content)?,
        "toml" => toml::from_str(&content)?,
        other => bail!("Unsupported context format '{}' for {:?}", other, path),
    };
    Ok(Context::from_json(json)?)
}

/// Attach the offending source line to an engine error
pub fn describe(set: &TemplateSet, error: Error) -> anyhow::Error {
    match set.raw_line(&error) {
        Some(line) => anyhow!("{}\n    | {}", error, line),
        None => anyhow!(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_context_formats() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("ctx.json");
        fs::write(&json, r#"{"title": "Hi", "tags": ["a", "b"]}"#).unwrap();
        let yaml = dir.path().join("ctx.yaml");
        fs::write(&yaml, "title: Hi\ncount: 3\n").unwrap();
        let toml_path = dir.path().join("ctx.toml");
        fs::write(&toml_path, "title = \"Hi\"\n[author]\nname = \"Ann\"\n").unwrap();

        let ctx = load_context(&json).unwrap();
        assert_eq!(ctx.get("tags").unwrap().to_string(), "[a, b]");
        let ctx = load_context(&yaml).unwrap();
        assert_eq!(ctx.get("count").unwrap().to_string(), "3");
        let ctx = load_context(&toml_path).unwrap();
        assert_eq!(ctx.get("author").unwrap().to_string(), "{name: Ann}");
    }

    #[test]
    fn test_load_context_rejects_lists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ctx.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(load_context(&path).is_err());
        assert!(load_context(&dir.path().join("ctx.ini")).is_err());
    }

    #[test]
    fn test_load_config_adds_dirs() {
        let config = load_config(None, &[PathBuf::from("templates")]).unwrap();
        assert_eq!(config.template_dirs, vec![PathBuf::from("templates")]);
        assert!(config.autoescape);
    }
}
