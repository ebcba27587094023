//! Compile every template under a directory and report failures

use anyhow::{bail, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{describe, load_config};
use crate::engine::TemplateSet;

pub const DEFAULT_PATTERN: &str = "**/*.html";

#[derive(Debug, Default)]
pub struct CheckReport {
    pub checked: usize,
    pub failures: Vec<(PathBuf, String)>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Compile all templates below `root` whose relative path matches one of `patterns`
pub fn check(root: &Path, patterns: &[String], config: Option<&Path>) -> Result<CheckReport> {
    let patterns = if patterns.is_empty() {
        vec![Pattern::new(DEFAULT_PATTERN)?]
    } else {
        patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()?
    };
    let config = load_config(config, &[root.to_path_buf()])?;
    let set = TemplateSet::with_config("check", config)?;
    let mut report = CheckReport::default();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let relative = match entry.path().strip_prefix(root) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        if !patterns.iter().any(|p| p.matches_path(relative)) {
            continue;
        }

        let name = relative.to_string_lossy().replace('\\', "/");
        report.checked += 1;
        match set.from_file(&name) {
            Ok(_) => tracing::debug!("{} ok", name),
            Err(e) => {
                let message = describe(&set, e).to_string();
                tracing::warn!("{}", message);
                report.failures.push((relative.to_path_buf(), message));
            }
        }
    }

    Ok(report)
}

pub fn run(root: &Path, patterns: &[String], config: Option<&Path>) -> Result<()> {
    let report = check(root, patterns, config)?;
    for (path, message) in &report.failures {
        println!("  {}: {}", path.display(), message);
    }
    if !report.is_ok() {
        bail!(
            "{} of {} templates failed to compile",
            report.failures.len(),
            report.checked
        );
    }
    println!("Checked {} templates", report.checked);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_check_reports_failures() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("partials")).unwrap();
        fs::write(dir.path().join("base.html"), "{% block body %}{% endblock %}").unwrap();
        fs::write(
            dir.path().join("page.html"),
            "{% extends \"base.html\" %}{% block body %}{{ x }}{% endblock %}",
        )
        .unwrap();
        fs::write(dir.path().join("partials/bad.html"), "{% if x %}unclosed").unwrap();
        fs::write(dir.path().join("notes.txt"), "{% if %}").unwrap();

        let report = check(dir.path(), &[], None).unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, PathBuf::from("partials/bad.html"));
        assert!(run(dir.path(), &[], None).is_err());
    }

    #[test]
    fn test_check_clean_tree() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.tpl"), "{{ a|default:\"x\" }}").unwrap();
        fs::write(dir.path().join("b.txt"), "{{ b }}").unwrap();
        let patterns = vec!["*.tpl".to_string(), "*.txt".to_string()];
        let report = check(dir.path(), &patterns, None).unwrap();
        assert_eq!(report.checked, 2);
        assert!(report.is_ok());
    }
}
