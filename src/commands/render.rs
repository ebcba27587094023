//! Render a template to stdout or a file

use anyhow::{Context as _, Result};
use std::fs;
use std::path::PathBuf;

use super::{describe, load_config, load_context};
use crate::engine::{Context, TemplateSet};

/// Options of the `render` subcommand
#[derive(Debug, Default, Clone)]
pub struct RenderArgs {
    pub template: String,
    pub context: Option<PathBuf>,
    pub dirs: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub ban_filters: Vec<String>,
    pub ban_tags: Vec<String>,
    pub no_autoescape: bool,
    pub output: Option<PathBuf>,
}

/// Render the template and return its output
pub fn render(args: &RenderArgs) -> Result<String> {
    let mut config = load_config(args.config.as_deref(), &args.dirs)?;
    config.banned_filters.extend(args.ban_filters.iter().cloned());
    config.banned_tags.extend(args.ban_tags.iter().cloned());
    if args.no_autoescape {
        config.autoescape = false;
    }

    let set = TemplateSet::with_config("cli", config)?;
    let context = match &args.context {
        Some(path) => load_context(path)?,
        None => Context::new(),
    };

    let template = set
        .from_file(&args.template)
        .map_err(|e| describe(&set, e))?;
    tracing::debug!("Compiled {}", template.name());
    template.execute(&context).map_err(|e| describe(&set, e))
}

pub fn run(args: &RenderArgs) -> Result<()> {
    let output = render(args)?;
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &output).with_context(|| format!("Failed to write {:?}", path))?;
            tracing::info!("Rendered {} to {:?}", args.template, path);
        }
        None => print!("{}", output),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(
            dir.path().join("templates/base.html"),
            "<title>{% block title %}Site{% endblock %}</title>",
        )
        .unwrap();
        fs::write(
            dir.path().join("templates/page.html"),
            "{% extends \"base.html\" %}{% block title %}{{ title }} | {{ block.Super }}{% endblock %}",
        )
        .unwrap();
        fs::write(dir.path().join("ctx.json"), r#"{"title": "A & B"}"#).unwrap();
        dir
    }

    #[test]
    fn test_render_with_context() {
        let dir = site();
        let args = RenderArgs {
            template: "page.html".to_string(),
            context: Some(dir.path().join("ctx.json")),
            dirs: vec![dir.path().join("templates")],
            ..Default::default()
        };
        assert_eq!(render(&args).unwrap(), "<title>A &amp; B | Site</title>");

        let raw = RenderArgs {
            no_autoescape: true,
            ..args
        };
        assert_eq!(render(&raw).unwrap(), "<title>A & B | Site</title>");
    }

    #[test]
    fn test_render_to_file() {
        let dir = site();
        let out = dir.path().join("public/page.html");
        let args = RenderArgs {
            template: "base.html".to_string(),
            dirs: vec![dir.path().join("templates")],
            output: Some(out.clone()),
            ..Default::default()
        };
        run(&args).unwrap();
        assert_eq!(fs::read_to_string(out).unwrap(), "<title>Site</title>");
    }

    #[test]
    fn test_render_banned_filter() {
        let dir = site();
        fs::write(dir.path().join("templates/up.html"), "{{ title|upper }}").unwrap();
        let args = RenderArgs {
            template: "up.html".to_string(),
            dirs: vec![dir.path().join("templates")],
            ban_filters: vec!["upper".to_string()],
            ..Default::default()
        };
        let err = render(&args).unwrap_err().to_string();
        assert!(err.contains("upper"), "{}", err);
        assert!(err.contains("| {{ title|upper }}"), "{}", err);
    }
}
