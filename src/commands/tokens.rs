//! Dump the token stream of a template

use anyhow::{Context as _, Result};
use std::fs;
use std::path::Path;

use super::load_config;
use crate::engine::{Lexer, TokenKind};

/// One line per token: `line:column kind`
pub fn dump(path: &Path, config: Option<&Path>) -> Result<Vec<String>> {
    let config = load_config(config, &[])?;
    let source =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let name = path.to_string_lossy();
    let tokens = Lexer::new(&name, &source)
        .with_options(config.lexer_options())
        .tokenize()?;

    Ok(tokens
        .iter()
        .map(|token| match token.kind {
            TokenKind::Html => format!("{}:{} text {:?}", token.line, token.column, token.val),
            _ => format!("{}:{} {}", token.line, token.column, token),
        })
        .collect())
}

pub fn run(path: &Path, config: Option<&Path>) -> Result<()> {
    for line in dump(path, config)? {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dump_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.html");
        fs::write(&path, "Hi {{ name|upper }}\n{% if x %}y{% endif %}").unwrap();
        let lines = dump(&path, None).unwrap();
        assert_eq!(lines[0], "1:1 text \"Hi \"");
        assert_eq!(lines[1], "1:4 '{{'");
        assert_eq!(lines[2], "1:7 identifier 'name'");
        assert!(lines.contains(&"2:1 '{%'".to_string()));
        assert!(lines.contains(&"2:4 identifier 'if'".to_string()));
    }

    #[test]
    fn test_dump_lex_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.html");
        fs::write(&path, "{{ \"open }}").unwrap();
        assert!(dump(&path, None).is_err());
    }
}
