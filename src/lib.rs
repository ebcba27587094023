//! tessera: a Django-syntax template engine
//!
//! Templates are compiled once into an AST and rendered against a [`Context`]
//! any number of times, possibly from several threads. Compilation, loading,
//! the filter/tag registries and the template cache are grouped in a
//! [`TemplateSet`]; sets are independent, so differently sandboxed engines can
//! coexist in one process.
//!
//! ```no_run
//! use tessera::Context;
//!
//! let tpl = tessera::compile("hello", "Hello {{ name|title }}!").unwrap();
//! let mut ctx = Context::new();
//! ctx.insert("name", "world");
//! assert_eq!(tpl.execute(&ctx).unwrap(), "Hello World!");
//! ```

pub mod commands;
pub mod config;
pub mod engine;
pub mod filters;
mod tags;

pub use config::SetConfig;
pub use engine::{
    Context, Error, FileSystemLoader, Function, Loader, MemoryLoader, Object, ParamKind, Template,
    TemplateSet, Value,
};

use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    static ref DEFAULT_SET: TemplateSet = TemplateSet::default();
}

/// The shared set holding only the built-in tags and filters
pub fn default_set() -> &'static TemplateSet {
    &DEFAULT_SET
}

/// Compile a template on the default set
pub fn compile(name: &str, source: &str) -> Result<Arc<Template>, Error> {
    DEFAULT_SET.compile(name, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn test_compile_on_default_set() {
        let tpl = compile("greeting", "Hello {{ name|title }}!").unwrap();
        let mut ctx = Context::new();
        ctx.insert("name", "world");
        assert_eq!(tpl.execute(&ctx).unwrap(), "Hello World!");
        assert_eq!(default_set().name(), "default");
    }

    #[test]
    fn test_concurrent_renders_share_a_template() {
        let tpl = compile(
            "loop",
            "{% for x in items %}{% set last = x %}{{ x }}{% endfor %}{{ last }}",
        )
        .unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tpl = Arc::clone(&tpl);
                thread::spawn(move || {
                    let mut ctx = Context::new();
                    ctx.insert("items", vec![i, i + 1]);
                    tpl.execute(&ctx).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let i = i as i32;
            assert_eq!(handle.join().unwrap(), format!("{}{}", i, i + 1));
        }
    }

    #[test]
    fn test_renders_are_deterministic() {
        let loader = MemoryLoader::new().with("row", "<{{ k }}={{ v }}>");
        let set = TemplateSet::new("stable", vec![Arc::new(loader)]);
        let tpl = set
            .compile(
                "page",
                "{% for k, v in scores %}{% include \"row\" %}{% endfor %}|{% for n in nums sorted %}{{ n }}{% endfor %}",
            )
            .unwrap();

        let render = || {
            let scores: HashMap<String, i32> = (0..20).map(|i| (format!("k{:02}", i), i)).collect();
            let mut ctx = Context::new();
            ctx.insert_serialize("scores", &scores).unwrap();
            ctx.insert("nums", vec![3, 1, 2]);
            tpl.execute(&ctx).unwrap()
        };

        let first = render();
        assert!(first.starts_with("<k00=0><k01=1>"));
        assert!(first.ends_with("|123"));
        for _ in 0..5 {
            assert_eq!(render(), first);
        }
    }

    #[test]
    fn test_escaping_end_to_end() {
        let tpl = compile("esc", "{{ a }} {{ a|safe }} {{ a|escape|escape }}").unwrap();
        let mut ctx = Context::new();
        ctx.insert("a", "<&>");
        assert_eq!(tpl.execute(&ctx).unwrap(), "&lt;&amp;&gt; <&> &lt;&amp;&gt;");
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let ctx = Context::new();
        assert!(compile("div", "{{ 10 / 0 }}").unwrap().execute(&ctx).is_err());
        assert!(compile("mod", "{{ 10 % 0 }}").unwrap().execute(&ctx).is_err());
    }
}
