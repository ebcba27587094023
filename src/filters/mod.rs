//! Built-in filters
//!
//! A filter receives the piped value and an optional argument and returns a new
//! value. Filters keep a string's safe marking only when the transformation
//! cannot introduce markup.

mod date;
mod html;
mod list;
mod logic;
mod number;
mod string;

pub use date::format_datetime;
pub use html::{html_escape, MAX_TAG_STRIP_PASSES};

use crate::engine::{Error, Registry, Value};
use std::sync::Arc;

type Filter = fn(&Value, Option<&Value>) -> Result<Value, Error>;

const BUILTINS: &[(&str, Filter)] = &[
    // html
    ("safe", html::safe),
    ("escape", html::escape),
    ("striptags", html::striptags),
    ("removetags", html::removetags),
    ("linebreaks", html::linebreaks),
    ("linebreaksbr", html::linebreaksbr),
    ("escapejs", html::escapejs),
    ("markdown", html::markdown),
    // strings
    ("upper", string::upper),
    ("lower", string::lower),
    ("title", string::title),
    ("capfirst", string::capfirst),
    ("cut", string::cut),
    ("truncatechars", string::truncatechars),
    ("truncatewords", string::truncatewords),
    ("wordcount", string::wordcount),
    ("wordwrap", string::wordwrap),
    ("center", string::center),
    ("ljust", string::ljust),
    ("rjust", string::rjust),
    ("slugify", string::slugify),
    ("urlencode", string::urlencode),
    // sequences
    ("length", list::length),
    ("length_is", list::length_is),
    ("first", list::first),
    ("last", list::last),
    ("join", list::join),
    ("slice", list::slice),
    ("make_list", list::make_list),
    // logic
    ("default", logic::default),
    ("default_if_none", logic::default_if_none),
    ("yesno", logic::yesno),
    ("pluralize", logic::pluralize),
    // numbers
    ("add", number::add),
    ("integer", number::integer),
    ("float", number::float),
    ("floatformat", number::floatformat),
    ("divisibleby", number::divisibleby),
    // dates
    ("date", date::date),
];

pub(crate) fn register_builtins(registry: &mut Registry) {
    for (name, filter) in BUILTINS {
        registry.insert_filter(name, Arc::new(*filter));
    }
}

/// The argument of a filter that cannot run without one
pub(crate) fn required(arg: Option<&Value>) -> Result<&Value, Error> {
    arg.ok_or_else(|| Error::execution("an argument is required"))
}

/// A string result carrying over the input's safe marking
pub(crate) fn like_input(input: &Value, s: String) -> Value {
    if input.is_safe() {
        Value::safe(s)
    } else {
        Value::from(s)
    }
}

/// A non-negative count argument such as a width or a length
pub(crate) fn count_arg(arg: Option<&Value>) -> Result<usize, Error> {
    let n = required(arg)?.to_integer();
    Ok(usize::try_from(n).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use crate::engine::{Context, TemplateSet};

    fn render(src: &str, ctx: &Context) -> String {
        let set = TemplateSet::new("filters", Vec::new());
        set.from_string(src).unwrap().execute(ctx).unwrap()
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let mut names: Vec<&str> = super::BUILTINS.iter().map(|(n, _)| *n).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_filters_in_templates() {
        let mut ctx = Context::new();
        ctx.insert("name", "<b>ada lovelace</b>");
        ctx.insert("items", vec![3, 1, 2]);
        assert_eq!(
            render("{{ name|striptags|title }}", &ctx),
            "Ada Lovelace"
        );
        assert_eq!(render("{{ name|upper }}", &ctx), "&lt;B&gt;ADA LOVELACE&lt;/B&gt;");
        assert_eq!(render("{{ name|safe|upper }}", &ctx), "<B>ADA LOVELACE</B>");
        assert_eq!(render("{{ items|join:\", \" }}", &ctx), "3, 1, 2");
        assert_eq!(render("{{ missing|default:\"n/a\" }}", &ctx), "n/a");
        assert_eq!(render("{{ items|length|add:1 }}", &ctx), "4");
    }

    #[test]
    fn test_filter_error_names_the_filter() {
        let set = TemplateSet::new("filters", Vec::new());
        let tpl = set.from_string("{{ 4|divisibleby:0 }}").unwrap();
        let err = tpl.execute(&Context::new()).unwrap_err();
        assert!(err.to_string().contains("filter 'divisibleby'"));
        assert_eq!(err.position().map(|p| p.column), Some(6));
    }
}
