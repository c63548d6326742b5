use std::sync::OnceLock;

use minijinja::Environment;
use regex::Regex;

use crate::mapping::Record;

fn environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(Environment::new)
}

// `{{ .file }}` → `{{ file }}`. Mappings written against text-template
// style engines use leading-dot references; accept both forms.
fn dot_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{(\s*)\.([A-Za-z_][A-Za-z0-9_]*)").expect("dot ref pattern compiles")
    })
}

/// Renders a mapping template against a parsed record.
///
/// Lookups of keys absent from the record render as the empty string (the
/// mapping layer treats that as the type-appropriate zero).
pub fn render_template(source: &str, record: &Record) -> Result<String, minijinja::Error> {
    let normalized = dot_ref_regex().replace_all(source, "{{$1$2");
    environment().render_str(&normalized, minijinja::Value::from_serialize(record))
}
