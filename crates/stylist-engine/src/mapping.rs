use stylist_types::{Finding, MappingSpec, ResultLevel, NO_VALUE};

use crate::template::render_template;

/// A record parsed from command output: an open-ended dictionary of fields
/// surfaced by the regexp or JSON parser. The type system closes back up at
/// the [`Finding`] boundary via the mapping templates.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("template: {0}")]
    Template(#[from] minijinja::Error),

    #[error("expected integer, got {value:?}")]
    IntCoercion { value: String },
}

/// Projects parsed records onto findings using the mapping's templates.
pub fn to_findings(spec: &MappingSpec, records: &[Record]) -> Result<Vec<Finding>, MappingError> {
    records.iter().map(|r| to_finding(spec, r)).collect()
}

fn to_finding(spec: &MappingSpec, record: &Record) -> Result<Finding, MappingError> {
    let mut finding = Finding {
        level: render_level(&spec.level, record)?,
        ..Default::default()
    };

    finding.location.path = render_string(&spec.path, record)?;
    finding.location.start_line = render_int(&spec.start_line, record)?;
    finding.location.start_column = render_int(&spec.start_column, record)?;
    finding.location.end_line = render_int(&spec.end_line, record)?;
    finding.location.end_column = render_int(&spec.end_column, record)?;

    finding.rule.id = render_string(&spec.rule_id, record)?;
    finding.rule.name = render_string(&spec.rule_name, record)?;
    finding.rule.description = render_string(&spec.rule_description, record)?;
    finding.rule.uri = render_string(&spec.rule_uri, record)?;

    finding.context_lines = render_lines(&spec.context, record)?;

    Ok(finding)
}

fn render_level(
    template: &Option<String>,
    record: &Record,
) -> Result<ResultLevel, MappingError> {
    let rendered = render_string(template, record)?;
    Ok(ResultLevel::coerce(&rendered))
}

fn render_string(template: &Option<String>, record: &Record) -> Result<String, MappingError> {
    let Some(template) = template else {
        return Ok(String::new());
    };
    let rendered = render_template(template, record)?;
    if rendered == NO_VALUE {
        return Ok(String::new());
    }
    Ok(rendered)
}

fn render_int(template: &Option<String>, record: &Record) -> Result<u32, MappingError> {
    let rendered = render_string(template, record)?;
    if rendered.is_empty() {
        return Ok(0);
    }
    rendered
        .parse()
        .map_err(|_| MappingError::IntCoercion { value: rendered })
}

/// Renders the context template and splits it into lines, trimming one
/// trailing newline. An absent or empty rendering yields no context.
fn render_lines(
    template: &Option<String>,
    record: &Record,
) -> Result<Option<Vec<String>>, MappingError> {
    let rendered = render_string(template, record)?;
    if rendered.is_empty() {
        return Ok(None);
    }
    let trimmed = rendered.strip_suffix('\n').unwrap_or(&rendered);
    Ok(Some(trimmed.split('\n').map(str::to_string).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("record fixtures must be objects"),
        }
    }

    #[test]
    fn maps_shellcheck_style_record() {
        let spec = MappingSpec {
            level: Some("{{ .level }}".to_string()),
            path: Some("{{ .file }}".to_string()),
            start_line: Some("{{ .line }}".to_string()),
            start_column: Some("{{ .column }}".to_string()),
            end_line: Some("{{ .endLine }}".to_string()),
            end_column: Some("{{ .endColumn }}".to_string()),
            rule_id: Some("SC{{ .code }}".to_string()),
            rule_description: Some("{{ .message }}".to_string()),
            ..Default::default()
        };
        let data = record(json!({
            "file": "entrypoint.sh",
            "line": 15,
            "column": 6,
            "endLine": 15,
            "endColumn": 19,
            "level": "info",
            "code": 2086,
            "message": "Double quote to prevent globbing and word splitting.",
        }));

        let findings = to_findings(&spec, &[data]).unwrap();
        assert_eq!(findings.len(), 1);

        let f = &findings[0];
        assert_eq!(f.level, ResultLevel::Info);
        assert_eq!(f.location.path, "entrypoint.sh");
        assert_eq!(f.location.start_line, 15);
        assert_eq!(f.location.start_column, 6);
        assert_eq!(f.location.end_line, 15);
        assert_eq!(f.location.end_column, 19);
        assert_eq!(f.rule.id, "SC2086");
        assert_eq!(
            f.rule.description,
            "Double quote to prevent globbing and word splitting."
        );
    }

    #[test]
    fn absent_templates_yield_zero_values() {
        let findings = to_findings(&MappingSpec::default(), &[record(json!({"x": 1}))]).unwrap();
        let f = &findings[0];
        assert_eq!(f.level, ResultLevel::None);
        assert_eq!(f.location.path, "");
        assert_eq!(f.location.start_line, 0);
        assert_eq!(f.rule.id, "");
        assert_eq!(f.context_lines, None);
    }

    #[test]
    fn missing_key_renders_to_zero() {
        let spec = MappingSpec {
            start_line: Some("{{ .line }}".to_string()),
            ..Default::default()
        };
        let findings = to_findings(&spec, &[record(json!({}))]).unwrap();
        assert_eq!(findings[0].location.start_line, 0);
    }

    #[test]
    fn non_numeric_int_template_fails() {
        let spec = MappingSpec {
            start_line: Some("{{ .line }}".to_string()),
            ..Default::default()
        };
        let err = to_findings(&spec, &[record(json!({"line": "abc"}))]).unwrap_err();
        assert!(matches!(err, MappingError::IntCoercion { .. }));
    }

    #[test]
    fn context_template_splits_lines() {
        let spec = MappingSpec {
            context: Some("{{ .ctx }}".to_string()),
            ..Default::default()
        };
        let findings =
            to_findings(&spec, &[record(json!({"ctx": "line one\nline two\n"}))]).unwrap();
        assert_eq!(
            findings[0].context_lines,
            Some(vec!["line one".to_string(), "line two".to_string()])
        );
    }

    #[test]
    fn level_template_uses_permissive_vocabulary() {
        for (input, expected) in [
            ("info", ResultLevel::Info),
            ("note", ResultLevel::Info),
            ("warn", ResultLevel::Warning),
            ("err", ResultLevel::Error),
            ("wat", ResultLevel::Error),
        ] {
            let spec = MappingSpec {
                level: Some("{{ .level }}".to_string()),
                ..Default::default()
            };
            let findings = to_findings(&spec, &[record(json!({"level": input}))]).unwrap();
            assert_eq!(findings[0].level, expected, "level {input:?}");
        }
    }
}
