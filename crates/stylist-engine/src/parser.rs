use regex::Regex;

use stylist_types::{Finding, MappingSpec, OutputFormat, ResultLevel};

use crate::checkstyle;
use crate::command::CommandOutput;
use crate::mapping::{self, MappingError, Record};
use crate::sarif::{self, SarifLog};

/// Root selector for the JSON format when no pattern is configured.
const JSON_ROOT_PATTERN: &str = "@this";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("mapping pattern is required when output format is regexp")]
    PatternRequired,

    #[error("mapping pattern: {0}")]
    InvalidRegexp(#[from] regex::Error),

    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("invalid output: pattern={pattern} is not an array")]
    PatternNotArray { pattern: String },

    #[error("invalid output: pattern={pattern}.{index} is not an object")]
    ElementNotObject { pattern: String, index: usize },

    #[error("invalid sarif: {0}")]
    InvalidSarif(serde_json::Error),

    #[error("invalid checkstyle: {0}")]
    InvalidCheckstyle(quick_xml::DeError),

    #[error("invalid diff: {0}")]
    InvalidDiff(#[from] stylist_diff::DiffParseError),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Parses command output into findings using the configured format.
pub fn parse_output(
    format: OutputFormat,
    output: &CommandOutput,
    mapping: &MappingSpec,
) -> Result<Vec<Finding>, ParseError> {
    match format {
        OutputFormat::None => Ok(vec![]),
        OutputFormat::Regexp => parse_regexp(output, mapping),
        OutputFormat::Json => parse_json(output, mapping),
        OutputFormat::Sarif => parse_sarif(output),
        OutputFormat::Checkstyle => parse_checkstyle(output),
        OutputFormat::Diff => parse_diff(output),
    }
}

fn parse_regexp(output: &CommandOutput, mapping: &MappingSpec) -> Result<Vec<Finding>, ParseError> {
    let pattern = mapping.pattern.as_deref().ok_or(ParseError::PatternRequired)?;
    let regex = Regex::new(pattern)?;

    let content = output.content.as_str();
    if content.is_empty() {
        return Ok(vec![]);
    }

    let names: Vec<Option<&str>> = regex.capture_names().collect();
    let mut records = Vec::new();
    for captures in regex.captures_iter(content) {
        let mut record = Record::new();
        for name in names.iter().flatten() {
            let value = captures
                .name(name)
                .map(|m| m.as_str())
                .unwrap_or_default();
            record.insert(name.to_string(), serde_json::Value::from(value));
        }
        records.push(record);
    }

    Ok(mapping::to_findings(mapping, &records)?)
}

fn parse_json(output: &CommandOutput, mapping: &MappingSpec) -> Result<Vec<Finding>, ParseError> {
    let content = output.content.trim();
    if content.is_empty() {
        return Ok(vec![]);
    }

    if !gjson::valid(content) {
        return Err(ParseError::InvalidJson(content.to_string()));
    }

    // `@this` addresses the root element.
    let pattern = mapping.pattern.as_deref().unwrap_or(JSON_ROOT_PATTERN);
    let raw = if pattern == JSON_ROOT_PATTERN {
        content.to_string()
    } else {
        gjson::get(content, pattern).json().to_string()
    };
    if raw.is_empty() {
        return Err(ParseError::PatternNotArray {
            pattern: pattern.to_string(),
        });
    }

    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let serde_json::Value::Array(items) = value else {
        return Err(ParseError::PatternNotArray {
            pattern: pattern.to_string(),
        });
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let serde_json::Value::Object(record) = item else {
            return Err(ParseError::ElementNotObject {
                pattern: pattern.to_string(),
                index,
            });
        };
        records.push(record);
    }

    Ok(mapping::to_findings(mapping, &records)?)
}

fn parse_sarif(output: &CommandOutput) -> Result<Vec<Finding>, ParseError> {
    let content = output.content.trim();
    if content.is_empty() {
        return Ok(vec![]);
    }

    let log: SarifLog = serde_json::from_str(content).map_err(ParseError::InvalidSarif)?;
    Ok(sarif::log_to_findings(&log))
}

fn parse_checkstyle(output: &CommandOutput) -> Result<Vec<Finding>, ParseError> {
    let content = output.content.trim();
    if content.is_empty() {
        return Ok(vec![]);
    }

    let doc = quick_xml::de::from_str(content).map_err(ParseError::InvalidCheckstyle)?;
    Ok(checkstyle::document_to_findings(&doc))
}

fn parse_diff(output: &CommandOutput) -> Result<Vec<Finding>, ParseError> {
    let content = output.content.as_str();
    if content.is_empty() {
        return Ok(vec![]);
    }

    let files = stylist_diff::parse_multi_file_diff(content)?;

    let mut findings = Vec::with_capacity(files.len());
    for file in files {
        let mut finding = Finding {
            level: ResultLevel::Error,
            context_language: "diff".to_string(),
            ..Default::default()
        };
        finding.location.path = file.path.clone();
        finding.location.start_line = file.first_changed_line();
        finding.rule.id = "diff".to_string();
        finding.rule.name = "diff".to_string();
        finding.rule.description = "Formatting error".to_string();

        let lines = file.hunk_lines();
        if !lines.is_empty() {
            finding.context_lines = Some(lines);
        }

        findings.push(finding);
    }

    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn output(content: &str) -> CommandOutput {
        CommandOutput {
            processor: "test".to_string(),
            command: "test --flag".to_string(),
            content: content.to_string(),
            exit_code: 0,
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn none_format_parses_nothing() {
        let out = output("anything at all");
        let findings = parse_output(OutputFormat::None, &out, &MappingSpec::default()).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn regexp_requires_pattern() {
        let err = parse_output(
            OutputFormat::Regexp,
            &output("x"),
            &MappingSpec::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::PatternRequired));
    }

    #[test]
    fn regexp_rejects_bad_pattern() {
        let mapping = MappingSpec {
            pattern: Some("(unclosed".to_string()),
            ..Default::default()
        };
        let err = parse_output(OutputFormat::Regexp, &output("x"), &mapping).unwrap_err();
        assert!(matches!(err, ParseError::InvalidRegexp(_)));
    }

    #[test]
    fn regexp_named_groups_become_record_keys() {
        // The shape mypy and friends print: path:line: level: message
        let mapping = MappingSpec {
            pattern: Some(
                r"(?m)^(?P<path>[^:]+):(?P<line>\d+): (?P<level>\w+): (?P<msg>.+)$".to_string(),
            ),
            level: Some("{{ .level }}".to_string()),
            path: Some("{{ .path }}".to_string()),
            start_line: Some("{{ .line }}".to_string()),
            rule_description: Some("{{ .msg }}".to_string()),
            ..Default::default()
        };
        let out = output("app.py:12: error: Name 'x' is not defined\napp.py:40: note: See docs\n");

        let findings = parse_output(OutputFormat::Regexp, &out, &mapping).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].location.path, "app.py");
        assert_eq!(findings[0].location.start_line, 12);
        assert_eq!(findings[0].level, ResultLevel::Error);
        assert_eq!(findings[1].level, ResultLevel::Info);
        assert_eq!(findings[1].rule.description, "See docs");
    }

    #[test]
    fn regexp_empty_content_yields_nothing() {
        let mapping = MappingSpec {
            pattern: Some(r"(?P<path>.+)".to_string()),
            ..Default::default()
        };
        let findings = parse_output(OutputFormat::Regexp, &output(""), &mapping).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn json_maps_root_array() {
        let mapping = MappingSpec {
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
        let out = output(
            r#"[{"file":"entrypoint.sh","line":15,"column":6,"endLine":15,"endColumn":19,"level":"info","code":2086,"message":"Double quote to prevent globbing and word splitting."}]"#,
        );

        let findings = parse_output(OutputFormat::Json, &out, &mapping).unwrap();
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
    fn json_pattern_selects_nested_array() {
        let mapping = MappingSpec {
            pattern: Some("issues".to_string()),
            path: Some("{{ .file }}".to_string()),
            ..Default::default()
        };
        let out = output(r#"{"issues":[{"file":"a.go"},{"file":"b.go"}],"count":2}"#);

        let findings = parse_output(OutputFormat::Json, &out, &mapping).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].location.path, "a.go");
        assert_eq!(findings[1].location.path, "b.go");
    }

    #[test]
    fn json_rejects_invalid_document() {
        let err = parse_output(
            OutputFormat::Json,
            &output("{not json"),
            &MappingSpec::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn json_rejects_non_array_selection() {
        let err = parse_output(
            OutputFormat::Json,
            &output(r#"{"a": 1}"#),
            &MappingSpec::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::PatternNotArray { .. }));
    }

    #[test]
    fn json_rejects_non_object_elements() {
        let err = parse_output(
            OutputFormat::Json,
            &output(r#"[1, 2]"#),
            &MappingSpec::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::ElementNotObject { index: 0, .. }
        ));
    }

    #[test]
    fn json_empty_content_yields_nothing() {
        let findings = parse_output(
            OutputFormat::Json,
            &output(""),
            &MappingSpec::default(),
        )
        .unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn sarif_parse_rejects_malformed_input() {
        let err = parse_output(
            OutputFormat::Sarif,
            &output("not json"),
            &MappingSpec::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidSarif(_)));
    }

    #[test]
    fn checkstyle_parse_produces_findings() {
        let out = output(
            r#"<checkstyle version="4.3"><file name="a.go"><error line="3" column="1" severity="warning" message="m" source="s"/></file></checkstyle>"#,
        );
        let findings =
            parse_output(OutputFormat::Checkstyle, &out, &MappingSpec::default()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.path, "a.go");
        assert_eq!(findings[0].level, ResultLevel::Warning);
    }

    #[test]
    fn diff_parse_produces_one_finding_per_file() {
        let out = output(
            "--- a/x.txt\n+++ b/x.txt\n@@ -1,1 +1,1 @@\n-aaa\n+bbb\n--- a/y.txt\n+++ b/y.txt\n@@ -5,1 +5,1 @@\n-ccc\n+ddd\n",
        );
        let findings = parse_output(OutputFormat::Diff, &out, &MappingSpec::default()).unwrap();
        assert_eq!(findings.len(), 2);

        let f = &findings[0];
        assert_eq!(f.level, ResultLevel::Error);
        assert_eq!(f.location.path, "x.txt");
        assert_eq!(f.location.start_line, 1);
        assert_eq!(f.rule.id, "diff");
        assert_eq!(f.rule.description, "Formatting error");
        assert_eq!(f.context_language, "diff");
        assert_eq!(
            f.context_lines.as_ref().unwrap(),
            &vec![
                "@@ -1,1 +1,1 @@".to_string(),
                "-aaa".to_string(),
                "+bbb".to_string(),
            ]
        );
        assert_eq!(findings[1].location.start_line, 5);
    }
}
