//! Checkstyle XML wire model, shared by the output parser and the printer.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <checkstyle version="4.3">
//!   <file name="filename">
//!     <error line="1" column="3" message="msg" severity="error" source="src"/>
//!   </file>
//! </checkstyle>
//! ```

use serde::{Deserialize, Serialize};

use stylist_types::{Finding, ResultLevel};

pub const CHECKSTYLE_VERSION: &str = "4.3";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "checkstyle")]
pub struct CheckstyleDocument {
    #[serde(rename = "@version")]
    pub version: String,

    #[serde(rename = "file", default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<CheckstyleFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckstyleFile {
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "error", default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CheckstyleError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckstyleError {
    #[serde(rename = "@line", default)]
    pub line: u32,

    #[serde(rename = "@column", default)]
    pub column: u32,

    #[serde(rename = "@message", default)]
    pub message: String,

    #[serde(rename = "@severity", default, skip_serializing_if = "String::is_empty")]
    pub severity: String,

    #[serde(rename = "@source", default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

/// Maps a parsed checkstyle document onto findings: one per `<error>`.
pub fn document_to_findings(doc: &CheckstyleDocument) -> Vec<Finding> {
    let mut findings = Vec::new();

    for file in &doc.files {
        for error in &file.errors {
            let mut finding = Finding {
                level: ResultLevel::coerce(&error.severity),
                ..Default::default()
            };
            finding.location.path = file.name.clone();
            finding.location.start_line = error.line;
            finding.location.start_column = error.column;
            finding.rule.id = error.source.clone();
            finding.rule.name = error.source.clone();
            finding.rule.description = error.message.clone();
            findings.push(finding);
        }
    }

    findings
}
