//! SARIF 2.1.0 wire model, shared by the output parser and the printer.

use serde::{Deserialize, Serialize};

use stylist_types::{Finding, ResultLevel};

pub const SARIF_VERSION: &str = "2.1.0";
pub const SARIF_SCHEMA_URI: &str = "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SarifLog {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRun {
    pub tool: SarifTool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<SarifArtifact>,
    #[serde(default)]
    pub results: Vec<SarifResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifDriver {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<SarifRuleDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRuleDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_uri: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifArtifact {
    pub location: SarifArtifactLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default)]
    pub message: SarifMessage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<SarifLocation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SarifMessage {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_location: Option<SarifPhysicalLocation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifPhysicalLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<SarifArtifactLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<SarifRegion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifArtifactLocation {
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRegion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<SarifContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SarifContent {
    #[serde(default)]
    pub text: String,
}

/// Maps a parsed SARIF log onto findings: one per `runs[*].results[*]`,
/// locations taken from the first physical location.
pub fn log_to_findings(log: &SarifLog) -> Vec<Finding> {
    let mut findings = Vec::new();

    for run in &log.runs {
        for result in &run.results {
            let mut finding = Finding {
                level: ResultLevel::coerce(result.level.as_deref().unwrap_or("")),
                ..Default::default()
            };

            let rule_id = result.rule_id.clone().unwrap_or_default();
            finding.rule.id = rule_id.clone();
            finding.rule.name = rule_id;
            finding.rule.description = result.message.text.clone();

            if let Some(physical) = result
                .locations
                .first()
                .and_then(|l| l.physical_location.as_ref())
            {
                if let Some(artifact) = &physical.artifact_location {
                    finding.location.path = strip_file_scheme(&artifact.uri).to_string();
                }
                if let Some(region) = &physical.region {
                    finding.location.start_line = region.start_line.unwrap_or(0);
                    finding.location.start_column = region.start_column.unwrap_or(0);
                    finding.location.end_line = region.end_line.unwrap_or(0);
                    finding.location.end_column = region.end_column.unwrap_or(0);
                }
            }

            findings.push(finding);
        }
    }

    findings
}

fn strip_file_scheme(uri: &str) -> &str {
    uri.strip_prefix("file://").unwrap_or(uri)
}
