use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::OnceLock;

use colored::Colorize;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

use stylist_types::{Finding, OutputConfig, ResultFormat, ResultLevel};

use crate::checkstyle::{
    CheckstyleDocument, CheckstyleError, CheckstyleFile, CHECKSTYLE_VERSION,
};
use crate::sarif::{
    SarifArtifact, SarifArtifactLocation, SarifContent, SarifDriver, SarifLocation, SarifLog,
    SarifMessage, SarifPhysicalLocation, SarifRegion, SarifResult, SarifRuleDescriptor,
    SarifRun, SarifTool, SARIF_SCHEMA_URI, SARIF_VERSION,
};

#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Xml(#[from] quick_xml::SeError),
}

/// Rendering policy for [`print_findings`].
#[derive(Debug, Clone)]
pub struct PrintOptions {
    pub format: ResultFormat,
    pub show_context: bool,
    pub show_url: bool,
    pub syntax_highlight: bool,
    /// Whether the sink is a color-capable terminal.
    pub color: bool,
}

impl PrintOptions {
    pub fn from_output(output: &OutputConfig, color: bool) -> Self {
        Self {
            format: output.format,
            show_context: output.show_context,
            show_url: output.show_url,
            syntax_highlight: output.syntax_highlight,
            color,
        }
    }
}

/// Renders findings to the sink in the configured surface format.
pub fn print_findings(
    out: &mut dyn Write,
    findings: &[Finding],
    opts: &PrintOptions,
) -> Result<(), PrintError> {
    match opts.format {
        ResultFormat::Tty => print_tty(out, findings, opts),
        ResultFormat::Json => print_json(out, findings, opts),
        ResultFormat::Sarif => print_sarif(out, findings, opts),
        ResultFormat::Checkstyle => print_checkstyle(out, findings),
    }
}

/*
* JSON
**/

fn print_json(
    out: &mut dyn Write,
    findings: &[Finding],
    opts: &PrintOptions,
) -> Result<(), PrintError> {
    let rendered = if opts.show_context {
        serde_json::to_string(findings)?
    } else {
        let stripped: Vec<Finding> = findings
            .iter()
            .cloned()
            .map(|mut f| {
                f.context_lines = None;
                f.context_language = String::new();
                f
            })
            .collect();
        serde_json::to_string(&stripped)?
    };

    writeln!(out, "{rendered}")?;
    Ok(())
}

/*
* Checkstyle
**/

fn print_checkstyle(out: &mut dyn Write, findings: &[Finding]) -> Result<(), PrintError> {
    // Group by path, preserving first-seen order.
    let mut order: Vec<&str> = Vec::new();
    let mut by_path: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
    for finding in findings {
        let path = finding.location.path.as_str();
        if !by_path.contains_key(path) {
            order.push(path);
        }
        by_path.entry(path).or_default().push(finding);
    }

    let files = order
        .iter()
        .map(|path| CheckstyleFile {
            name: path.to_string(),
            errors: by_path[path]
                .iter()
                .map(|f| CheckstyleError {
                    line: f.location.start_line,
                    column: f.location.start_column,
                    message: format!("{} [{}]", f.rule.description, f.rule.id),
                    severity: f.level.as_str().to_string(),
                    source: f.source.clone(),
                })
                .collect(),
        })
        .collect();

    let doc = CheckstyleDocument {
        version: CHECKSTYLE_VERSION.to_string(),
        files,
    };

    let body = quick_xml::se::to_string(&doc)?;
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(out, "{body}")?;
    Ok(())
}

/*
* SARIF
**/

fn print_sarif(
    out: &mut dyn Write,
    findings: &[Finding],
    opts: &PrintOptions,
) -> Result<(), PrintError> {
    // One run per source.
    let mut by_source: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
    for finding in findings {
        by_source.entry(finding.source.as_str()).or_default().push(finding);
    }

    let runs = by_source
        .into_iter()
        .map(|(source, group)| sarif_run(source, &group, opts))
        .collect();

    let log = SarifLog {
        schema: Some(SARIF_SCHEMA_URI.to_string()),
        version: SARIF_VERSION.to_string(),
        runs,
    };

    writeln!(out, "{}", serde_json::to_string_pretty(&log)?)?;
    Ok(())
}

fn sarif_run(source: &str, findings: &[&Finding], opts: &PrintOptions) -> SarifRun {
    let mut rules: Vec<SarifRuleDescriptor> = Vec::new();
    let mut rule_indexes: BTreeMap<&str, usize> = BTreeMap::new();
    let mut artifacts: Vec<SarifArtifact> = Vec::new();
    let mut artifact_indexes: BTreeMap<&str, usize> = BTreeMap::new();
    let mut results: Vec<SarifResult> = Vec::new();

    for finding in findings {
        let rule_index = *rule_indexes
            .entry(finding.rule.id.as_str())
            .or_insert_with(|| {
                rules.push(SarifRuleDescriptor {
                    id: finding.rule.id.clone(),
                    name: (!finding.rule.name.is_empty())
                        .then(|| finding.rule.name.clone()),
                    help_uri: (!finding.rule.uri.is_empty())
                        .then(|| finding.rule.uri.clone()),
                });
                rules.len() - 1
            });

        let artifact_index = *artifact_indexes
            .entry(finding.location.path.as_str())
            .or_insert_with(|| {
                artifacts.push(SarifArtifact {
                    location: SarifArtifactLocation {
                        uri: finding.location.path.clone(),
                        index: None,
                    },
                    source_language: (opts.show_context
                        && !finding.context_language.is_empty())
                    .then(|| finding.context_language.clone()),
                });
                artifacts.len() - 1
            });

        let snippet = (opts.show_context)
            .then(|| finding.context_lines.as_ref())
            .flatten()
            .filter(|lines| !lines.is_empty())
            .map(|lines| SarifContent {
                text: lines.join("\n"),
            });

        results.push(SarifResult {
            rule_id: Some(finding.rule.id.clone()),
            rule_index: Some(rule_index),
            level: Some(finding.level.as_str().to_string()),
            message: SarifMessage {
                text: finding.rule.description.clone(),
            },
            locations: vec![SarifLocation {
                physical_location: Some(SarifPhysicalLocation {
                    artifact_location: Some(SarifArtifactLocation {
                        uri: finding.location.path.clone(),
                        index: Some(artifact_index),
                    }),
                    region: Some(SarifRegion {
                        start_line: Some(finding.location.start_line),
                        start_column: Some(finding.location.start_column),
                        end_line: Some(finding.location.end_line),
                        end_column: Some(finding.location.end_column),
                        source_language: (opts.show_context
                            && !finding.context_language.is_empty())
                        .then(|| finding.context_language.clone()),
                        snippet,
                    }),
                }),
            }],
        });
    }

    SarifRun {
        tool: SarifTool {
            driver: SarifDriver {
                name: source.to_string(),
                rules,
            },
        },
        artifacts,
        results,
    }
}

/*
* TTY
**/

fn print_tty(
    out: &mut dyn Write,
    findings: &[Finding],
    opts: &PrintOptions,
) -> Result<(), PrintError> {
    for finding in findings {
        print_tty_location(out, finding, opts)?;
        if opts.show_context {
            print_tty_context(out, finding, opts)?;
            print_tty_pointer(out, finding, opts)?;
        }
    }
    Ok(())
}

fn print_tty_location(
    out: &mut dyn Write,
    finding: &Finding,
    opts: &PrintOptions,
) -> Result<(), PrintError> {
    let severity = format!("{}: ", paint_level(finding.level, opts.color));

    let source = if finding.source.is_empty() {
        String::new()
    } else if opts.color {
        format!("{}: ", finding.source.underline())
    } else {
        format!("{}: ", finding.source)
    };

    let mut message = finding.rule.description.clone();
    if !message.is_empty() {
        if !(message.ends_with('.') || message.ends_with('!')) {
            message.push('.');
        }
        message.push(' ');
    }

    let mut rule = String::new();
    if !finding.rule.id.is_empty() {
        rule = format!("[{}]", finding.rule.id);
    }
    if !finding.rule.uri.is_empty() && opts.show_url {
        rule = format!("{}({})", rule, finding.rule.uri);
    }

    let location = finding.location.to_string();
    let location = if opts.color {
        finding.location.to_string().bold().to_string()
    } else {
        location
    };

    writeln!(out, "{location}: {severity}{source}{message}{rule}")?;
    Ok(())
}

fn paint_level(level: ResultLevel, color: bool) -> String {
    let name = level.as_str();
    if !color {
        return name.to_string();
    }
    match level {
        ResultLevel::Error => name.red().to_string(),
        ResultLevel::Warning => name.yellow().to_string(),
        ResultLevel::Info => name.cyan().to_string(),
        ResultLevel::None => name.bright_black().to_string(),
    }
}

fn print_tty_context(
    out: &mut dyn Write,
    finding: &Finding,
    opts: &PrintOptions,
) -> Result<(), PrintError> {
    let Some(lines) = &finding.context_lines else {
        return Ok(());
    };
    if lines.is_empty() {
        return Ok(());
    }

    let mut text = lines.join("\n");
    text.push('\n');

    if opts.syntax_highlight && opts.color {
        text = highlight(
            &text,
            &finding.location.path,
            &finding.context_language,
        );
    }

    write!(out, "{text}")?;
    Ok(())
}

fn highlight_assets() -> (&'static SyntaxSet, &'static ThemeSet) {
    static ASSETS: OnceLock<(SyntaxSet, ThemeSet)> = OnceLock::new();
    let (syntaxes, themes) = ASSETS.get_or_init(|| {
        (
            SyntaxSet::load_defaults_newlines(),
            ThemeSet::load_defaults(),
        )
    });
    (syntaxes, themes)
}

fn highlight(text: &str, path: &str, language: &str) -> String {
    let (syntaxes, themes) = highlight_assets();

    let syntax = syntaxes
        .find_syntax_by_token(language)
        .or_else(|| {
            Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .and_then(|e| syntaxes.find_syntax_by_extension(e))
        })
        .or_else(|| text.lines().next().and_then(|l| syntaxes.find_syntax_by_first_line(l)))
        .unwrap_or_else(|| syntaxes.find_syntax_plain_text());

    let theme = &themes.themes["base16-ocean.dark"];
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut rendered = String::with_capacity(text.len());
    for line in LinesWithEndings::from(text) {
        match highlighter.highlight_line(line, syntaxes) {
            Ok(ranges) => rendered.push_str(&as_24_bit_terminal_escaped(&ranges, false)),
            Err(_) => rendered.push_str(line),
        }
    }
    rendered.push_str("\x1b[0m");
    rendered
}

fn print_tty_pointer(
    out: &mut dyn Write,
    finding: &Finding,
    opts: &PrintOptions,
) -> Result<(), PrintError> {
    // Only point into a single known line; start_column == 0 means unknown.
    let Some(lines) = &finding.context_lines else {
        return Ok(());
    };
    if lines.len() != 1 || finding.location.start_column == 0 {
        return Ok(());
    }

    let line = &lines[0];
    let start0 = (finding.location.start_column - 1) as usize;
    let end0 = finding.location.end_column.saturating_sub(1) as usize;

    let mut prefix = String::new();
    for byte in line.bytes().take(start0) {
        prefix.push(if byte == b'\t' { '\t' } else { ' ' });
    }

    let width = if end0 > start0 && end0 <= line.len() {
        end0 - start0
    } else {
        1
    };
    let indicator = "^".repeat(width);
    let indicator = if opts.color {
        indicator.yellow().to_string()
    } else {
        indicator
    };

    writeln!(out, "{prefix}{indicator}")?;
    Ok(())
}
