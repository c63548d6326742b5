//! Data types (findings + config) for stylist.
//!
//! This crate is intentionally "dumb": pure DTOs with serde + schemars.
//! Everything that touches the filesystem or spawns processes lives in
//! `stylist-engine`.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = ".stylist.yml";
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// The string minijinja renders for an undefined lookup in strict-ish
/// engines. Treated the same as empty when reading template output.
pub const NO_VALUE: &str = "<no value>";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{value} is not a valid {kind}, try [{expected}]")]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl EnumParseError {
    fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

/*
* ResultLevel
**/

/// Severity level of a finding.
///
/// Ordered so that severity comparisons work numerically:
/// `none < info < warning < error`. The names match the SARIF level
/// vocabulary (with `note` accepted as an alias for `info`).
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ResultLevel {
    #[default]
    None,
    Info,
    Warning,
    Error,
}

impl ResultLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultLevel::None => "none",
            ResultLevel::Info => "info",
            ResultLevel::Warning => "warning",
            ResultLevel::Error => "error",
        }
    }

    pub fn names() -> &'static [&'static str] {
        &["none", "info", "warning", "error"]
    }

    /// Coerces a level string through the permissive vocabulary used by
    /// result mappings and the SARIF parser.
    ///
    /// Empty and sentinel values coerce to [`ResultLevel::None`]. Anything
    /// not in the known vocabulary coerces to [`ResultLevel::Error`]:
    /// a tool reporting an unknown severity is still reporting *something*,
    /// and hiding it would be worse than over-reporting.
    pub fn coerce(value: &str) -> ResultLevel {
        match value {
            "" | NO_VALUE | "none" => ResultLevel::None,
            "info" | "note" => ResultLevel::Info,
            "warn" | "warning" => ResultLevel::Warning,
            _ => ResultLevel::Error,
        }
    }
}

impl fmt::Display for ResultLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultLevel {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ResultLevel::None),
            "info" => Ok(ResultLevel::Info),
            "warning" => Ok(ResultLevel::Warning),
            "error" => Ok(ResultLevel::Error),
            _ => Err(EnumParseError::new(
                "result level",
                s,
                "none, info, warning, error",
            )),
        }
    }
}

/*
* Command enums
**/

/// How paths are passed to a command.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// One invocation per path, appended as the final argument.
    Arg,
    /// A single invocation with no path arguments; the path set only
    /// scopes which parsed findings are kept.
    None,
    /// One invocation per path, file contents streamed to stdin.
    Stdin,
    /// Paths grouped into batches, each batch appended to one invocation.
    #[default]
    Variadic,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InputMode::Arg => "arg",
            InputMode::None => "none",
            InputMode::Stdin => "stdin",
            InputMode::Variadic => "variadic",
        }
    }
}

impl FromStr for InputMode {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arg" => Ok(InputMode::Arg),
            "none" => Ok(InputMode::None),
            "stdin" => Ok(InputMode::Stdin),
            "variadic" => Ok(InputMode::Variadic),
            _ => Err(EnumParseError::new(
                "input mode",
                s,
                "arg, none, stdin, variadic",
            )),
        }
    }
}

/// Which stream the command reports on.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannel {
    #[default]
    Stdout,
    Stderr,
}

impl OutputChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputChannel::Stdout => "stdout",
            OutputChannel::Stderr => "stderr",
        }
    }
}

impl FromStr for OutputChannel {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(OutputChannel::Stdout),
            "stderr" => Ok(OutputChannel::Stderr),
            _ => Err(EnumParseError::new("output channel", s, "stdout, stderr")),
        }
    }
}

/// How command output is parsed into findings.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    None,
    Regexp,
    Json,
    Sarif,
    Checkstyle,
    Diff,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::None => "none",
            OutputFormat::Regexp => "regexp",
            OutputFormat::Json => "json",
            OutputFormat::Sarif => "sarif",
            OutputFormat::Checkstyle => "checkstyle",
            OutputFormat::Diff => "diff",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(OutputFormat::None),
            "regexp" => Ok(OutputFormat::Regexp),
            "json" => Ok(OutputFormat::Json),
            "sarif" => Ok(OutputFormat::Sarif),
            "checkstyle" => Ok(OutputFormat::Checkstyle),
            "diff" => Ok(OutputFormat::Diff),
            _ => Err(EnumParseError::new(
                "output format",
                s,
                "none, regexp, json, sarif, checkstyle, diff",
            )),
        }
    }
}

/// Which of a processor's two commands is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Check,
    Fix,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Check => "check",
            CommandKind::Fix => "fix",
        }
    }
}

/*
* Output enums
**/

/// Surface format for rendered findings.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    #[default]
    Tty,
    Json,
    Sarif,
    Checkstyle,
}

impl ResultFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultFormat::Tty => "tty",
            ResultFormat::Json => "json",
            ResultFormat::Sarif => "sarif",
            ResultFormat::Checkstyle => "checkstyle",
        }
    }

    pub fn names() -> &'static [&'static str] {
        &["tty", "json", "sarif", "checkstyle"]
    }
}

impl FromStr for ResultFormat {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tty" => Ok(ResultFormat::Tty),
            "json" => Ok(ResultFormat::Json),
            "sarif" => Ok(ResultFormat::Sarif),
            "checkstyle" => Ok(ResultFormat::Checkstyle),
            _ => Err(EnumParseError::new(
                "result format",
                s,
                "tty, json, sarif, checkstyle",
            )),
        }
    }
}

/// Sort order applied during post-processing.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ResultSort {
    #[default]
    Location,
    Severity,
    Source,
}

impl ResultSort {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultSort::Location => "location",
            ResultSort::Severity => "severity",
            ResultSort::Source => "source",
        }
    }

    pub fn names() -> &'static [&'static str] {
        &["location", "severity", "source"]
    }
}

impl FromStr for ResultSort {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "location" => Ok(ResultSort::Location),
            "severity" => Ok(ResultSort::Severity),
            "source" => Ok(ResultSort::Source),
            _ => Err(EnumParseError::new(
                "result sort",
                s,
                "location, severity, source",
            )),
        }
    }
}

/// Whether rendered paths are absolute or relative to the working dir.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ResultPathKind {
    #[default]
    Relative,
    Absolute,
}

impl ResultPathKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultPathKind::Relative => "relative",
            ResultPathKind::Absolute => "absolute",
        }
    }
}

impl FromStr for ResultPathKind {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relative" => Ok(ResultPathKind::Relative),
            "absolute" => Ok(ResultPathKind::Absolute),
            _ => Err(EnumParseError::new("path kind", s, "relative, absolute")),
        }
    }
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(EnumParseError::new(
                "log level",
                s,
                "error, warn, info, debug",
            )),
        }
    }
}

/*
* Finding
**/

/// One normalized diagnostic produced by the engine.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Finding {
    /// Name of the processor that produced this finding.
    pub source: String,
    pub level: ResultLevel,
    pub location: Location,
    pub rule: Rule,
    /// Source excerpt covering `[start_line, end_line]`, when loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_lines: Option<Vec<String>>,
    /// Lexer name detected for the context lines.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context_language: String,
}

/// Physical location of a finding. Lines and columns are 1-based;
/// 0 means unknown.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    pub path: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Location {
    /// The inclusive line range covered by this location.
    /// An unknown `end_line` collapses to `start_line`.
    pub fn line_range(&self) -> (u32, u32) {
        let end = if self.end_line == 0 {
            self.start_line
        } else {
            self.end_line
        };
        (self.start_line, end)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "<none>"
        } else {
            &self.path
        };
        write!(f, "{}:{}:{}", path, self.start_line, self.start_column)
    }
}

/// The rule that produced a finding.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub uri: String,
}

/*
* Config file
**/

/// The on-disk configuration file (`.stylist.yml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_config_path")]
    pub config_path: String,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub output: OutputConfig,

    /// Global exclude patterns applied during path discovery.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    #[serde(default)]
    pub processors: Vec<Processor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            log_level: LogLevel::default(),
            output: OutputConfig::default(),
            excludes: default_excludes(),
            processors: vec![],
        }
    }
}

fn default_config_path() -> String {
    DEFAULT_CONFIG_PATH.to_string()
}

fn default_excludes() -> Vec<String> {
    vec![".git".to_string(), "node_modules".to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: ResultFormat,

    #[serde(default)]
    pub sort: ResultSort,

    #[serde(default)]
    pub paths: ResultPathKind,

    /// Severity names to retain during post-processing.
    #[serde(default = "default_severity")]
    pub severity: Vec<String>,

    #[serde(default = "default_true")]
    pub show_context: bool,

    #[serde(default = "default_true")]
    pub show_url: bool,

    #[serde(default = "default_true")]
    pub syntax_highlight: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: ResultFormat::default(),
            sort: ResultSort::default(),
            paths: ResultPathKind::default(),
            severity: default_severity(),
            show_context: true,
            show_url: true,
            syntax_highlight: true,
        }
    }
}

fn default_severity() -> Vec<String> {
    ResultLevel::names().iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("processor {index} has no name")]
    UnnamedProcessor { index: usize },

    #[error("duplicate processor name: {name}")]
    DuplicateProcessor { name: String },
}

impl Config {
    /// Ensures processor identities are usable: every processor is named
    /// and names are unique within the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for (index, processor) in self.processors.iter().enumerate() {
            if processor.name.trim().is_empty() {
                return Err(ConfigError::UnnamedProcessor { index });
            }
            if !seen.insert(processor.name.clone()) {
                return Err(ConfigError::DuplicateProcessor {
                    name: processor.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/*
* Processor
**/

/// A named configuration binding file patterns to check/fix commands.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Processor {
    /// Name of a preset to inherit defaults from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CommandSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<CommandSpec>,
}

impl Processor {
    /// Deep-merges `overrides` on top of this processor (the preset).
    ///
    /// Scalar and list fields from the override win when set; unset fields
    /// inherit from the preset, recursively through `check`/`fix`.
    pub fn merge(&self, overrides: &Processor) -> Processor {
        Processor {
            preset: overrides.preset.clone().or_else(|| self.preset.clone()),
            name: pick_string(&self.name, &overrides.name),
            tags: pick_vec(&self.tags, &overrides.tags),
            includes: pick_vec(&self.includes, &overrides.includes),
            excludes: pick_vec(&self.excludes, &overrides.excludes),
            check: merge_commands(self.check.as_ref(), overrides.check.as_ref()),
            fix: merge_commands(self.fix.as_ref(), overrides.fix.as_ref()),
        }
    }

    pub fn command(&self, kind: CommandKind) -> Option<&CommandSpec> {
        match kind {
            CommandKind::Check => self.check.as_ref(),
            CommandKind::Fix => self.fix.as_ref(),
        }
    }
}

fn pick_string(preset: &str, over: &str) -> String {
    if over.is_empty() {
        preset.to_string()
    } else {
        over.to_string()
    }
}

fn pick_vec(preset: &[String], over: &[String]) -> Vec<String> {
    if over.is_empty() {
        preset.to_vec()
    } else {
        over.to_vec()
    }
}

fn merge_commands(
    preset: Option<&CommandSpec>,
    over: Option<&CommandSpec>,
) -> Option<CommandSpec> {
    match (preset, over) {
        (Some(p), Some(o)) => Some(p.merge(o)),
        (Some(p), None) => Some(p.clone()),
        (None, Some(o)) => Some(o.clone()),
        (None, None) => None,
    }
}

/*
* CommandSpec
**/

/// A check or fix command to be run by a processor.
///
/// Fields other than the command template are optional so that preset
/// merging can distinguish "unset" from an explicit value; accessor
/// methods apply the documented defaults.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    /// The command template, shell-split at execution time.
    #[serde(default)]
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputChannel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,

    #[serde(default, skip_serializing_if = "MappingSpec::is_empty")]
    pub mapping: MappingSpec,

    /// Max concurrent invocations. Defaults to the host CPU count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,

    /// Paths per invocation in `variadic` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Working directory, relative to the invocation root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn input(&self) -> InputMode {
        self.input.unwrap_or_default()
    }

    pub fn output(&self) -> OutputChannel {
        self.output.unwrap_or_default()
    }

    pub fn format(&self) -> OutputFormat {
        self.format.unwrap_or_default()
    }

    pub fn batch_size(&self) -> usize {
        match self.batch_size {
            Some(n) if n > 0 => n,
            _ => DEFAULT_BATCH_SIZE,
        }
    }

    /// Deep-merges `over` on top of this spec.
    pub fn merge(&self, over: &CommandSpec) -> CommandSpec {
        CommandSpec {
            command: pick_string(&self.command, &over.command),
            input: over.input.or(self.input),
            output: over.output.or(self.output),
            format: over.format.or(self.format),
            mapping: self.mapping.merge(&over.mapping),
            parallelism: over.parallelism.or(self.parallelism),
            batch_size: over.batch_size.or(self.batch_size),
            working_dir: over.working_dir.clone().or_else(|| self.working_dir.clone()),
        }
    }
}

/*
* MappingSpec
**/

/// Template-driven projection from a parsed record onto a [`Finding`].
///
/// Every field is optional; an absent template yields the type-appropriate
/// zero. `pattern` is the regexp for the `regexp` format and the path
/// expression for the `json` format.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MappingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl MappingSpec {
    pub fn is_empty(&self) -> bool {
        *self == MappingSpec::default()
    }

    pub fn merge(&self, over: &MappingSpec) -> MappingSpec {
        MappingSpec {
            pattern: over.pattern.clone().or_else(|| self.pattern.clone()),
            level: over.level.clone().or_else(|| self.level.clone()),
            path: over.path.clone().or_else(|| self.path.clone()),
            start_line: over.start_line.clone().or_else(|| self.start_line.clone()),
            start_column: over
                .start_column
                .clone()
                .or_else(|| self.start_column.clone()),
            end_line: over.end_line.clone().or_else(|| self.end_line.clone()),
            end_column: over.end_column.clone().or_else(|| self.end_column.clone()),
            rule_id: over.rule_id.clone().or_else(|| self.rule_id.clone()),
            rule_name: over.rule_name.clone().or_else(|| self.rule_name.clone()),
            rule_description: over
                .rule_description
                .clone()
                .or_else(|| self.rule_description.clone()),
            rule_uri: over.rule_uri.clone().or_else(|| self.rule_uri.clone()),
            context: over.context.clone().or_else(|| self.context.clone()),
        }
    }
}
