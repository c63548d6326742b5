use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use stylist_types::{CommandKind, Finding, OutputConfig, Processor, ResultSort};

use crate::cancel::CancelToken;
use crate::command::{CommandClient, RunError};
use crate::context::{detect_language, ContextError, ContextLineLoader};
use crate::index::{IndexError, PathIndexer};
use crate::path_adjust::{PathAdjustError, PathAdjuster};
use crate::pathutil::{match_pattern, normalize_pattern};
use crate::processor::execute_processor;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("processor {name}: {source}")]
    Processor { name: String, source: RunError },

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    AdjustPath(#[from] PathAdjustError),

    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Everything a pipeline invocation needs from its caller: the invocation
/// root, the output policy, the subprocess client, and a cancellation flag.
pub struct PipelineContext {
    pub base_path: PathBuf,
    pub output: OutputConfig,
    pub client: Arc<dyn CommandClient>,
    pub cancel: CancelToken,
}

/// A processor paired with the paths it will run over.
#[derive(Debug, Clone)]
pub struct PipelineMatch {
    pub processor: Processor,
    pub paths: Vec<PathBuf>,
}

/// Orchestrates one run: discovers paths, executes matched processors, and
/// post-processes the aggregate finding set.
pub struct Pipeline {
    processors: Vec<Processor>,
    excludes: Vec<String>,
}

impl Pipeline {
    pub fn new(processors: Vec<Processor>, mut excludes: Vec<String>) -> Self {
        // Always ignore git dirs.
        excludes.push("**/.git/**".to_string());
        Self {
            processors,
            excludes,
        }
    }

    /// Resolves path-specs and assigns each processor the subset of paths
    /// matching its includes minus its own excludes. Processors with no
    /// surviving paths are dropped.
    pub fn match_paths(
        &self,
        ctx: &PipelineContext,
        path_specs: &[String],
    ) -> Result<Vec<PipelineMatch>, PipelineError> {
        // One index over the union of every processor's includes is much
        // faster than indexing per processor on large projects.
        let includes: Vec<String> = self
            .processors
            .iter()
            .flat_map(|p| p.includes.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let indexer = PathIndexer::new(&ctx.base_path, &includes, &self.excludes)?;
        let index = indexer.index(path_specs)?;

        let mut matches = Vec::new();
        for processor in &self.processors {
            let mut paths: BTreeSet<PathBuf> = BTreeSet::new();
            for include in &processor.includes {
                paths.extend(index.paths_for(include).cloned());
            }

            let mut kept = Vec::with_capacity(paths.len());
            for path in paths {
                let mut excluded = false;
                for pattern in &processor.excludes {
                    let normalized = normalize_pattern(&ctx.base_path, pattern);
                    if match_pattern(&normalized, &path)? {
                        excluded = true;
                        break;
                    }
                }
                if !excluded {
                    kept.push(path);
                }
            }

            if kept.is_empty() {
                debug!(processor = %processor.name, "no matching paths");
                continue;
            }
            matches.push(PipelineMatch {
                processor: processor.clone(),
                paths: kept,
            });
        }

        Ok(matches)
    }

    /// Runs every matched processor's check command in parallel.
    pub fn check(
        &self,
        ctx: &PipelineContext,
        path_specs: &[String],
    ) -> Result<Vec<Finding>, PipelineError> {
        self.execute(ctx, path_specs, CommandKind::Check)
    }

    /// Runs every matched processor's fix command serially (fixes mutate
    /// files and would race each other).
    pub fn fix(
        &self,
        ctx: &PipelineContext,
        path_specs: &[String],
    ) -> Result<Vec<Finding>, PipelineError> {
        self.execute(ctx, path_specs, CommandKind::Fix)
    }

    fn execute(
        &self,
        ctx: &PipelineContext,
        path_specs: &[String],
        kind: CommandKind,
    ) -> Result<Vec<Finding>, PipelineError> {
        let matches = self.match_paths(ctx, path_specs)?;

        let run = |m: &PipelineMatch| -> Result<Vec<Finding>, PipelineError> {
            execute_processor(
                &m.processor,
                kind,
                &ctx.base_path,
                ctx.client.as_ref(),
                &ctx.cancel,
                &m.paths,
            )
            .map_err(|source| PipelineError::Processor {
                name: m.processor.name.clone(),
                source,
            })
        };

        let nested: Vec<Vec<Finding>> = match kind {
            CommandKind::Fix => {
                let mut out = Vec::with_capacity(matches.len());
                for m in &matches {
                    out.push(run(m)?);
                }
                out
            }
            CommandKind::Check => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(crate::host_parallelism())
                    .build()?;
                pool.install(|| {
                    matches
                        .par_iter()
                        .map(run)
                        .collect::<Result<Vec<_>, PipelineError>>()
                })?
            }
        };

        let findings = nested.into_iter().flatten().collect();
        post_process(ctx, findings)
    }
}

/// The fixed post-processing sequence: filter, adjust paths, sort, load
/// context lines.
pub(crate) fn post_process(
    ctx: &PipelineContext,
    findings: Vec<Finding>,
) -> Result<Vec<Finding>, PipelineError> {
    let findings = filter_findings(&ctx.output, findings);
    let findings = adjust_findings(ctx, findings)?;
    let mut findings = sort_findings(&ctx.output, findings);
    ensure_context_lines(ctx, &mut findings)?;
    Ok(findings)
}

/// Keeps findings whose level name is in the configured severity list.
pub(crate) fn filter_findings(output: &OutputConfig, findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .filter(|f| output.severity.iter().any(|s| s == f.level.as_str()))
        .collect()
}

pub(crate) fn adjust_findings(
    ctx: &PipelineContext,
    mut findings: Vec<Finding>,
) -> Result<Vec<Finding>, PipelineError> {
    let adjuster = PathAdjuster::new(&ctx.base_path, ctx.output.paths);
    for finding in &mut findings {
        finding.location.path = adjuster.convert(&finding.location.path)?;
    }
    Ok(findings)
}

pub(crate) fn sort_findings(output: &OutputConfig, mut findings: Vec<Finding>) -> Vec<Finding> {
    let comparator = match output.sort {
        ResultSort::Location => by_location,
        ResultSort::Severity => by_severity,
        ResultSort::Source => by_source,
    };
    findings.sort_by(comparator);
    findings
}

/// Path, line, column, source; level ties break with the higher severity
/// first.
fn by_location(a: &Finding, b: &Finding) -> Ordering {
    a.location
        .path
        .cmp(&b.location.path)
        .then_with(|| a.location.start_line.cmp(&b.location.start_line))
        .then_with(|| a.location.start_column.cmp(&b.location.start_column))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| b.level.cmp(&a.level))
}

fn by_severity(a: &Finding, b: &Finding) -> Ordering {
    b.level.cmp(&a.level).then_with(|| by_location(a, b))
}

fn by_source(a: &Finding, b: &Finding) -> Ordering {
    a.source.cmp(&b.source).then_with(|| by_location(a, b))
}

/// Loads context lines for located findings when `show_context` is on;
/// clears any parser-provided context when it is off.
pub(crate) fn ensure_context_lines(
    ctx: &PipelineContext,
    findings: &mut [Finding],
) -> Result<(), PipelineError> {
    if !ctx.output.show_context {
        for finding in findings.iter_mut() {
            finding.context_lines = None;
            finding.context_language = String::new();
        }
        return Ok(());
    }

    let loader = ContextLineLoader::new();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(crate::host_parallelism())
        .build()?;

    pool.install(|| {
        findings
            .par_iter_mut()
            .try_for_each(|finding| -> Result<(), PipelineError> {
                if finding.context_lines.is_none() {
                    finding.context_lines = loader.load(&finding.location)?;
                }
                if finding.context_language.is_empty() {
                    let lines = finding.context_lines.as_deref().unwrap_or(&[]);
                    finding.context_language =
                        detect_language(&finding.location.path, lines);
                }
                Ok(())
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;

    use tempfile::TempDir;

    use stylist_types::{
        CommandSpec, InputMode, Location, MappingSpec, OutputFormat, ResultLevel,
        ResultPathKind,
    };

    use crate::command::{Invocation, ProcessOutput};

    /// Echoes a canned response for every invocation.
    struct EchoClient {
        stdout: String,
        exit_code: i32,
    }

    impl CommandClient for EchoClient {
        fn run(&self, _invocation: &Invocation) -> io::Result<ProcessOutput> {
            Ok(ProcessOutput {
                stdout: self.stdout.as_bytes().to_vec(),
                exit_code: self.exit_code,
                ..Default::default()
            })
        }
    }

    fn finding(source: &str, level: ResultLevel, path: &str, line: u32) -> Finding {
        Finding {
            source: source.to_string(),
            level,
            location: Location {
                path: path.to_string(),
                start_line: line,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn context(temp: &TempDir, output: OutputConfig) -> PipelineContext {
        PipelineContext {
            base_path: temp.path().to_path_buf(),
            output,
            client: Arc::new(EchoClient {
                stdout: String::new(),
                exit_code: 0,
            }),
            cancel: CancelToken::new(),
        }
    }

    fn fixture_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::create_dir_all(temp.path().join("vendor")).unwrap();
        fs::write(temp.path().join("src/a.sh"), "echo a\n").unwrap();
        fs::write(temp.path().join("src/b.sh"), "echo b\n").unwrap();
        fs::write(temp.path().join("vendor/c.sh"), "echo c\n").unwrap();
        fs::write(temp.path().join("README.md"), "# hi\n").unwrap();
        temp
    }

    fn shell_processor(excludes: &[&str]) -> Processor {
        Processor {
            name: "shellcheck".to_string(),
            includes: vec!["**/*.sh".to_string()],
            excludes: excludes.iter().map(|s| s.to_string()).collect(),
            check: Some(CommandSpec {
                command: "shellcheck".to_string(),
                input: Some(InputMode::Variadic),
                parallelism: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn match_assigns_paths_per_processor() {
        let temp = fixture_tree();
        let ctx = context(&temp, OutputConfig::default());

        let markdown = Processor {
            name: "markdownlint".to_string(),
            includes: vec!["**/*.md".to_string()],
            ..Default::default()
        };
        let pipeline = Pipeline::new(
            vec![shell_processor(&["vendor/**"]), markdown],
            vec![],
        );

        let matches = pipeline.match_paths(&ctx, &[".".to_string()]).unwrap();
        assert_eq!(matches.len(), 2);

        assert_eq!(matches[0].processor.name, "shellcheck");
        let shell_paths: Vec<_> = matches[0]
            .paths
            .iter()
            .map(|p| p.strip_prefix(temp.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(shell_paths, vec!["src/a.sh", "src/b.sh"]);

        assert_eq!(matches[1].processor.name, "markdownlint");
        assert_eq!(matches[1].paths.len(), 1);
    }

    #[test]
    fn processors_without_paths_are_dropped() {
        let temp = fixture_tree();
        let ctx = context(&temp, OutputConfig::default());

        let python = Processor {
            name: "ruff".to_string(),
            includes: vec!["**/*.py".to_string()],
            ..Default::default()
        };
        let pipeline = Pipeline::new(vec![python], vec![]);

        let matches = pipeline.match_paths(&ctx, &[".".to_string()]).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn check_aggregates_processor_findings() {
        let temp = fixture_tree();
        let mut output = OutputConfig::default();
        output.show_context = false;
        output.paths = ResultPathKind::Relative;

        let client = EchoClient {
            stdout: "a.sh:oops\nb.sh:hmm\n".to_string(),
            exit_code: 1,
        };
        let ctx = PipelineContext {
            base_path: temp.path().to_path_buf(),
            output,
            client: Arc::new(client),
            cancel: CancelToken::new(),
        };

        let mut processor = shell_processor(&["vendor/**"]);
        processor.check = Some(CommandSpec {
            command: "shellcheck".to_string(),
            input: Some(InputMode::None),
            format: Some(OutputFormat::Regexp),
            mapping: MappingSpec {
                pattern: Some(r"(?m)^(?P<path>[^:]+):(?P<msg>.+)$".to_string()),
                level: Some("error".to_string()),
                path: Some("src/{{ .path }}".to_string()),
                rule_description: Some("{{ .msg }}".to_string()),
                ..Default::default()
            },
            parallelism: Some(1),
            ..Default::default()
        });

        let pipeline = Pipeline::new(vec![processor], vec![]);
        let findings = pipeline.check(&ctx, &[".".to_string()]).unwrap();

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].source, "shellcheck");
        assert_eq!(findings[0].location.path, "src/a.sh");
        assert_eq!(findings[1].location.path, "src/b.sh");
    }

    #[test]
    fn severity_filter_and_sort() {
        let temp = TempDir::new().unwrap();
        let mut output = OutputConfig::default();
        output.severity = vec!["error".to_string(), "warning".to_string()];
        output.sort = stylist_types::ResultSort::Severity;
        output.show_context = false;
        let ctx = context(&temp, output);

        let findings = vec![
            finding("a", ResultLevel::Warning, "w.txt", 1),
            finding("a", ResultLevel::Error, "e.txt", 1),
            finding("a", ResultLevel::Info, "i.txt", 1),
        ];

        let processed = post_process(&ctx, findings).unwrap();
        let levels: Vec<ResultLevel> = processed.iter().map(|f| f.level).collect();
        assert_eq!(levels, vec![ResultLevel::Error, ResultLevel::Warning]);
    }

    #[test]
    fn location_sort_is_non_decreasing() {
        let output = OutputConfig::default();
        let findings = vec![
            finding("b", ResultLevel::Warning, "b.txt", 2),
            finding("a", ResultLevel::Error, "a.txt", 9),
            finding("a", ResultLevel::Error, "a.txt", 1),
            finding("a", ResultLevel::Warning, "b.txt", 2),
        ];

        let sorted = sort_findings(&output, findings);
        let keys: Vec<(String, u32, u32)> = sorted
            .iter()
            .map(|f| {
                (
                    f.location.path.clone(),
                    f.location.start_line,
                    f.location.start_column,
                )
            })
            .collect();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn location_sort_ties_put_higher_severity_first() {
        let output = OutputConfig::default();
        let error = finding("same", ResultLevel::Error, "x.txt", 1);
        let warning = finding("same", ResultLevel::Warning, "x.txt", 1);

        let sorted = sort_findings(&output, vec![warning, error]);
        assert_eq!(sorted[0].level, ResultLevel::Error);
        assert_eq!(sorted[1].level, ResultLevel::Warning);
    }

    #[test]
    fn source_sort_groups_by_processor() {
        let mut output = OutputConfig::default();
        output.sort = stylist_types::ResultSort::Source;

        let sorted = sort_findings(
            &output,
            vec![
                finding("zzz", ResultLevel::Error, "a.txt", 1),
                finding("aaa", ResultLevel::Warning, "z.txt", 1),
                finding("aaa", ResultLevel::Warning, "a.txt", 1),
            ],
        );
        let keys: Vec<(&str, &str)> = sorted
            .iter()
            .map(|f| (f.source.as_str(), f.location.path.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("aaa", "a.txt"), ("aaa", "z.txt"), ("zzz", "a.txt")]
        );
    }

    #[test]
    fn filter_is_idempotent() {
        let mut output = OutputConfig::default();
        output.severity = vec!["error".to_string()];

        let findings = vec![
            finding("a", ResultLevel::Error, "a.txt", 1),
            finding("a", ResultLevel::Info, "b.txt", 1),
        ];
        let once = filter_findings(&output, findings);
        let twice = filter_findings(&output, once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn sort_is_idempotent() {
        let output = OutputConfig::default();
        let findings = vec![
            finding("b", ResultLevel::Warning, "b.txt", 2),
            finding("a", ResultLevel::Error, "a.txt", 1),
        ];
        let once = sort_findings(&output, findings);
        let twice = sort_findings(&output, once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn context_lines_cover_the_line_range() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("f.sh"), "l1\nl2\nl3\nl4\n").unwrap();
        let ctx = context(&temp, OutputConfig::default());

        let mut findings = vec![Finding {
            source: "s".to_string(),
            level: ResultLevel::Warning,
            location: Location {
                path: temp.path().join("f.sh").to_string_lossy().into_owned(),
                start_line: 2,
                end_line: 3,
                ..Default::default()
            },
            ..Default::default()
        }];

        ensure_context_lines(&ctx, &mut findings).unwrap();
        assert_eq!(
            findings[0].context_lines,
            Some(vec!["l2".to_string(), "l3".to_string()])
        );
        assert!(!findings[0].context_language.is_empty());
    }

    #[test]
    fn context_is_cleared_when_disabled() {
        let temp = TempDir::new().unwrap();
        let mut output = OutputConfig::default();
        output.show_context = false;
        let ctx = context(&temp, output);

        let mut findings = vec![Finding {
            context_lines: Some(vec!["leftover".to_string()]),
            context_language: "diff".to_string(),
            ..Default::default()
        }];

        ensure_context_lines(&ctx, &mut findings).unwrap();
        assert_eq!(findings[0].context_lines, None);
        assert_eq!(findings[0].context_language, "");
    }

    #[test]
    fn parser_context_is_not_overwritten() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("f.sh"), "actual\n").unwrap();
        let ctx = context(&temp, OutputConfig::default());

        let mut findings = vec![Finding {
            location: Location {
                path: temp.path().join("f.sh").to_string_lossy().into_owned(),
                start_line: 1,
                ..Default::default()
            },
            context_lines: Some(vec!["from the parser".to_string()]),
            context_language: "diff".to_string(),
            ..Default::default()
        }];

        ensure_context_lines(&ctx, &mut findings).unwrap();
        assert_eq!(
            findings[0].context_lines,
            Some(vec!["from the parser".to_string()])
        );
        assert_eq!(findings[0].context_language, "diff");
    }
}
