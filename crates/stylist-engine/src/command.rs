use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::debug;

use stylist_types::{CommandSpec, Finding, InputMode, OutputChannel, ResultLevel};

use crate::ansi;
use crate::cancel::CancelToken;
use crate::parser::{parse_output, ParseError};
use crate::pathutil::{clean_path, normalize_path};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("empty command")]
    EmptyCommand,

    #[error("unable to split command: {0:?}")]
    CommandSplit(String),

    #[error("unable to launch {program}: {source}")]
    Launch { program: String, source: io::Error },

    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// One subprocess invocation, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// File streamed to the child's stdin (`input: stdin`).
    pub stdin: Option<PathBuf>,
}

impl Invocation {
    /// The invocation rendered as a shell-ish command line, for diagnostics.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend(self.args.iter().map(String::as_str));
        shlex::try_join(parts.iter().copied()).unwrap_or_else(|_| parts.join(" "))
    }
}

/// Raw output captured from a child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ProcessOutput {
    /// Both streams, stdout first. Interleaving order between the streams is
    /// not preserved; this only feeds fallback diagnostics.
    pub fn combined(&self) -> Vec<u8> {
        let mut out = self.stdout.clone();
        out.extend_from_slice(&self.stderr);
        out
    }
}

/// Launches subprocesses. Shared process-wide; must support concurrent
/// `run` calls. A trait so engine tests can stub invocations.
pub trait CommandClient: Send + Sync {
    fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput>;
}

/// The real client: spawns via `std::process::Command` and captures both
/// streams to memory.
#[derive(Debug, Default)]
pub struct SystemClient;

impl CommandClient for SystemClient {
    fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        let mut command = std::process::Command::new(&invocation.program);
        command.args(&invocation.args);
        command.current_dir(&invocation.working_dir);

        match &invocation.stdin {
            Some(path) => {
                let file = File::open(path)?;
                command.stdin(Stdio::from(file));
            }
            None => {
                command.stdin(Stdio::null());
            }
        }

        let output = command.output()?;
        Ok(ProcessOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(1),
        })
    }
}

/// The result of a single command invocation, as handed to the parsers.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub processor: String,
    pub command: String,
    /// The selected output channel, ANSI-stripped.
    pub content: String,
    pub exit_code: i32,
    pub duration: Duration,
}

/// Executes one processor command over a path set: batches per input mode,
/// runs batches concurrently, parses output into findings.
pub struct CommandRunner<'a> {
    spec: &'a CommandSpec,
    processor: &'a str,
    base_path: &'a Path,
    client: &'a dyn CommandClient,
    cancel: &'a CancelToken,
}

impl<'a> CommandRunner<'a> {
    pub fn new(
        spec: &'a CommandSpec,
        processor: &'a str,
        base_path: &'a Path,
        client: &'a dyn CommandClient,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            spec,
            processor,
            base_path,
            client,
            cancel,
        }
    }

    /// Executes all batches concurrently, bounded by the command's
    /// `parallelism`. A non-zero exit is not itself an error; launch
    /// failures are.
    pub fn execute(&self, paths: &[PathBuf]) -> Result<Vec<Finding>, RunError> {
        let batches = self.partition(paths);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism())
            .build()?;

        let nested: Vec<Vec<Finding>> = pool.install(|| {
            batches
                .par_iter()
                .map(|batch| self.execute_batch(batch))
                .collect::<Result<_, RunError>>()
        })?;

        Ok(nested.into_iter().flatten().collect())
    }

    fn parallelism(&self) -> usize {
        match self.spec.parallelism {
            Some(n) if n > 0 => n,
            _ => crate::host_parallelism(),
        }
    }

    /// Groups paths into per-invocation batches.
    fn partition(&self, paths: &[PathBuf]) -> Vec<Vec<PathBuf>> {
        match self.spec.input() {
            // The command doesn't accept paths; one invocation, and the
            // path set only scopes post-filtering.
            InputMode::None => vec![paths.to_vec()],
            InputMode::Arg | InputMode::Stdin => {
                paths.iter().map(|p| vec![p.clone()]).collect()
            }
            InputMode::Variadic => paths
                .chunks(self.spec.batch_size())
                .map(|c| c.to_vec())
                .collect(),
        }
    }

    fn execute_batch(&self, paths: &[PathBuf]) -> Result<Vec<Finding>, RunError> {
        if paths.is_empty() || self.cancel.is_cancelled() {
            return Ok(vec![]);
        }

        let mut args = shlex::split(&self.spec.command)
            .ok_or_else(|| RunError::CommandSplit(self.spec.command.clone()))?;
        if args.is_empty() {
            return Err(RunError::EmptyCommand);
        }
        let program = args.remove(0);

        match self.spec.input() {
            InputMode::Arg => args.push(paths[0].to_string_lossy().into_owned()),
            InputMode::Variadic => {
                args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
            }
            InputMode::None | InputMode::Stdin => {}
        }

        let working_dir = match &self.spec.working_dir {
            Some(dir) => self.base_path.join(dir),
            None => self.base_path.to_path_buf(),
        };
        let invocation = Invocation {
            program: program.clone(),
            args,
            working_dir,
            stdin: (self.spec.input() == InputMode::Stdin).then(|| paths[0].clone()),
        };

        debug!(command = %invocation.command_line(), "exec");

        let started = Instant::now();
        let process = self
            .client
            .run(&invocation)
            .map_err(|source| RunError::Launch { program, source })?;
        let duration = started.elapsed();

        let channel = match self.spec.output() {
            OutputChannel::Stdout => &process.stdout,
            OutputChannel::Stderr => &process.stderr,
        };
        let output = CommandOutput {
            processor: self.processor.to_string(),
            command: invocation.command_line(),
            content: ansi::strip(&String::from_utf8_lossy(channel)),
            exit_code: process.exit_code,
            duration,
        };

        debug!(
            command = %output.command,
            exit_code = output.exit_code,
            duration_ms = duration.as_millis() as u64,
            "done"
        );

        let mut parsed = parse_output(self.spec.format(), &output, &self.spec.mapping)?;

        if parsed.is_empty() && output.exit_code > 0 {
            // The command failed but nothing was parseable. We don't know
            // which path triggered the issue, so report every path with the
            // combined output (likely an error message of some kind).
            parsed = self.fallback_findings(paths, &process);
        }

        Ok(self.transform(parsed, paths))
    }

    fn fallback_findings(&self, paths: &[PathBuf], process: &ProcessOutput) -> Vec<Finding> {
        let combined = ansi::strip(&String::from_utf8_lossy(&process.combined()));
        let context: Vec<String> = combined.split('\n').map(str::to_string).collect();

        paths
            .iter()
            .map(|path| {
                let mut finding = Finding {
                    level: ResultLevel::Error,
                    context_lines: Some(context.clone()),
                    context_language: "plaintext".to_string(),
                    ..Default::default()
                };
                finding.location.path = path.to_string_lossy().into_owned();
                finding.rule.description = "Unknown issue".to_string();
                finding
            })
            .collect()
    }

    /// Stamps the source, canonicalizes paths, and drops findings for paths
    /// outside the batch (tools run with `input: none` scan the whole
    /// project and report on files we were never asked about).
    fn transform(&self, findings: Vec<Finding>, paths: &[PathBuf]) -> Vec<Finding> {
        let path_set: BTreeSet<PathBuf> = paths
            .iter()
            .map(|p| normalize_path(self.base_path, p))
            .collect();

        let mut kept = Vec::with_capacity(findings.len());
        for mut finding in findings {
            finding.location.path = self.cleanup_path(&finding.location.path);
            finding.source = self.processor.to_string();

            if finding.location.path.is_empty()
                || path_set.contains(Path::new(&finding.location.path))
            {
                kept.push(finding);
            } else {
                debug!(path = %finding.location.path, "dropping finding outside path set");
            }
        }
        kept
    }

    fn cleanup_path(&self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        let path = Path::new(path);
        if path.is_absolute() {
            return clean_path(path).to_string_lossy().into_owned();
        }
        let joined = match &self.spec.working_dir {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        };
        normalize_path(self.base_path, &joined)
            .to_string_lossy()
            .into_owned()
    }
}
