use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use stylist_engine::{
    print_findings, CancelToken, Pipeline, PipelineContext, PrintOptions, ProcessorFilter,
    SystemClient,
};
use stylist_types::{
    CommandKind, Config, LogLevel, Processor, ResultFormat, ResultSort,
};

mod config;
mod presets;

use presets::PresetStore;

#[derive(Parser)]
#[command(name = "stylist", version)]
#[command(about = "Run all your code quality tools with one command", long_about = None)]
struct Cli {
    /// Path to the config file.
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log verbosity [error, warn, info, debug].
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the check command for each processor.
    Check(RunArgs),

    /// Run the fix command for each processor.
    Fix(RunArgs),

    /// List the files each processor would run over.
    Files(FilesArgs),

    /// Write a starter config for the current directory.
    Init,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Paths or doublestar patterns to process. Defaults to ".".
    #[arg(value_name = "PATH_OR_PATTERN")]
    path_specs: Vec<String>,

    /// Result format [tty, json, sarif, checkstyle].
    #[arg(long, short = 'f', value_name = "FORMAT")]
    format: Option<ResultFormat>,

    /// Result sort order [location, severity, source].
    #[arg(long, short = 's', value_name = "SORT")]
    sort: Option<ResultSort>,

    /// Severity levels to report (comma separated).
    #[arg(long, value_delimiter = ',', value_name = "LEVELS")]
    severity: Vec<String>,

    /// Show the source lines referenced by each result.
    #[arg(long, value_name = "BOOL")]
    show_context: Option<bool>,

    /// Show rule documentation URLs.
    #[arg(long, value_name = "BOOL")]
    show_url: Option<bool>,

    /// Syntax highlight context lines.
    #[arg(long = "highlight", value_name = "BOOL")]
    syntax_highlight: Option<bool>,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Args, Debug)]
struct FilesArgs {
    /// Paths or doublestar patterns to process. Defaults to ".".
    #[arg(value_name = "PATH_OR_PATTERN")]
    path_specs: Vec<String>,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Comma separated list of processor names to run.
    #[arg(long, short = 'n', value_delimiter = ',', value_name = "NAMES")]
    names: Vec<String>,

    /// Comma separated list of processor tags to run.
    #[arg(long, short = 't', value_delimiter = ',', value_name = "TAGS")]
    tags: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref())?;
    init_logging(cli.log_level.unwrap_or(config.log_level));

    let code = match cli.command {
        Commands::Check(args) => cmd_run(&mut config, args, CommandKind::Check)?,
        Commands::Fix(args) => cmd_run(&mut config, args, CommandKind::Fix)?,
        Commands::Files(args) => cmd_files(&config, args)?,
        Commands::Init => cmd_init(&config)?,
    };

    std::process::exit(code);
}

fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn pipeline_context(config: &Config) -> Result<PipelineContext> {
    Ok(PipelineContext {
        base_path: std::env::current_dir().context("resolve working directory")?,
        output: config.output.clone(),
        client: Arc::new(SystemClient),
        cancel: CancelToken::new(),
    })
}

fn path_specs_or_default(specs: Vec<String>) -> Vec<String> {
    if specs.is_empty() {
        vec![".".to_string()]
    } else {
        specs
    }
}

fn cmd_run(config: &mut Config, args: RunArgs, kind: CommandKind) -> Result<i32> {
    apply_output_flags(config, &args);

    let filter = ProcessorFilter {
        names: args.filter.names.clone(),
        tags: args.filter.tags.clone(),
    };
    let processors = filter.filter(&config.processors)?;

    let pipeline = Pipeline::new(processors, config.excludes.clone());
    let ctx = pipeline_context(config)?;
    let specs = path_specs_or_default(args.path_specs);

    let findings = match kind {
        CommandKind::Check => pipeline.check(&ctx, &specs)?,
        CommandKind::Fix => pipeline.fix(&ctx, &specs)?,
    };

    for finding in &findings {
        debug!(?finding, "post-processed");
    }

    let color = std::io::stdout().is_terminal();
    if !color {
        colored::control::set_override(false);
    }
    let opts = PrintOptions::from_output(&config.output, color);
    let mut stdout = std::io::stdout().lock();
    print_findings(&mut stdout, &findings, &opts)?;

    if findings.is_empty() {
        Ok(0)
    } else {
        eprintln!("{} issue(s)", findings.len());
        Ok(1)
    }
}

fn apply_output_flags(config: &mut Config, args: &RunArgs) {
    let output = &mut config.output;
    if let Some(format) = args.format {
        output.format = format;
    }
    if let Some(sort) = args.sort {
        output.sort = sort;
    }
    if !args.severity.is_empty() {
        output.severity = args.severity.clone();
    }
    if let Some(show_context) = args.show_context {
        output.show_context = show_context;
    }
    if let Some(show_url) = args.show_url {
        output.show_url = show_url;
    }
    if let Some(highlight) = args.syntax_highlight {
        output.syntax_highlight = highlight;
    }
}

fn cmd_files(config: &Config, args: FilesArgs) -> Result<i32> {
    let filter = ProcessorFilter {
        names: args.filter.names.clone(),
        tags: args.filter.tags.clone(),
    };
    let processors = filter.filter(&config.processors)?;

    let pipeline = Pipeline::new(processors.clone(), config.excludes.clone());
    let ctx = pipeline_context(config)?;
    let specs = path_specs_or_default(args.path_specs);
    let matches = pipeline.match_paths(&ctx, &specs)?;

    for processor in &processors {
        println!("Processor: {}", processor.name);
        let paths = matches
            .iter()
            .find(|m| m.processor.name == processor.name)
            .map(|m| m.paths.as_slice())
            .unwrap_or_default();
        if paths.is_empty() {
            println!(" [no matching files]");
        } else {
            for path in paths {
                let display = path
                    .strip_prefix(&ctx.base_path)
                    .unwrap_or(path)
                    .to_string_lossy();
                println!(" - {display}");
            }
        }
        println!();
    }

    Ok(0)
}

fn cmd_init(config: &Config) -> Result<i32> {
    let path = PathBuf::from(&config.config_path);
    if path.exists() {
        bail!("config already exists: {}", path.display());
    }

    let store = PresetStore::load()?;
    let candidates: Vec<Processor> = store.all().cloned().collect();

    // Keep only the presets that would actually match files here.
    let pipeline = Pipeline::new(candidates, config.excludes.clone());
    let ctx = pipeline_context(config)?;
    let matches = pipeline.match_paths(&ctx, &[".".to_string()])?;

    let starter = Config {
        processors: matches
            .iter()
            .map(|m| Processor {
                preset: Some(m.processor.name.clone()),
                name: m.processor.name.clone(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    let rendered = serde_yaml::to_string(&starter).context("render starter config")?;
    std::fs::write(&path, rendered)
        .with_context(|| format!("write config {:?}", path.display()))?;

    println!("Wrote {}", path.display());
    Ok(0)
}
