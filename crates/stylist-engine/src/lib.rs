//! Core engine: path discovery, command execution, output parsing, reporting.
//!
//! The engine consumes a loaded [`stylist_types::Config`], a subprocess
//! [`CommandClient`], and an output sink; everything else (flag parsing,
//! preset catalogs, logging setup) belongs to the CLI crate.

mod ansi;
mod cancel;
mod checkstyle;
mod command;
mod context;
mod index;
mod mapping;
mod parser;
mod path_adjust;
mod pathutil;
mod pipeline;
mod printer;
mod processor;
mod sarif;
mod template;

pub use cancel::CancelToken;
pub use checkstyle::{CheckstyleDocument, CheckstyleError, CheckstyleFile};
pub use command::{
    CommandClient, CommandOutput, CommandRunner, Invocation, ProcessOutput, RunError,
    SystemClient,
};
pub use context::{detect_language, ContextError, ContextLineLoader, LineCache};
pub use index::{IndexError, PathIgnorer, PathIndex, PathIndexer};
pub use mapping::{MappingError, Record};
pub use parser::{parse_output, ParseError};
pub use path_adjust::{PathAdjustError, PathAdjuster};
pub use pathutil::{match_pattern, normalize_path, normalize_pattern, split_pattern_base};
pub use pipeline::{Pipeline, PipelineContext, PipelineError, PipelineMatch};
pub use printer::{print_findings, PrintError, PrintOptions};
pub use processor::{execute_processor, FilterError, ProcessorFilter};
pub use sarif::{SarifLog, SARIF_SCHEMA_URI, SARIF_VERSION};
pub use template::render_template;

/// Host CPU count, used as the default bound for parallel work.
pub(crate) fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
