use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use stylist_types::{CommandKind, Finding, Processor};

use crate::cancel::CancelToken;
use crate::command::{CommandClient, CommandRunner, RunError};

/// Dispatches a processor's check or fix command over its matched paths.
/// A processor without the requested command is a silent no-op.
pub fn execute_processor(
    processor: &Processor,
    kind: CommandKind,
    base_path: &Path,
    client: &dyn CommandClient,
    cancel: &CancelToken,
    paths: &[PathBuf],
) -> Result<Vec<Finding>, RunError> {
    let Some(spec) = processor.command(kind) else {
        debug!(processor = %processor.name, kind = kind.as_str(), "no command configured");
        return Ok(vec![]);
    };

    CommandRunner::new(spec, &processor.name, base_path, client, cancel).execute(paths)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("no processor named {0}")]
    UnknownName(String),

    #[error("no processor tagged {0}")]
    UnknownTag(String),
}

/// Selects processors by name and/or tag. An empty filter selects
/// everything; unknown names and tags are errors, not silence.
#[derive(Debug, Clone, Default)]
pub struct ProcessorFilter {
    pub names: Vec<String>,
    pub tags: Vec<String>,
}

impl ProcessorFilter {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.tags.is_empty()
    }

    pub fn filter(&self, processors: &[Processor]) -> Result<Vec<Processor>, FilterError> {
        if self.is_empty() {
            return Ok(processors.to_vec());
        }

        let known_names: BTreeSet<&str> =
            processors.iter().map(|p| p.name.as_str()).collect();
        for name in &self.names {
            if !known_names.contains(name.as_str()) {
                return Err(FilterError::UnknownName(name.clone()));
            }
        }

        let known_tags: BTreeSet<&str> = processors
            .iter()
            .flat_map(|p| p.tags.iter().map(String::as_str))
            .collect();
        for tag in &self.tags {
            if !known_tags.contains(tag.as_str()) {
                return Err(FilterError::UnknownTag(tag.clone()));
            }
        }

        Ok(processors
            .iter()
            .filter(|p| {
                self.names.iter().any(|n| *n == p.name)
                    || self.tags.iter().any(|t| p.tags.contains(t))
            })
            .cloned()
            .collect())
    }
}
