use std::path::{Component, Path, PathBuf};

use stylist_types::ResultPathKind;

use crate::pathutil::{clean_path, normalize_path};

#[derive(Debug, thiserror::Error)]
#[error("unable to convert to {kind} path: {path}")]
pub struct PathAdjustError {
    pub kind: &'static str,
    pub path: String,
}

/// Rewrites finding paths to the configured form (absolute, or relative to
/// the invocation's working directory).
pub struct PathAdjuster {
    base_path: PathBuf,
    kind: ResultPathKind,
}

impl PathAdjuster {
    pub fn new(base_path: &Path, kind: ResultPathKind) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            kind,
        }
    }

    pub fn convert(&self, path: &str) -> Result<String, PathAdjustError> {
        if path.is_empty() {
            return Ok(String::new());
        }
        let p = Path::new(path);

        let converted = match self.kind {
            ResultPathKind::Absolute => normalize_path(&self.base_path, p),
            ResultPathKind::Relative => {
                if p.is_absolute() {
                    relative_to(&self.base_path, &clean_path(p)).ok_or(PathAdjustError {
                        kind: "relative",
                        path: path.to_string(),
                    })?
                } else {
                    clean_path(p)
                }
            }
        };

        Ok(converted.to_string_lossy().into_owned())
    }
}

/// Computes `path` relative to `base`, inserting `..` components as needed.
/// Both inputs must be absolute.
fn relative_to(base: &Path, path: &Path) -> Option<PathBuf> {
    if !base.is_absolute() || !path.is_absolute() {
        return None;
    }

    let base_clean = clean_path(base);
    let base: Vec<Component> = base_clean.components().collect();
    let target: Vec<Component> = path.components().collect();

    let shared = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in shared..base.len() {
        out.push("..");
    }
    for component in &target[shared..] {
        out.push(component);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    Some(out)
}
