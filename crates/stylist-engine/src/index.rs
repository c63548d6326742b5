use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::GlobMatcher;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use tracing::debug;

use crate::pathutil::{
    build_glob, compile_pattern, is_pattern, normalize_path, normalize_pattern,
    split_pattern_base, to_slash,
};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("pattern does not exist: {0}")]
    PatternNotExist(String),

    #[error("invalid pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("gitignore parse: {0}")]
    Gitignore(ignore::Error),

    #[error("walk: {0}")]
    Walk(ignore::Error),

    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Decides which paths are excluded during indexing: the caller's exclude
/// patterns plus the `.gitignore` at the base path, when present.
pub struct PathIgnorer {
    gitignore: Option<Gitignore>,
    excludes: Vec<GlobMatcher>,
}

impl PathIgnorer {
    /// Compiles exclude patterns and loads `.gitignore` rules. Invalid
    /// patterns fail loudly; they are never silently ignored.
    pub fn new(gitignore_path: &Path, patterns: &[String]) -> Result<Self, IndexError> {
        let mut excludes = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            excludes.push(compile_pattern(pattern)?);
        }

        let gitignore = if gitignore_path.is_file() {
            let base = gitignore_path.parent().unwrap_or(Path::new("."));
            let mut builder = GitignoreBuilder::new(base);
            if let Some(err) = builder.add(gitignore_path) {
                return Err(IndexError::Gitignore(err));
            }
            Some(builder.build().map_err(IndexError::Gitignore)?)
        } else {
            None
        };

        Ok(Self {
            gitignore,
            excludes,
        })
    }

    pub fn should_ignore(&self, path: &Path, is_dir: bool) -> bool {
        if let Some(gitignore) = &self.gitignore {
            if gitignore.matched(path, is_dir).is_ignore() {
                return true;
            }
        }
        let slashed = to_slash(&path.to_string_lossy());
        self.excludes
            .iter()
            .any(|m| m.is_match(Path::new(&slashed)))
    }
}

/// An index of discovered paths, keyed by the include pattern they matched.
#[derive(Debug, Default)]
pub struct PathIndex {
    base_path: PathBuf,
    sets: BTreeMap<String, BTreeSet<PathBuf>>,
}

impl PathIndex {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            sets: BTreeMap::new(),
        }
    }

    /// Adds a pattern/path tuple. Returns false if it was already present.
    pub fn add(&mut self, pattern: &str, path: PathBuf) -> bool {
        let key = normalize_pattern(&self.base_path, pattern);
        let path = normalize_path(&self.base_path, &path);
        self.sets.entry(key).or_default().insert(path)
    }

    /// Paths recorded for the given pattern, in lexicographic order.
    pub fn paths_for(&self, pattern: &str) -> impl Iterator<Item = &PathBuf> {
        let key = normalize_pattern(&self.base_path, pattern);
        self.sets.get(&key).into_iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(BTreeSet::is_empty)
    }
}

/// Resolves path-specs (files, directories, doublestar globs) into a
/// [`PathIndex`], honoring excludes and `.gitignore`.
#[derive(Debug)]
pub struct PathIndexer {
    base_path: PathBuf,
    /// Normalized include patterns with their compiled matchers.
    includes: Vec<(String, GlobMatcher)>,
    /// Normalized exclude patterns.
    excludes: Vec<String>,
}

impl PathIndexer {
    pub fn new(
        base_path: &Path,
        includes: &[String],
        excludes: &[String],
    ) -> Result<Self, IndexError> {
        // Normalize patterns to absolute form once so index keys, matching,
        // and exclusion all agree.
        let unique_includes: BTreeSet<String> = includes
            .iter()
            .map(|p| normalize_pattern(base_path, p))
            .collect();
        let mut compiled = Vec::with_capacity(unique_includes.len());
        for pattern in unique_includes {
            let matcher = compile_pattern(&pattern)?;
            compiled.push((pattern, matcher));
        }

        let normalized_excludes: BTreeSet<String> = excludes
            .iter()
            .map(|p| normalize_pattern(base_path, p))
            .collect();
        // Validate excludes up front; PathIgnorer compiles them again later.
        for pattern in &normalized_excludes {
            build_glob(pattern)?;
        }

        Ok(Self {
            base_path: base_path.to_path_buf(),
            includes: compiled,
            excludes: normalized_excludes.into_iter().collect(),
        })
    }

    /// Resolves each path-spec to concrete paths and adds those matching an
    /// include pattern (and no exclude) to the returned index.
    pub fn index(&self, path_specs: &[String]) -> Result<PathIndex, IndexError> {
        let ignorer = Arc::new(PathIgnorer::new(
            &self.base_path.join(".gitignore"),
            &self.excludes,
        )?);
        let mut index = PathIndex::new(self.base_path.clone());

        debug!(includes = ?self.includes.iter().map(|(p, _)| p).collect::<Vec<_>>(), "indexing");
        debug!(excludes = ?self.excludes, "indexing");

        let (files, dirs, patterns) = self.partition_path_specs(path_specs)?;
        debug!(?files, ?dirs, ?patterns, "partitioned path specs");

        for file in &files {
            self.index_path(file, &ignorer, &mut index);
        }
        for dir in &dirs {
            self.walk(dir, &ignorer, None, &mut index)?;
        }
        if !patterns.is_empty() {
            let mut matchers = Vec::with_capacity(patterns.len());
            for pattern in &patterns {
                matchers.push(compile_pattern(pattern)?);
            }
            self.walk(&self.base_path, &ignorer, Some(&matchers), &mut index)?;
        }

        Ok(index)
    }

    /// Classifies each path-spec as a file, a directory, or a pattern.
    fn partition_path_specs(
        &self,
        path_specs: &[String],
    ) -> Result<(Vec<PathBuf>, Vec<PathBuf>, Vec<String>), IndexError> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut patterns = Vec::new();

        for spec in path_specs {
            let normalized = normalize_pattern(&self.base_path, spec);

            if is_pattern(&normalized) {
                let (base, _) = split_pattern_base(&normalized);
                if let Err(source) = std::fs::symlink_metadata(&base) {
                    if source.kind() == io::ErrorKind::NotFound {
                        return Err(IndexError::PatternNotExist(spec.clone()));
                    }
                    return Err(IndexError::Io {
                        path: PathBuf::from(base),
                        source,
                    });
                }
                patterns.push(normalized);
                continue;
            }

            let path = PathBuf::from(&normalized);
            let metadata =
                std::fs::symlink_metadata(&path).map_err(|source| IndexError::Io {
                    path: path.clone(),
                    source,
                })?;
            if metadata.is_dir() {
                dirs.push(path);
            } else {
                files.push(path);
            }
        }

        Ok((files, dirs, patterns))
    }

    /// Walks `root` depth-first, pruning excluded directories, and indexes
    /// every surviving file (optionally restricted to the path-spec
    /// patterns being resolved).
    fn walk(
        &self,
        root: &Path,
        ignorer: &Arc<PathIgnorer>,
        spec_matchers: Option<&[GlobMatcher]>,
        index: &mut PathIndex,
    ) -> Result<(), IndexError> {
        let filter_ignorer = Arc::clone(ignorer);
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                if is_dir && filter_ignorer.should_ignore(entry.path(), true) {
                    debug!(path = %entry.path().display(), "pruning excluded directory");
                    return false;
                }
                true
            })
            .build();

        for entry in walker {
            let entry = entry.map_err(IndexError::Walk)?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            if let Some(matchers) = spec_matchers {
                let slashed = to_slash(&entry.path().to_string_lossy());
                if !matchers.iter().any(|m| m.is_match(Path::new(&slashed))) {
                    continue;
                }
            }

            self.index_path(entry.path(), ignorer, index);
        }

        Ok(())
    }

    /// Adds `path` to the index under every include pattern it matches,
    /// unless it is excluded.
    fn index_path(&self, path: &Path, ignorer: &PathIgnorer, index: &mut PathIndex) {
        if ignorer.should_ignore(path, false) {
            debug!(path = %path.display(), "ignoring path");
            return;
        }

        let slashed = to_slash(&path.to_string_lossy());
        let candidate = Path::new(&slashed);
        for (pattern, matcher) in &self.includes {
            if matcher.is_match(candidate) {
                debug!(path = %path.display(), pattern = %pattern, "matched");
                index.add(pattern, path.to_path_buf());
            }
        }
    }
}
