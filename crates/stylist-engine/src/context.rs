use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use syntect::parsing::SyntaxSet;

use stylist_types::Location;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("line cache: {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("line cache: {path}:{line} is out of bounds (file has {len} lines)")]
    OutOfBounds {
        path: PathBuf,
        line: u32,
        len: usize,
    },
}

/// Caches file contents split into lines, keyed by absolute path.
/// Safe for concurrent readers; each file is read at most once.
#[derive(Debug, Default)]
pub struct LineCache {
    files: Mutex<HashMap<PathBuf, Arc<Vec<String>>>>,
}

impl LineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the 1-based `index1`-th line of the file at `path`, with any
    /// trailing carriage return trimmed.
    pub fn line(&self, path: &Path, index1: u32) -> Result<String, ContextError> {
        let index1 = index1.max(1);
        let lines = self.lines(path)?;

        let index0 = (index1 - 1) as usize;
        lines
            .get(index0)
            .map(|l| l.trim_end_matches('\r').to_string())
            .ok_or_else(|| ContextError::OutOfBounds {
                path: path.to_path_buf(),
                line: index1,
                len: lines.len(),
            })
    }

    fn lines(&self, path: &Path) -> Result<Arc<Vec<String>>, ContextError> {
        if let Some(lines) = self.files.lock().unwrap().get(path) {
            return Ok(Arc::clone(lines));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ContextError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let lines: Arc<Vec<String>> =
            Arc::new(content.split('\n').map(str::to_string).collect());

        let mut files = self.files.lock().unwrap();
        Ok(Arc::clone(
            files.entry(path.to_path_buf()).or_insert(lines),
        ))
    }
}

/// Loads the source lines referenced by a finding's location through a
/// shared [`LineCache`].
#[derive(Debug, Default)]
pub struct ContextLineLoader {
    cache: LineCache,
}

impl ContextLineLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads lines `[start_line, end_line]` for the location. Locations
    /// without a path or start line load nothing.
    pub fn load(&self, location: &Location) -> Result<Option<Vec<String>>, ContextError> {
        if location.path.is_empty() || location.start_line == 0 {
            return Ok(None);
        }

        let path = Path::new(&location.path);
        let (start, end) = location.line_range();
        let end = end.max(start);

        let mut lines = Vec::with_capacity((end - start + 1) as usize);
        for index in start..=end {
            lines.push(self.cache.line(path, index)?);
        }
        Ok(Some(lines))
    }
}

fn syntaxes() -> &'static SyntaxSet {
    static SYNTAXES: OnceLock<SyntaxSet> = OnceLock::new();
    SYNTAXES.get_or_init(SyntaxSet::load_defaults_newlines)
}

/// Detects the language of the context lines: by file extension first,
/// then by content sniffing, falling back to `plaintext`.
pub fn detect_language(path: &str, lines: &[String]) -> String {
    let set = syntaxes();

    let by_extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| set.find_syntax_by_extension(ext));

    let syntax = by_extension
        .or_else(|| lines.first().and_then(|l| set.find_syntax_by_first_line(l)));

    match syntax {
        Some(s) if s.name != "Plain Text" => s.name.to_lowercase(),
        _ => "plaintext".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    fn write_fixture(temp: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = temp.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn line_cache_is_one_based() {
        let temp = TempDir::new().unwrap();
        let path = write_fixture(&temp, "f.txt", "first\nsecond\nthird\n");

        let cache = LineCache::new();
        assert_eq!(cache.line(&path, 1).unwrap(), "first");
        assert_eq!(cache.line(&path, 3).unwrap(), "third");
        // Index 0 is treated as 1.
        assert_eq!(cache.line(&path, 0).unwrap(), "first");
    }

    #[test]
    fn line_cache_trims_carriage_returns() {
        let temp = TempDir::new().unwrap();
        let path = write_fixture(&temp, "crlf.txt", "one\r\ntwo\r\n");

        let cache = LineCache::new();
        assert_eq!(cache.line(&path, 2).unwrap(), "two");
    }

    #[test]
    fn line_cache_out_of_bounds() {
        let temp = TempDir::new().unwrap();
        let path = write_fixture(&temp, "f.txt", "only\n");

        let cache = LineCache::new();
        let err = cache.line(&path, 10).unwrap_err();
        assert!(matches!(err, ContextError::OutOfBounds { line: 10, .. }));
    }

    #[test]
    fn line_cache_missing_file() {
        let cache = LineCache::new();
        let err = cache.line(Path::new("/no/such/file"), 1).unwrap_err();
        assert!(matches!(err, ContextError::Io { .. }));
    }

    #[test]
    fn loader_covers_the_inclusive_range() {
        let temp = TempDir::new().unwrap();
        let path = write_fixture(&temp, "f.txt", "l1\nl2\nl3\nl4\n");

        let loader = ContextLineLoader::new();
        let location = Location {
            path: path.to_string_lossy().into_owned(),
            start_line: 2,
            end_line: 4,
            ..Default::default()
        };
        assert_eq!(
            loader.load(&location).unwrap(),
            Some(vec!["l2".to_string(), "l3".to_string(), "l4".to_string()])
        );
    }

    #[test]
    fn loader_collapses_unknown_end_line() {
        let temp = TempDir::new().unwrap();
        let path = write_fixture(&temp, "f.txt", "l1\nl2\n");

        let loader = ContextLineLoader::new();
        let location = Location {
            path: path.to_string_lossy().into_owned(),
            start_line: 2,
            end_line: 0,
            ..Default::default()
        };
        assert_eq!(loader.load(&location).unwrap(), Some(vec!["l2".to_string()]));
    }

    #[test]
    fn loader_skips_unlocated_findings() {
        let loader = ContextLineLoader::new();
        assert_eq!(loader.load(&Location::default()).unwrap(), None);

        let no_line = Location {
            path: "f.txt".to_string(),
            start_line: 0,
            ..Default::default()
        };
        assert_eq!(loader.load(&no_line).unwrap(), None);
    }

    #[test]
    fn detects_language_by_extension() {
        assert_eq!(detect_language("src/main.rs", &[]), "rust");
        assert_eq!(detect_language("script.py", &[]), "python");
    }

    #[test]
    fn detects_language_by_first_line() {
        let lines = vec!["#!/usr/bin/env bash".to_string(), "echo hi".to_string()];
        let detected = detect_language("no-extension", &lines);
        assert!(
            detected.contains("bash") || detected.contains("shell"),
            "detected {detected:?}"
        );
    }

    #[test]
    fn falls_back_to_plaintext() {
        assert_eq!(
            detect_language("mystery.zzz", &["gibberish".to_string()]),
            "plaintext"
        );
    }
}
