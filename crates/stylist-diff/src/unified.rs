use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DiffParseError {
    #[error("malformed hunk header: {0}")]
    MalformedHunkHeader(String),

    #[error("hunk outside of file header: {0}")]
    OrphanHunk(String),
}

/// One `@@` hunk: the raw header plus its body lines (prefixes retained).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub header: String,
    pub old_start: u32,
    pub lines: Vec<String>,
}

impl Hunk {
    /// Line number (in the pre-image) of the first added or removed line.
    /// Hunks usually open with a few context lines; skip past those.
    pub fn first_changed_line(&self) -> u32 {
        let mut offset = 0u32;
        for line in &self.lines {
            match line.as_bytes().first() {
                Some(b'+') | Some(b'-') => break,
                _ => offset = offset.saturating_add(1),
            }
        }
        self.old_start.saturating_add(offset)
    }
}

/// All hunks for a single file within a multi-file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path from the `+++` header (or the `diff --git` line), with any
    /// `a/`/`b/` prefix stripped and separators normalized to `/`.
    pub path: String,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Line number of the first change across all hunks; 0 when the file
    /// entry carries no hunks (mode changes, binary files).
    pub fn first_changed_line(&self) -> u32 {
        self.hunks
            .first()
            .map(Hunk::first_changed_line)
            .unwrap_or(0)
    }

    /// The hunks rendered back to text: each header followed by its body.
    pub fn hunk_lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for hunk in &self.hunks {
            out.push(hunk.header.clone());
            out.extend(hunk.lines.iter().cloned());
        }
        out
    }
}

/// Parse a unified multi-file diff into per-file hunk summaries.
///
/// File entries appear in diff order; hunks appear in file order. Metadata
/// lines (`index`, mode changes, binary notices) are skipped.
pub fn parse_multi_file_diff(diff_text: &str) -> Result<Vec<FileDiff>, DiffParseError> {
    let mut files: Vec<FileDiff> = Vec::new();

    for raw in diff_text.lines() {
        if raw.starts_with("diff --git ") {
            if let Some(path) = parse_diff_git_line(raw) {
                files.push(FileDiff {
                    path,
                    hunks: vec![],
                });
            }
            continue;
        }

        if raw.starts_with("--- ") {
            // Start of a file entry in headerless diffs (e.g. `gofmt -d`).
            // A `diff --git` line, when present, has already opened one
            // with no hunks yet.
            let already_open = files.last().is_some_and(|f| f.hunks.is_empty());
            if !already_open {
                if let Some(path) = parse_marker_path(raw, "--- ") {
                    files.push(FileDiff {
                        path,
                        hunks: vec![],
                    });
                }
            }
            continue;
        }

        if raw.starts_with("+++ ") {
            // Prefer the post-image name when present.
            if let Some(path) = parse_marker_path(raw, "+++ ") {
                if let Some(file) = files.last_mut() {
                    if file.hunks.is_empty() {
                        file.path = path;
                    }
                }
            }
            continue;
        }

        if raw.starts_with("@@") {
            let old_start = parse_hunk_header(raw)?;
            let file = files
                .last_mut()
                .ok_or_else(|| DiffParseError::OrphanHunk(raw.to_string()))?;
            file.hunks.push(Hunk {
                header: raw.to_string(),
                old_start,
                lines: vec![],
            });
            continue;
        }

        let in_hunk = files.last().is_some_and(|f| !f.hunks.is_empty());
        if !in_hunk {
            continue;
        }

        match raw.as_bytes().first() {
            Some(b'+') | Some(b'-') | Some(b' ') | Some(b'\\') => {
                if let Some(hunk) = files.last_mut().and_then(|f| f.hunks.last_mut()) {
                    hunk.lines.push(raw.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(files)
}

fn parse_hunk_header(line: &str) -> Result<u32, DiffParseError> {
    // Formats:
    // @@ -1,2 +3,4 @@
    // @@ -1 +3 @@
    let minus = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| DiffParseError::MalformedHunkHeader(line.to_string()))?;

    let minus = minus
        .strip_prefix('-')
        .ok_or_else(|| DiffParseError::MalformedHunkHeader(line.to_string()))?;
    let start_str = minus.split(',').next().unwrap_or(minus);
    start_str
        .parse()
        .map_err(|_| DiffParseError::MalformedHunkHeader(line.to_string()))
}

fn parse_diff_git_line(line: &str) -> Option<String> {
    // diff --git a/foo b/foo
    let mut it = line.split_whitespace();
    if it.next()? != "diff" {
        return None;
    }
    if it.next()? != "--git" {
        return None;
    }
    let _a = it.next()?;
    let b = it.next()?;
    strip_prefix_path(b)
}

fn parse_marker_path(line: &str, marker: &str) -> Option<String> {
    let rest = line.strip_prefix(marker)?;
    let first = rest.split('\t').next().unwrap_or(rest);
    if first == "/dev/null" {
        return None;
    }
    strip_prefix_path(first)
}

fn strip_prefix_path(p: &str) -> Option<String> {
    let p = p.trim();
    let p = p
        .strip_prefix("a/")
        .or_else(|| p.strip_prefix("b/"))
        .unwrap_or(p);

    // Normalize to forward slashes so findings are host-independent.
    let normalized = Path::new(p)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}
