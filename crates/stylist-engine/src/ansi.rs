use std::sync::OnceLock;

use regex::Regex;

// Matches CSI/OSC escape sequences, including SGR color codes. Linters love
// to color their output even when piped.
const ANSI_PATTERN: &str = "[\u{1B}\u{9B}][\\[\\]()#;?]*\
(?:(?:(?:[a-zA-Z\\d]*(?:;[a-zA-Z\\d]*)*)?\u{07})|\
(?:(?:\\d{1,4}(?:;\\d{0,4})*)?[\\dA-PRZcf-ntqry=><~]))";

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ANSI_PATTERN).expect("ansi pattern compiles"))
}

/// Strips ANSI escape sequences from `text`.
pub fn strip(text: &str) -> String {
    ansi_regex().replace_all(text, "").into_owned()
}
