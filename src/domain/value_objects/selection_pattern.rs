//! Package selection patterns.
//!
//! A pattern selects a package when it is a substring of the package name or
//! directory, or when it glob-matches either of them. Package names are
//! compared with every `/` replaced by `.` on both sides so that `@scope/*`
//! selects `@scope/foo` without `*` having to cross a path separator.
//! Brace alternatives (`{a,b}`) and ranges (`{1..3}`) are expanded before the
//! globs are compiled.

use glob::{MatchOptions, Pattern};
use tracing::warn;

use crate::common::error::WsFilterError;
use crate::common::result::WsFilterResult;

/// Patterns that select every package and skip filtering
pub const SELECT_ALL_PATTERNS: [&str; 2] = [".", "*"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A single compiled selection pattern
#[derive(Debug, Clone)]
pub struct SelectionPattern {
    raw: String,
    name_globs: Vec<Pattern>,
    directory_globs: Vec<Pattern>,
}

impl SelectionPattern {
    /// Compile `raw`. Glob syntax errors are not fatal: the pattern then only
    /// selects by substring.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let name_globs = compile_globs(&collapse_globstars(&raw.replace('/', ".")));
        let directory_globs = compile_globs(raw.strip_prefix("./").unwrap_or(&raw));

        Self {
            raw,
            name_globs,
            directory_globs,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this is one of the select-everything shortcuts
    pub fn selects_everything(&self) -> bool {
        SELECT_ALL_PATTERNS.contains(&self.raw.trim())
    }

    pub fn matches_name(&self, name: &str) -> bool {
        if name.contains(self.raw.as_str()) {
            return true;
        }
        let dotted = name.replace('/', ".");
        self.name_globs
            .iter()
            .any(|glob| glob.matches_with(&dotted, MATCH_OPTIONS))
    }

    pub fn matches_directory(&self, directory: &str) -> bool {
        directory.contains(self.raw.as_str())
            || self
                .directory_globs
                .iter()
                .any(|glob| glob.matches_with(directory, MATCH_OPTIONS))
    }

    /// Substring or glob match against the package name or its directory
    pub fn matches(&self, name: &str, directory: &str) -> bool {
        self.matches_name(name) || self.matches_directory(directory)
    }
}

/// Non-empty set of selection patterns; a package is selected when any of
/// them matches.
#[derive(Debug, Clone)]
pub struct SelectionPatterns {
    patterns: Vec<SelectionPattern>,
}

impl SelectionPatterns {
    /// Build from raw strings, discarding blank entries.
    ///
    /// Fails with `InvalidArgument` when nothing is left.
    pub fn new<I, S>(patterns: I) -> WsFilterResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<SelectionPattern> = patterns
            .into_iter()
            .filter(|p| !p.as_ref().trim().is_empty())
            .map(|p| SelectionPattern::new(p.as_ref()))
            .collect();

        if patterns.is_empty() {
            return Err(WsFilterError::invalid_argument(
                "patterns",
                "No pattern provided.",
            ));
        }

        Ok(Self { patterns })
    }

    /// Single-pattern convenience constructor
    pub fn single(pattern: impl AsRef<str>) -> WsFilterResult<Self> {
        Self::new([pattern])
    }

    pub fn selects_everything(&self) -> bool {
        self.patterns.iter().any(SelectionPattern::selects_everything)
    }

    pub fn matches(&self, name: &str, directory: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name, directory))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectionPattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Dotted names have no separators, so `**` means the same as `*` there.
/// `glob` only accepts `**` as a whole path component.
fn collapse_globstars(pattern: &str) -> String {
    let mut collapsed = pattern.to_string();
    while collapsed.contains("**") {
        collapsed = collapsed.replace("**", "*");
    }
    collapsed
}

fn compile_globs(pattern: &str) -> Vec<Pattern> {
    expand_braces(pattern)
        .into_iter()
        .filter_map(|expanded| match Pattern::new(&expanded) {
            Ok(glob) => Some(glob),
            Err(e) => {
                warn!(pattern = %expanded, error = %e, "ignoring unusable glob pattern");
                None
            }
        })
        .collect()
}

/// Largest number of values a `{a..b}` range may expand to
pub const MAX_BRACE_RANGE: u64 = 1000;

/// Expand shell-style braces: `{a,b}c` -> `ac`, `bc`; `v{1..3}` -> `v1`, `v2`, `v3`.
///
/// Braces without a comma or range, escaped braces, and ranges longer than
/// [`MAX_BRACE_RANGE`] are kept literally.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut from = 0;

    while let Some(open) = find_unescaped(&chars, '{', from) {
        if let Some(close) = matching_close(&chars, open) {
            let body: String = chars[open + 1..close].iter().collect();
            if let Some(alternatives) = brace_alternatives(&body) {
                let prefix: String = chars[..open].iter().collect();
                let suffix: String = chars[close + 1..].iter().collect();
                return alternatives
                    .iter()
                    .flat_map(|alt| expand_braces(&format!("{prefix}{alt}{suffix}")))
                    .collect();
            }
        }
        from = open + 1;
    }

    vec![pattern.to_string()]
}

fn find_unescaped(chars: &[char], target: char, from: usize) -> Option<usize> {
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == target => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn matching_close(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn brace_alternatives(body: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut escaped = false;

    for c in body.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                current.push(c);
                escaped = true;
            }
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);

    if parts.len() > 1 {
        return Some(parts);
    }
    brace_range(body)
}

fn brace_range(body: &str) -> Option<Vec<String>> {
    let (start, end) = body.split_once("..")?;

    if let (Ok(a), Ok(b)) = (start.parse::<i64>(), end.parse::<i64>()) {
        if a.abs_diff(b) >= MAX_BRACE_RANGE {
            warn!(range = %body, limit = MAX_BRACE_RANGE, "brace range too large, keeping it literally");
            return None;
        }
        let values: Vec<i64> = if a <= b {
            (a..=b).collect()
        } else {
            (b..=a).rev().collect()
        };
        return Some(values.into_iter().map(|v| v.to_string()).collect());
    }

    let mut start_chars = start.chars();
    let mut end_chars = end.chars();
    match (
        start_chars.next(),
        start_chars.next(),
        end_chars.next(),
        end_chars.next(),
    ) {
        (Some(a), None, Some(b), None) if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
            let (lo, hi) = (a.min(b) as u8, a.max(b) as u8);
            let mut letters: Vec<String> = (lo..=hi).map(|c| (c as char).to_string()).collect();
            if a > b {
                letters.reverse();
            }
            Some(letters)
        }
        _ => None,
    }
}
