use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

/// How section header lines are recognised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderMode {
    /// A header starts at column 0 with digits immediately followed by `". "`.
    #[default]
    Strict,
    /// Lookup matches trimmed lines starting with `"<n>. "`; counting accepts
    /// any non-empty line that starts with a digit and contains `". "`.
    Legacy,
}

impl fmt::Display for HeaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderMode::Strict => write!(f, "strict"),
            HeaderMode::Legacy => write!(f, "legacy"),
        }
    }
}

impl FromStr for HeaderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(HeaderMode::Strict),
            "legacy" => Ok(HeaderMode::Legacy),
            other => Err(format!(
                "Unknown header mode: '{other}'. Expected one of: strict, legacy"
            )),
        }
    }
}

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"^(\d+)\. ").expect("header pattern is valid"))
}

impl HeaderMode {
    /// Whether `line` is the header of section `index`.
    pub fn is_header_for(&self, line: &str, index: i64) -> bool {
        match self {
            HeaderMode::Strict => header_regex()
                .captures(line)
                .and_then(|caps| caps[1].parse::<i64>().ok())
                .is_some_and(|n| n == index),
            HeaderMode::Legacy => line.trim().starts_with(&format!("{index}. ")),
        }
    }

    /// Whether `line` counts as a section header when numbering a new section.
    pub fn counts_as_header(&self, line: &str) -> bool {
        match self {
            HeaderMode::Strict => header_regex().is_match(line),
            HeaderMode::Legacy => {
                !line.trim().is_empty()
                    && line.starts_with(|c: char| c.is_ascii_digit())
                    && line.contains(". ")
            }
        }
    }

    /// Number of section headers in `document`.
    pub fn count_sections(&self, document: &str) -> usize {
        document
            .split('\n')
            .filter(|line| self.counts_as_header(line))
            .count()
    }

    /// First blank-line delimited block whose first line is the header of
    /// section `index`, returned verbatim.
    pub fn find_block<'a>(&self, document: &'a str, index: i64) -> Option<&'a str> {
        document.split("\n\n").find(|block| {
            let body = match self {
                HeaderMode::Strict => block.trim_start_matches(['\n', '\r']),
                HeaderMode::Legacy => block.trim_start(),
            };
            body.lines()
                .next()
                .is_some_and(|first| self.is_header_for(first, index))
        })
    }

    /// Line index at which a new entry for section `index` is inserted, or
    /// `None` when the section header does not occur in `lines`.
    ///
    /// The scan stops at the header of `index + 1` or at the final line. The
    /// entry lands after the last non-blank line before that stop, so the
    /// blank separator stays between sections.
    pub fn entry_insertion_point(&self, lines: &[&str], index: i64) -> Option<usize> {
        let header_at = lines.iter().position(|line| self.is_header_for(line, index))?;
        let next = index.checked_add(1);

        let stop = lines
            .iter()
            .enumerate()
            .skip(header_at + 1)
            .find(|(_, line)| next.is_some_and(|n| self.is_header_for(line, n)))
            .map(|(i, _)| i)
            .unwrap_or(lines.len());

        let mut insert_at = stop;
        while insert_at > header_at + 1 && lines[insert_at - 1].trim().is_empty() {
            insert_at -= 1;
        }
        Some(insert_at)
    }
}
