//! Section-aware text store for the knowledge-base document.
//!
//! The document is a single UTF-8 file of blank-line separated sections,
//! each opening with a `<n>. <TITLE>` header followed by `- <entry>` lines.
//! Nothing is cached: every operation re-reads the whole file and every
//! mutation re-writes the whole file.
//!
//! There is no locking. Two writers pointed at the same file race, and the
//! later write silently replaces the earlier one.

mod section;

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

pub use section::HeaderMode;

/// Text returned by [`KnowledgeBase::read`] when the file does not exist.
pub const NOT_FOUND_TEXT: &str = "Knowledge base not found";

/// Acknowledgement returned by [`KnowledgeBase::write`].
pub const UPDATED_TEXT: &str = "Knowledge base updated successfully";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Cannot read knowledge base {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot write knowledge base {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result of a section lookup. Every variant renders as displayable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionLookup {
    Found(String),
    NotFound(i64),
    InvalidNumber(String),
}

impl fmt::Display for SectionLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionLookup::Found(block) => f.write_str(block),
            SectionLookup::NotFound(index) => write!(f, "Section {index} not found"),
            SectionLookup::InvalidNumber(raw) => write!(f, "Invalid section number: {raw}"),
        }
    }
}

/// Result of appending an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddEntryOutcome {
    Added { section: i64, entry: String },
    SectionNotFound(i64),
}

impl fmt::Display for AddEntryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddEntryOutcome::Added { section, entry } => {
                write!(f, "Added entry to section {section}: {entry}")
            }
            AddEntryOutcome::SectionNotFound(section) => write!(f, "Section {section} not found"),
        }
    }
}

/// A newly created section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSection {
    pub number: usize,
    pub title: String,
}

impl fmt::Display for CreatedSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Created new section: {}. {}", self.number, self.title)
    }
}

/// The knowledge-base document on disk.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    path: PathBuf,
    mode: HeaderMode,
}

impl KnowledgeBase {
    pub fn new(path: impl Into<PathBuf>, mode: HeaderMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header_mode(&self) -> HeaderMode {
        self.mode
    }

    /// Full document text, or [`NOT_FOUND_TEXT`] when the file is absent.
    pub fn read(&self) -> Result<String, StoreError> {
        Ok(self
            .load()?
            .unwrap_or_else(|| NOT_FOUND_TEXT.to_string()))
    }

    /// Overwrite the whole document.
    pub fn write(&self, text: &str) -> Result<&'static str, StoreError> {
        std::fs::write(&self.path, text).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), bytes = text.len(), "knowledge base written");
        Ok(UPDATED_TEXT)
    }

    /// Look up a section by its (unparsed) number.
    pub fn get_section(&self, raw_index: &str) -> Result<SectionLookup, StoreError> {
        let index = match raw_index.trim().parse::<i64>() {
            Ok(n) => n,
            Err(_) => return Ok(SectionLookup::InvalidNumber(raw_index.to_string())),
        };

        let document = self.read()?;
        Ok(match self.mode.find_block(&document, index) {
            Some(block) => SectionLookup::Found(block.to_string()),
            None => SectionLookup::NotFound(index),
        })
    }

    /// Append `- <entry>` as the last line of section `section`.
    ///
    /// The document is left untouched when the section does not exist.
    pub fn add_entry(&self, section: i64, entry: &str) -> Result<AddEntryOutcome, StoreError> {
        let document = self.load()?.unwrap_or_default();
        let line = format!("- {entry}");
        let mut lines: Vec<&str> = document.split('\n').collect();

        let Some(insert_at) = self.mode.entry_insertion_point(&lines, section) else {
            debug!(section, "add_entry: section not found");
            return Ok(AddEntryOutcome::SectionNotFound(section));
        };

        lines.insert(insert_at, line.as_str());
        self.write(&lines.join("\n"))?;

        info!(section, line = insert_at, "entry added");
        Ok(AddEntryOutcome::Added {
            section,
            entry: entry.to_string(),
        })
    }

    /// Append a new `<n>. <TITLE>` section at the end of the document.
    pub fn create_section(&self, title: &str) -> Result<CreatedSection, StoreError> {
        let mut document = self.load()?.unwrap_or_default();
        let created = CreatedSection {
            number: self.mode.count_sections(&document) + 1,
            title: title.to_uppercase(),
        };

        if !document.is_empty() {
            document.push_str("\n\n");
        }
        document.push_str(&format!("{}. {}", created.number, created.title));
        self.write(&document)?;

        info!(number = created.number, title = %created.title, "section created");
        Ok(created)
    }

    fn load(&self) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
