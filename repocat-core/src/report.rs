//! Build diagnostics and results

use serde::Serialize;
use std::fmt;

/// What sort of problem a diagnostic describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A referenced object is missing
    NotFound,
    /// Metadata could not be parsed or has a field of the wrong type
    Malformed,
    /// A record failed payload verification
    Integrity,
    /// Something odd but harmless: empty catalogs, names differing by case
    Anomaly,
    /// A non-fatal store failure while writing or pruning
    Store,
}

/// One entry in an [`ErrorReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Append-only, ordered list of diagnostics produced during a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorReport {
    entries: Vec<Diagnostic>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(?kind, "{}", message);
        self.entries.push(Diagnostic { kind, message });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// The plain message strings, in the order they were recorded.
    pub fn messages(&self) -> Vec<&str> {
        self.entries.iter().map(|d| d.message.as_str()).collect()
    }

    /// Entries of a single kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<&Diagnostic> {
        self.entries.iter().filter(|d| d.kind == kind).collect()
    }
}

/// A catalog that was persisted by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenCatalog {
    pub name: String,
    pub records: usize,
}

/// Outcome of a build that ran to completion.
///
/// A non-empty `errors` list still means success: the build finished and
/// persisted everything it could.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub errors: ErrorReport,
    pub catalogs_written: Vec<WrittenCatalog>,
    pub catalogs_deleted: Vec<String>,
    pub icons_hashed: usize,
    pub icon_manifest_written: bool,
}

impl BuildReport {
    /// True when the build produced no diagnostics at all.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn written_names(&self) -> Vec<&str> {
        self.catalogs_written.iter().map(|c| c.name.as_str()).collect()
    }
}
