//! Non-fatal extraction discrepancies

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of anomaly recorded during extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// An Article matched but its title did not
    MissingTitle,

    /// An Article matched but its content did not
    MissingContent,

    /// A table row's cell count differs from the header count
    TableShapeMismatch,

    /// A definition marked `required` matched nothing
    MissingRequired,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingTitle => "missing_title",
            Self::MissingContent => "missing_content",
            Self::TableShapeMismatch => "table_shape_mismatch",
            Self::MissingRequired => "missing_required",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,

    /// Label of the definition the anomaly was recorded against
    pub part: String,

    pub detail: String,
}

impl Anomaly {
    pub fn new(kind: AnomalyKind, part: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            part: part.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.part, self.detail)
    }
}
