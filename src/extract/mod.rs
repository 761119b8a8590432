//! Extraction engine
//!
//! Applies a [`DocumentPart`](crate::document::DocumentPart) definition tree
//! to parsed HTML and produces a result tree plus a side channel of
//! anomalies. Extraction is synchronous and read-only over the document.

mod anomaly;
mod autodetect;
mod engine;

pub use anomaly::{Anomaly, AnomalyKind};
pub use engine::{parse, parse_html, Extraction};
