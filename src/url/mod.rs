//! URL handling module for Sumi-Harvest
//!
//! This module provides link resolution against a document base URI, host
//! extraction and wildcard host matching for route tables.

mod domain;
mod matcher;
mod resolve;

// Re-export main functions
pub use domain::extract_domain;
pub use matcher::matches_wildcard;
pub use resolve::{resolve_link, resolve_link_url};
