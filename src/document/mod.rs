//! Document-part model
//!
//! A [`DocumentPart`] tree is both the declarative description of what to
//! extract from a page and the shape of what was extracted.

mod part;
mod selector;
mod traversal;

pub use part::{
    Article, AutoDetect, DocumentPart, File, FileData, Link, PartContent, PartKind, PartVariant,
    Table, TableRow, Text,
};
pub use selector::Selector;
