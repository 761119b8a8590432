//! Read-only flattening of document-part trees
//!
//! All traversals are pre-order: a part is visited before its children, and
//! its variant children (table headers and rows, row columns, article title
//! and content) are visited before its `sub_parts`. The download links held
//! by a File are resources rather than structure and are only reached
//! through [`DocumentPart::links`] with downloads included.

use crate::document::part::{Article, File, Link, PartContent, PartKind, PartVariant};
use crate::document::DocumentPart;

impl DocumentPart {
    /// Every part in this tree, pre-order, starting with `self`
    pub fn walk(&self) -> Vec<&DocumentPart> {
        let mut out = Vec::new();
        visit(self, &mut out);
        out
    }

    /// Every part of the given kind, pre-order
    pub fn all_parts(&self, kind: PartKind) -> Vec<&DocumentPart> {
        self.walk()
            .into_iter()
            .filter(|part| part.kind() == kind)
            .collect()
    }

    /// Every payload of variant `V`, pre-order
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_harvest::document::{DocumentPart, Selector, Text};
    ///
    /// let part = DocumentPart::auto_detect().with_sub_parts(vec![
    ///     DocumentPart::text(Selector::parse("//h1").unwrap()),
    ///     DocumentPart::text(Selector::parse("//h2").unwrap()),
    /// ]);
    /// assert_eq!(part.all::<Text>().len(), 2);
    /// ```
    pub fn all<V: PartVariant>(&self) -> Vec<&V> {
        self.walk().into_iter().filter_map(|part| part.get::<V>()).collect()
    }

    /// Every Link payload, pre-order
    ///
    /// # Arguments
    ///
    /// * `include_downloads` - Also yield the download links of every File,
    ///   at the File's position in the walk
    pub fn links(&self, include_downloads: bool) -> Vec<&Link> {
        let mut out = Vec::new();
        for part in self.walk() {
            match &part.content {
                PartContent::Link(link) => out.push(link),
                PartContent::File(file) if include_downloads => {
                    out.extend(file.download_links.iter().filter_map(|l| l.get::<Link>()));
                }
                _ => {}
            }
        }
        out
    }

    /// Mutable access to every File payload, in the same order as `all::<File>()`
    pub fn files_mut(&mut self) -> Vec<&mut File> {
        let mut out = Vec::new();
        visit_files_mut(self, &mut out);
        out
    }
}

fn visit<'a>(part: &'a DocumentPart, out: &mut Vec<&'a DocumentPart>) {
    out.push(part);
    match &part.content {
        PartContent::Table(table) => {
            for child in table.headers.iter().chain(&table.rows) {
                visit(child, out);
            }
        }
        PartContent::TableRow(row) => {
            for child in &row.columns {
                visit(child, out);
            }
        }
        PartContent::Article(Article { title, content }) => {
            for child in title.iter().chain(content.iter()) {
                visit(child, out);
            }
        }
        _ => {}
    }
    for child in &part.sub_parts {
        visit(child, out);
    }
}

fn visit_files_mut<'a>(part: &'a mut DocumentPart, out: &mut Vec<&'a mut File>) {
    let DocumentPart {
        content, sub_parts, ..
    } = part;

    match content {
        PartContent::File(file) => out.push(file),
        PartContent::Table(table) => {
            for child in table.headers.iter_mut().chain(table.rows.iter_mut()) {
                visit_files_mut(child, out);
            }
        }
        PartContent::TableRow(row) => {
            for child in row.columns.iter_mut() {
                visit_files_mut(child, out);
            }
        }
        PartContent::Article(Article { title, content }) => {
            for child in title.iter_mut().chain(content.iter_mut()) {
                visit_files_mut(child, out);
            }
        }
        _ => {}
    }
    for child in sub_parts.iter_mut() {
        visit_files_mut(child, out);
    }
}
