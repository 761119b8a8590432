//! The document-part tree
//!
//! The same type describes both an extraction *definition* (selectors, column
//! definitions, title/content definitions) and an extraction *result*
//! (matched text, resolved links, table cells). Definitions come from
//! configuration; results are produced fresh by the extraction engine.

use crate::document::Selector;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// The closed set of document-part variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartKind {
    Text,
    Link,
    File,
    Table,
    TableRow,
    Article,
    AutoDetect,
}

impl PartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Link => "link",
            Self::File => "file",
            Self::Table => "table",
            Self::TableRow => "table-row",
            Self::Article => "article",
            Self::AutoDetect => "auto-detect",
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in a definition or result tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DocumentPart {
    /// Human label used to correlate results with configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Absolute URI that relative links in this part resolve against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<Url>,

    /// Match rule within the parent's scope; `None` means the scope itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    /// Zero matches for a required part is recorded as an anomaly
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,

    /// Ordered child parts, matched relative to this part's match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_parts: Vec<DocumentPart>,

    #[serde(flatten)]
    pub content: PartContent,
}

/// Variant-specific payload of a [`DocumentPart`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PartContent {
    Text(Text),
    Link(Link),
    File(File),
    Table(Table),
    TableRow(TableRow),
    Article(Article),
    AutoDetect(AutoDetect),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Text {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Always absolute in results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<Url>,

    /// Anchor text
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct File {
    /// Link parts pointing at the downloadable resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub download_links: Vec<DocumentPart>,

    /// One entry per download link once the download step has run;
    /// `None` marks a download that failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_data_list: Vec<Option<FileData>>,
}

/// A downloaded resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileData {
    pub uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Table {
    /// Header cells within the table (default: the cells of the first
    /// `thead` row, else of the first row made only of `th` cells)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_selector: Option<Selector>,

    /// Row elements within the table (default: the table's own `tr`
    /// elements, skipping nested tables)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_selector: Option<Selector>,

    /// Data cells within a row (default: the row's `td` and `th` children)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_selector: Option<Selector>,

    /// Column definitions, applied to cells by position
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<DocumentPart>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<DocumentPart>,

    /// TableRow parts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<DocumentPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableRow {
    /// Cells within the row (default `td`, then `th`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_selector: Option<Selector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<DocumentPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Box<DocumentPart>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Box<DocumentPart>>,
}

/// Whole-scope heuristic scan; takes no selector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoDetect {}

impl PartContent {
    pub fn kind(&self) -> PartKind {
        match self {
            Self::Text(_) => PartKind::Text,
            Self::Link(_) => PartKind::Link,
            Self::File(_) => PartKind::File,
            Self::Table(_) => PartKind::Table,
            Self::TableRow(_) => PartKind::TableRow,
            Self::Article(_) => PartKind::Article,
            Self::AutoDetect(_) => PartKind::AutoDetect,
        }
    }
}

/// Typed access to one variant's payload
pub trait PartVariant: Sized {
    const KIND: PartKind;

    fn from_content(content: &PartContent) -> Option<&Self>;

    fn from_content_mut(content: &mut PartContent) -> Option<&mut Self>;
}

macro_rules! part_variant {
    ($ty:ident) => {
        impl PartVariant for $ty {
            const KIND: PartKind = PartKind::$ty;

            fn from_content(content: &PartContent) -> Option<&Self> {
                match content {
                    PartContent::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_content_mut(content: &mut PartContent) -> Option<&mut Self> {
                match content {
                    PartContent::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for PartContent {
            fn from(inner: $ty) -> Self {
                PartContent::$ty(inner)
            }
        }
    };
}

part_variant!(Text);
part_variant!(Link);
part_variant!(File);
part_variant!(Table);
part_variant!(TableRow);
part_variant!(Article);
part_variant!(AutoDetect);

impl DocumentPart {
    /// Creates a part with no selector, name or children
    pub fn new(content: impl Into<PartContent>) -> Self {
        Self {
            name: None,
            base_uri: None,
            selector: None,
            required: false,
            sub_parts: Vec::new(),
            content: content.into(),
        }
    }

    pub fn text(selector: Selector) -> Self {
        Self::new(Text::default()).with_selector(selector)
    }

    pub fn link(selector: Selector) -> Self {
        Self::new(Link::default()).with_selector(selector)
    }

    pub fn file(selector: Selector) -> Self {
        Self::new(File::default()).with_selector(selector)
    }

    pub fn table(selector: Selector) -> Self {
        Self::new(Table::default()).with_selector(selector)
    }

    pub fn article(
        selector: Selector,
        title: Option<DocumentPart>,
        content: Option<DocumentPart>,
    ) -> Self {
        Self::new(Article {
            title: title.map(Box::new),
            content: content.map(Box::new),
        })
        .with_selector(selector)
    }

    pub fn auto_detect() -> Self {
        Self::new(AutoDetect::default())
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_sub_parts(mut self, sub_parts: Vec<DocumentPart>) -> Self {
        self.sub_parts = sub_parts;
        self
    }

    pub fn kind(&self) -> PartKind {
        self.content.kind()
    }

    /// Typed view of this part's payload, if it is a `V`
    pub fn get<V: PartVariant>(&self) -> Option<&V> {
        V::from_content(&self.content)
    }

    pub fn get_mut<V: PartVariant>(&mut self) -> Option<&mut V> {
        V::from_content_mut(&mut self.content)
    }

    /// Label for logs and anomaly records
    pub fn label(&self) -> String {
        match (&self.name, &self.selector) {
            (Some(name), _) => name.clone(),
            (None, Some(selector)) => format!("{}({})", self.kind(), selector),
            (None, None) => self.kind().to_string(),
        }
    }
}
