//! Recursive matching of a definition tree against parsed HTML
//!
//! The engine never fails: non-matching optional parts are simply absent
//! from the result, and discrepancies worth knowing about are recorded as
//! anomalies. Deciding whether an absent root is fatal is up to the caller.

use crate::document::{
    Article, DocumentPart, File, Link, PartContent, Selector, Table, TableRow, Text,
};
use crate::extract::anomaly::{Anomaly, AnomalyKind};
use crate::extract::autodetect;
use crate::url::resolve_link_url;
use scraper::{ElementRef, Html};
use url::Url;

/// The outcome of applying a definition tree to a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// The populated result tree, or `None` when the root did not match
    pub result: Option<DocumentPart>,

    /// Every anomaly recorded during the traversal, in traversal order
    pub anomalies: Vec<Anomaly>,
}

impl Extraction {
    /// Number of recorded anomalies of the given kind
    pub fn count(&self, kind: AnomalyKind) -> usize {
        self.anomalies.iter().filter(|a| a.kind == kind).count()
    }
}

/// Applies a definition tree to a parsed document
///
/// # Arguments
///
/// * `definition` - The root of the definition tree
/// * `document` - The parsed page
/// * `base_uri` - The page URI, used to resolve relative links unless a
///   definition carries its own `base_uri`
///
/// # Returns
///
/// A fresh result tree (the definition is never mutated) plus the anomalies
/// recorded along the way. The root result carries the effective base URI.
///
/// # Example
///
/// ```
/// use sumi_harvest::document::{DocumentPart, Selector, Text};
/// use sumi_harvest::extract::{parse, parse_html};
/// use url::Url;
///
/// let definition = DocumentPart::text(Selector::parse("//h1").unwrap());
/// let document = parse_html("<html><h1>Title Text</h1></html>");
/// let base = Url::parse("https://example.com/").unwrap();
///
/// let extraction = parse(&definition, &document, &base);
/// let result = extraction.result.as_ref().unwrap();
/// assert_eq!(result.get::<Text>().unwrap().text, "Title Text");
/// assert!(extraction.anomalies.is_empty());
/// ```
pub fn parse(definition: &DocumentPart, document: &Html, base_uri: &Url) -> Extraction {
    let mut extractor = Extractor::default();
    let base = definition.base_uri.as_ref().unwrap_or(base_uri);

    let mut result = extractor
        .parse_part(definition, document.root_element(), base, true)
        .into_iter()
        .next();

    if let Some(root) = result.as_mut() {
        root.base_uri.get_or_insert_with(|| base.clone());
    }

    Extraction {
        result,
        anomalies: extractor.anomalies,
    }
}

/// Parses page source into a document
///
/// html5ever recovers from malformed markup, so this never fails.
pub fn parse_html(source: &str) -> Html {
    Html::parse_document(source)
}

#[derive(Default)]
pub(super) struct Extractor {
    anomalies: Vec<Anomaly>,
}

impl Extractor {
    /// Matches one definition within `scope`
    ///
    /// Link definitions yield one result per matched element (only the
    /// first when `root` is set); every other variant yields at most one.
    pub(super) fn parse_part(
        &mut self,
        definition: &DocumentPart,
        scope: ElementRef<'_>,
        base: &Url,
        root: bool,
    ) -> Vec<DocumentPart> {
        let base = definition.base_uri.as_ref().unwrap_or(base);
        let matches = match &definition.selector {
            Some(selector) => selector.select(scope),
            None => vec![scope],
        };

        let Some(first) = matches.first().copied() else {
            if definition.required {
                self.record(AnomalyKind::MissingRequired, definition, "selector matched nothing");
            }
            return Vec::new();
        };

        let results = match &definition.content {
            PartContent::Link(_) => {
                let limit = if root { 1 } else { usize::MAX };
                matches
                    .into_iter()
                    .filter_map(|element| self.link(definition, element, base))
                    .take(limit)
                    .collect()
            }
            PartContent::File(_) => self.file(definition, &matches, base).into_iter().collect(),
            PartContent::Text(_) => vec![self.text(definition, first, base)],
            PartContent::Table(table) => vec![self.table(definition, table, first, base)],
            PartContent::TableRow(row) => vec![self.table_row(definition, row, first, base)],
            PartContent::Article(article) => {
                vec![self.article(definition, article, first, base)]
            }
            PartContent::AutoDetect(_) => vec![autodetect::detect(self, definition, first, base)],
        };

        if results.is_empty() && definition.required {
            self.record(
                AnomalyKind::MissingRequired,
                definition,
                "matched elements carried no usable link",
            );
        }

        results
    }

    pub(super) fn record(&mut self, kind: AnomalyKind, definition: &DocumentPart, detail: &str) {
        let anomaly = Anomaly::new(kind, definition.label(), detail);
        tracing::debug!("Extraction anomaly: {}", anomaly);
        self.anomalies.push(anomaly);
    }

    /// Builds a result part for `definition`, parsing its sub-parts against
    /// the matched element
    pub(super) fn finish(
        &mut self,
        definition: &DocumentPart,
        content: PartContent,
        element: ElementRef<'_>,
        base: &Url,
    ) -> DocumentPart {
        let mut sub_parts = Vec::new();
        for sub_definition in &definition.sub_parts {
            sub_parts.extend(self.parse_part(sub_definition, element, base, false));
        }

        DocumentPart {
            name: definition.name.clone(),
            base_uri: definition.base_uri.clone(),
            selector: definition.selector.clone(),
            required: definition.required,
            sub_parts,
            content,
        }
    }

    fn text(&mut self, definition: &DocumentPart, element: ElementRef<'_>, base: &Url) -> DocumentPart {
        let text = Text {
            text: element_text(element),
        };
        self.finish(definition, text.into(), element, base)
    }

    fn link(
        &mut self,
        definition: &DocumentPart,
        element: ElementRef<'_>,
        base: &Url,
    ) -> Option<DocumentPart> {
        let link = link_from_element(element, base)?;
        Some(self.finish(definition, link.into(), element, base))
    }

    /// Aggregates every resource link in all matched elements into one File
    fn file(
        &mut self,
        definition: &DocumentPart,
        matches: &[ElementRef<'_>],
        base: &Url,
    ) -> Option<DocumentPart> {
        let mut download_links = Vec::new();

        for element in matches {
            if has_target(*element) {
                download_links.extend(link_from_element(*element, base).map(DocumentPart::new));
            } else if let Some(anchors) = css("a[href]") {
                download_links.extend(
                    element
                        .select(&anchors)
                        .filter_map(|anchor| link_from_element(anchor, base))
                        .map(DocumentPart::new),
                );
            }
        }

        if download_links.is_empty() {
            return None;
        }

        let file = File {
            download_links,
            file_data_list: Vec::new(),
        };
        let first = matches.first().copied()?;
        Some(self.finish(definition, file.into(), first, base))
    }

    pub(super) fn table(
        &mut self,
        definition: &DocumentPart,
        table: &Table,
        element: ElementRef<'_>,
        base: &Url,
    ) -> DocumentPart {
        let own_rows = table_rows(element);
        let header_row = header_row(&own_rows);

        let header_cells = match (table.header_selector.as_ref(), header_row) {
            (Some(selector), _) => selector.select(element),
            (None, Some(row)) => row_cells(row),
            (None, None) => Vec::new(),
        };
        let headers: Vec<DocumentPart> = header_cells
            .into_iter()
            .map(|cell| {
                DocumentPart::new(Text {
                    text: element_text(cell),
                })
            })
            .collect();

        let body_rows = match table.row_selector.as_ref() {
            Some(selector) => selector.select(element),
            None => own_rows,
        };

        let mut rows = Vec::new();
        for row in body_rows {
            if header_row.is_some_and(|header| header.id() == row.id()) {
                continue;
            }
            let cells = match table.cell_selector.as_ref() {
                Some(selector) => selector.select(row),
                None => row_cells(row),
            };
            if cells.is_empty() {
                continue;
            }

            if !headers.is_empty() && cells.len() != headers.len() {
                let detail = format!(
                    "row {} has {} cells, header has {}",
                    rows.len() + 1,
                    cells.len(),
                    headers.len()
                );
                self.record(AnomalyKind::TableShapeMismatch, definition, &detail);
            }

            let columns = self.columns(&table.columns, &cells, base);
            rows.push(DocumentPart::new(TableRow {
                cell_selector: None,
                columns,
            }));
        }

        let content = Table {
            header_selector: table.header_selector.clone(),
            row_selector: table.row_selector.clone(),
            cell_selector: table.cell_selector.clone(),
            columns: Vec::new(),
            headers,
            rows,
        };
        self.finish(definition, content.into(), element, base)
    }

    fn table_row(
        &mut self,
        definition: &DocumentPart,
        row: &TableRow,
        element: ElementRef<'_>,
        base: &Url,
    ) -> DocumentPart {
        let cells = select_or(row.cell_selector.as_ref(), "td, th", element);
        let content = TableRow {
            cell_selector: row.cell_selector.clone(),
            columns: self.columns(&row.columns, &cells, base),
        };
        self.finish(definition, content.into(), element, base)
    }

    /// One column per cell, by position
    ///
    /// A cell without a column definition, or whose definition does not
    /// match, becomes a Text part so positions are preserved.
    fn columns(
        &mut self,
        definitions: &[DocumentPart],
        cells: &[ElementRef<'_>],
        base: &Url,
    ) -> Vec<DocumentPart> {
        let mut columns = Vec::with_capacity(cells.len());
        for (index, cell) in cells.iter().enumerate() {
            let parsed = definitions
                .get(index)
                .and_then(|def| self.parse_part(def, *cell, base, false).into_iter().next());

            columns.push(parsed.unwrap_or_else(|| {
                DocumentPart::new(Text {
                    text: element_text(*cell),
                })
            }));
        }
        columns
    }

    fn article(
        &mut self,
        definition: &DocumentPart,
        article: &Article,
        element: ElementRef<'_>,
        base: &Url,
    ) -> DocumentPart {
        let title = article.title.as_deref().and_then(|title_definition| {
            let title = self.parse_part(title_definition, element, base, false).into_iter().next();
            if title.is_none() {
                self.record(AnomalyKind::MissingTitle, definition, "article title not found");
            }
            title
        });

        let content = article.content.as_deref().and_then(|content_definition| {
            let content = self
                .parse_part(content_definition, element, base, false)
                .into_iter()
                .next();
            if content.is_none() {
                self.record(AnomalyKind::MissingContent, definition, "article content not found");
            }
            content
        });

        let content = Article {
            title: title.map(Box::new),
            content: content.map(Box::new),
        };
        self.finish(definition, content.into(), element, base)
    }
}

/// The rows belonging to `table` itself, not to tables nested in its cells
fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|row| row.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

/// The first row of `thead`, else the first row made only of `th` cells
fn header_row<'a>(rows: &[ElementRef<'a>]) -> Option<ElementRef<'a>> {
    let in_head = rows.iter().find(|row| {
        row.parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|parent| parent.value().name() == "thead")
    });

    in_head.copied().or_else(|| {
        rows.iter().copied().find(|row| {
            let cells = row_cells(*row);
            !cells.is_empty() && cells.iter().all(|cell| cell.value().name() == "th")
        })
    })
}

/// The `td` and `th` cells directly inside a row
fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .collect()
}

/// Compiles a built-in CSS selector
pub(super) fn css(selector: &str) -> Option<scraper::Selector> {
    scraper::Selector::parse(selector).ok()
}

fn select_or<'a>(
    custom: Option<&Selector>,
    default_css: &str,
    scope: ElementRef<'a>,
) -> Vec<ElementRef<'a>> {
    match custom {
        Some(selector) => selector.select(scope),
        None => css(default_css)
            .map(|selector| scope.select(&selector).collect())
            .unwrap_or_default(),
    }
}

/// Trimmed text content of an element
pub(super) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn has_target(element: ElementRef<'_>) -> bool {
    let value = element.value();
    value.attr("href").is_some() || value.attr("src").is_some()
}

/// Resolves the link carried by `element`, or by its first anchor
pub(super) fn link_from_element(element: ElementRef<'_>, base: &Url) -> Option<Link> {
    let target = if has_target(element) {
        element
    } else {
        let anchors = css("a[href]")?;
        element.select(&anchors).next()?
    };

    let value = target.value();
    let href = value.attr("href").or_else(|| value.attr("src"))?;
    let uri = resolve_link_url(href, base)?;

    Some(Link {
        uri: Some(uri),
        text: element_text(target),
    })
}
