//! Structure inference for pages without an explicit definition
//!
//! The densest text block becomes the single Article; every table and every
//! anchor in scope is reported alongside it.

use crate::document::{Article, AutoDetect, DocumentPart, File, Link, Table, Text};
use crate::extract::anomaly::AnomalyKind;
use crate::extract::engine::{css, element_text, Extractor};
use crate::url::resolve_link_url;
use scraper::node::Node;
use scraper::ElementRef;
use url::Url;

/// Elements that may hold the main content
const CANDIDATE_BLOCKS: &str = "article, main, section, div, td, body";

/// Children whose text counts toward a block's density
const PARAGRAPH_LIKE: &[&str] = &[
    "p", "span", "em", "strong", "b", "i", "blockquote", "pre", "h1", "h2", "h3", "h4", "h5",
    "h6", "li",
];

/// Link targets treated as downloadable resources
const FILE_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "csv", "zip", "gz", "tar", "7z", "rar",
    "odt", "ods", "rtf", "xml", "json", "mp3", "mp4",
];

/// Scans `scope` and builds the synthetic AutoDetect result
///
/// Children, in order: exactly one Article, every table, then every
/// File/Link discovered in document order, followed by any explicit
/// sub-parts of the definition.
pub(super) fn detect(
    extractor: &mut Extractor,
    definition: &DocumentPart,
    scope: ElementRef<'_>,
    base: &Url,
) -> DocumentPart {
    let mut children = vec![article(extractor, definition, scope)];

    if let Some(tables) = css("table") {
        let table_definition = DocumentPart::new(Table::default()).named("auto-detect table");
        for table in scope.select(&tables) {
            children.push(extractor.table(&table_definition, &Table::default(), table, base));
        }
    }

    children.extend(discovered_links(scope, base));

    for sub_definition in &definition.sub_parts {
        children.extend(extractor.parse_part(sub_definition, scope, base, false));
    }

    tracing::debug!("Auto-detect produced {} top-level parts", children.len());

    DocumentPart {
        name: definition.name.clone(),
        base_uri: definition.base_uri.clone(),
        selector: definition.selector.clone(),
        required: definition.required,
        sub_parts: children,
        content: AutoDetect::default().into(),
    }
}

fn article(extractor: &mut Extractor, definition: &DocumentPart, scope: ElementRef<'_>) -> DocumentPart {
    let title = page_title(scope).map(|text| Box::new(DocumentPart::new(Text { text })));
    if title.is_none() {
        extractor.record(AnomalyKind::MissingTitle, definition, "no h1 or title element");
    }

    let body = collapsed_text(densest_block(scope));
    let content = if body.is_empty() {
        extractor.record(AnomalyKind::MissingContent, definition, "no text block found");
        None
    } else {
        Some(Box::new(DocumentPart::new(Text { text: body })))
    };

    DocumentPart::new(Article { title, content })
}

fn page_title(scope: ElementRef<'_>) -> Option<String> {
    ["h1", "title"].iter().find_map(|name| {
        let selector = css(name)?;
        scope
            .select(&selector)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty())
    })
}

/// The candidate block with the highest score, first in document order on
/// ties, falling back to `body` (or the scope) when nothing scores
fn densest_block<'a>(scope: ElementRef<'a>) -> ElementRef<'a> {
    let mut best: Option<(usize, ElementRef<'a>)> = None;

    if let Some(candidates) = css(CANDIDATE_BLOCKS) {
        for block in scope.select(&candidates) {
            let score = block_score(block);
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, block));
            }
        }
    }

    match best {
        Some((score, block)) if score > 0 => block,
        _ => css("body")
            .and_then(|body| scope.select(&body).next())
            .unwrap_or(scope),
    }
}

fn block_score(block: ElementRef<'_>) -> usize {
    let mut score = 0;

    for child in block.children() {
        match child.value() {
            Node::Text(text) => score += text.trim().chars().count(),
            Node::Element(element) if PARAGRAPH_LIKE.contains(&element.name()) => {
                if let Some(child) = ElementRef::wrap(child) {
                    score += text_length(child).saturating_sub(anchor_text_length(child));
                }
            }
            _ => {}
        }
    }

    score
}

fn text_length(element: ElementRef<'_>) -> usize {
    element.text().map(|t| t.trim().chars().count()).sum()
}

fn anchor_text_length(element: ElementRef<'_>) -> usize {
    let Some(anchors) = css("a") else {
        return 0;
    };
    element.select(&anchors).map(text_length).sum()
}

/// Text of every descendant text node, whitespace-collapsed
fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every resolvable `a[href]` in document order, as File or Link parts
fn discovered_links(scope: ElementRef<'_>, base: &Url) -> Vec<DocumentPart> {
    let Some(anchors) = css("a[href]") else {
        return Vec::new();
    };

    scope
        .select(&anchors)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let uri = resolve_link_url(href, base)?;
            let is_file = anchor.value().attr("download").is_some() || has_file_extension(&uri);

            let link = DocumentPart::new(Link {
                uri: Some(uri),
                text: element_text(anchor),
            });

            Some(if is_file {
                DocumentPart::new(File {
                    download_links: vec![link],
                    file_data_list: Vec::new(),
                })
            } else {
                link
            })
        })
        .collect()
}

fn has_file_extension(uri: &Url) -> bool {
    uri.path()
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, extension)| FILE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
