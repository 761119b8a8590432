//! Selectors locating document parts inside an HTML scope
//!
//! A selector is either a CSS selector handed straight to `scraper`, or a
//! small XPath subset (location paths made of child and descendant steps)
//! that is evaluated step by step with one compiled CSS test per step.

use crate::ConfigError;
use scraper::ElementRef;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A compiled match rule, serialized as its source expression
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector {
    expression: String,
    query: Query,
}

#[derive(Clone)]
enum Query {
    Css(scraper::Selector),
    Path { origin: Origin, steps: Vec<Step> },
}

/// Where a location path starts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    /// `/x`: the document node, whatever the scope
    Document,
    /// `//x`: the scope, or the document node when the scope is the root element
    Scope,
    /// `./x` and `.//x`: always the scope
    Context,
}

#[derive(Clone)]
struct Step {
    axis: Axis,
    test: scraper::Selector,
    position: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

impl Selector {
    /// Compiles a selector expression
    ///
    /// Expressions starting with `/`, `./`, `.//` (or exactly `.`) are read as
    /// XPath location paths; anything else is CSS.
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_harvest::document::Selector;
    ///
    /// assert!(Selector::parse("//div[@class='content']/p[2]").is_ok());
    /// assert!(Selector::parse("article > h1").is_ok());
    /// assert!(Selector::parse("//div[position()>2]").is_err());
    /// ```
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(invalid(expression, "empty expression"));
        }

        let query = if is_path_expression(trimmed) {
            parse_path(trimmed).map_err(|reason| invalid(expression, &reason))?
        } else {
            Query::Css(compile_css(trimmed).map_err(|reason| invalid(expression, &reason))?)
        };

        Ok(Self {
            expression: trimmed.to_string(),
            query,
        })
    }

    /// The source expression
    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// Returns every element matched within `scope`, in document order
    ///
    /// Relative paths (and paths starting with `//`) are evaluated against
    /// `scope`; paths starting with a single `/` start at the document node.
    /// A `//` path evaluated against the root element starts at the document
    /// node as well, so `//html` finds the root element itself.
    pub fn select<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match &self.query {
            Query::Css(selector) => scope.select(selector).collect(),
            Query::Path { origin, steps } => select_path(scope, *origin, steps),
        }
    }

    /// Returns the first element matched within `scope`
    pub fn select_first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        match &self.query {
            Query::Css(selector) => scope.select(selector).next(),
            Query::Path { .. } => self.select(scope).into_iter().next(),
        }
    }
}

fn invalid(expression: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidSelector {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

fn is_path_expression(expression: &str) -> bool {
    expression.starts_with('/') || expression.starts_with("./") || expression == "."
}

fn compile_css(css: &str) -> Result<scraper::Selector, String> {
    scraper::Selector::parse(css).map_err(|e| format!("{:?}", e))
}

fn parse_path(expression: &str) -> Result<Query, String> {
    // "./x" and ".//x" are relative; "//x" is read relative to the scope too
    let (origin, rest) = if let Some(rest) = expression.strip_prefix('.') {
        (Origin::Context, rest)
    } else if expression.starts_with("//") {
        (Origin::Scope, expression)
    } else {
        (Origin::Document, expression)
    };

    let mut steps = Vec::new();
    let mut remaining = rest;

    while !remaining.is_empty() {
        let axis = if let Some(after) = remaining.strip_prefix("//") {
            remaining = after;
            Axis::Descendant
        } else if let Some(after) = remaining.strip_prefix('/') {
            remaining = after;
            Axis::Child
        } else {
            return Err(format!("expected '/' before '{}'", remaining));
        };

        let end = step_end(remaining)?;
        let (raw_step, after) = remaining.split_at(end);
        remaining = after;

        if raw_step.is_empty() {
            return Err("empty location step".to_string());
        }

        // text nodes are always captured from the matched element
        if raw_step == "text()" || raw_step == "." {
            if !remaining.is_empty() {
                return Err(format!("'{}' must be the last step", raw_step));
            }
            break;
        }

        steps.push(parse_step(axis, raw_step)?);
    }

    Ok(Query::Path { origin, steps })
}

/// Finds where the current step ends, skipping over predicates and quotes
fn step_end(input: &str) -> Result<usize, String> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (index, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced ']'".to_string())?;
            }
            (None, '/') if depth == 0 => return Ok(index),
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return Err("unterminated predicate".to_string());
    }
    Ok(input.len())
}

fn parse_step(axis: Axis, raw: &str) -> Result<Step, String> {
    let name_end = raw.find('[').unwrap_or(raw.len());
    let name = &raw[..name_end];

    if name.is_empty()
        || !(name == "*"
            || name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
    {
        return Err(format!("unsupported node test '{}'", name));
    }

    let mut css = name.to_ascii_lowercase();
    let mut position = None;
    let mut predicates = &raw[name_end..];

    while !predicates.is_empty() {
        let close = predicate_end(predicates)?;
        let predicate = predicates[1..close].trim();
        predicates = &predicates[close + 1..];

        if let Ok(n) = predicate.parse::<usize>() {
            if n == 0 {
                return Err("positions start at 1".to_string());
            }
            position = Some(n);
        } else {
            css.push_str(&predicate_to_css(predicate)?);
        }
    }

    Ok(Step {
        axis,
        test: compile_css(&css)?,
        position,
    })
}

fn predicate_end(input: &str) -> Result<usize, String> {
    if !input.starts_with('[') {
        return Err(format!("expected '[' at '{}'", input));
    }

    let mut quote: Option<char> = None;
    for (index, c) in input.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, ']') => return Ok(index),
            _ => {}
        }
    }
    Err("unterminated predicate".to_string())
}

fn predicate_to_css(predicate: &str) -> Result<String, String> {
    if let Some(args) = predicate
        .strip_prefix("contains(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let (attribute, value) = args
            .split_once(',')
            .ok_or_else(|| format!("malformed contains() in '{}'", predicate))?;
        let attribute = attribute_name(attribute.trim())?;
        let value = quoted_value(value.trim())?;
        return Ok(format!("[{}*=\"{}\"]", attribute, escape_css(&value)));
    }

    if let Some((attribute, value)) = predicate.split_once('=') {
        let attribute = attribute_name(attribute.trim())?;
        let value = quoted_value(value.trim())?;
        return Ok(format!("[{}=\"{}\"]", attribute, escape_css(&value)));
    }

    let attribute = attribute_name(predicate)?;
    Ok(format!("[{}]", attribute))
}

fn attribute_name(input: &str) -> Result<&str, String> {
    let name = input
        .strip_prefix('@')
        .ok_or_else(|| format!("unsupported predicate '{}'", input))?;

    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
    {
        return Err(format!("invalid attribute name '{}'", name));
    }
    Ok(name)
}

fn quoted_value(input: &str) -> Result<String, String> {
    let unquoted = input
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| input.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .ok_or_else(|| format!("expected a quoted value, got '{}'", input))?;
    Ok(unquoted.to_string())
}

fn escape_css(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn select_path<'a>(scope: ElementRef<'a>, origin: Origin, steps: &[Step]) -> Vec<ElementRef<'a>> {
    let mut steps = steps.iter();

    let is_root = scope.parent().map_or(true, |parent| parent.value().is_document());
    let from_document = match origin {
        Origin::Document => true,
        Origin::Scope => is_root,
        Origin::Context => false,
    };

    let mut contexts = if from_document {
        // The document node's only element child is the root element
        let root = scope
            .ancestors()
            .filter_map(ElementRef::wrap)
            .last()
            .unwrap_or(scope);

        match steps.next() {
            None => return vec![root],
            Some(first) => {
                let candidates: Vec<ElementRef<'a>> = match first.axis {
                    Axis::Child => vec![root],
                    Axis::Descendant => root.descendants().filter_map(ElementRef::wrap).collect(),
                };
                apply_test(first, candidates)
            }
        }
    } else {
        vec![scope]
    };

    for step in steps {
        let mut seen = HashSet::new();
        let mut next = Vec::new();

        for context in &contexts {
            let candidates: Vec<ElementRef<'a>> = match step.axis {
                Axis::Child => context.children().filter_map(ElementRef::wrap).collect(),
                Axis::Descendant => context
                    .descendants()
                    .skip(1)
                    .filter_map(ElementRef::wrap)
                    .collect(),
            };

            for element in apply_test(step, candidates) {
                if seen.insert(element.id()) {
                    next.push(element);
                }
            }
        }

        contexts = next;
        if contexts.is_empty() {
            break;
        }
    }

    contexts
}

/// Keeps the candidates passing the step's test and, for `[n]`, only those
/// that are the n-th passing child of their own parent
fn apply_test<'a>(step: &Step, candidates: Vec<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
    candidates
        .into_iter()
        .filter(|element| step.test.matches(element))
        .filter(|element| match step.position {
            Some(n) => sibling_position(step, *element) == Some(n),
            None => true,
        })
        .collect()
}

fn sibling_position(step: &Step, element: ElementRef<'_>) -> Option<usize> {
    let parent = element.parent()?;
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|sibling| step.test.matches(sibling))
        .position(|sibling| sibling.id() == element.id())
        .map(|index| index + 1)
}

impl FromStr for Selector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Selector {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.expression
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.expression).finish()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}
