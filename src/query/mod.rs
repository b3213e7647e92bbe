// src/query/mod.rs

//! Document query language.
//!
//! Wraps a parsed HTML document and exposes a chainable query interface:
//!
//! ```text
//! Document::parse(html)
//!     .select("div > span")?
//!     .where_expr("text : %silly% & attr.class : %urban%")?
//!     .first()
//! ```
//!
//! Refinements are functional: each call consumes the result and returns a
//! narrowed one. Boolean sub-predicates inside one `where_expr` call are
//! evaluated against the node set captured when it was invoked, never
//! against a sibling branch's output.

pub mod predicate;

use std::collections::HashMap;
use std::collections::HashSet;

use ego_tree::NodeId;
use log::debug;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::expr::{Compiled, ExprCompiler, Precedence, SyntaxTree};
use predicate::{Field, LeafPredicate, MatchMode};

/// Boolean operator symbols of the `where` expression language.
const SYMBOLS: [&str; 4] = ["&", "|", "(", ")"];

/// A parsed document ready for querying.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parse an HTML string.
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// Run a CSS selector against the document, producing the initial
    /// ordered node set.
    pub fn select(&self, selector: &str) -> Result<QueryResult<'_>> {
        let sel = parse_selector(selector)?;
        let nodes = self
            .html
            .select(&sel)
            .map(|el| NodeHandle { el })
            .collect();
        Ok(QueryResult { nodes })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Form-control content: a single value or a set of option values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Single(String),
    Multi(Vec<String>),
}

impl FormValue {
    /// True when any member matches the mode.
    fn matches(&self, mode: &MatchMode) -> bool {
        match self {
            Self::Single(value) => mode.matches(value),
            Self::Multi(values) => values.iter().any(|v| mode.matches(v)),
        }
    }
}

/// Read-only handle to one node of a parsed document.
#[derive(Debug, Clone, Copy)]
pub struct NodeHandle<'a> {
    el: ElementRef<'a>,
}

impl<'a> NodeHandle<'a> {
    /// Node identity within the document tree.
    pub fn id(&self) -> NodeId {
        self.el.id()
    }

    /// Collected text content.
    pub fn text(&self) -> String {
        self.el.text().collect()
    }

    /// Inner HTML.
    pub fn inner_html(&self) -> String {
        self.el.inner_html()
    }

    /// Attribute lookup.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.el.value().attr(name)
    }

    /// Form-control value: `value` attribute for inputs, text for
    /// textareas, selected option values for selects (falling back to the
    /// first option when none is marked selected).
    pub fn form_value(&self) -> Option<FormValue> {
        match self.el.value().name() {
            "input" => self.attr("value").map(|v| FormValue::Single(v.to_string())),
            "textarea" => Some(FormValue::Single(self.text())),
            "select" => {
                let options: Vec<ElementRef<'a>> = self
                    .el
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| c.value().name() == "option")
                    .collect();
                let option_value = |opt: &ElementRef<'a>| {
                    opt.value()
                        .attr("value")
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| opt.text().collect())
                };
                let selected: Vec<String> = options
                    .iter()
                    .filter(|o| o.value().attr("selected").is_some())
                    .map(option_value)
                    .collect();
                if !selected.is_empty() {
                    Some(FormValue::Multi(selected))
                } else {
                    options.first().map(|o| FormValue::Multi(vec![option_value(o)]))
                }
            }
            _ => None,
        }
    }

    /// Evaluate one parsed predicate against this node.
    fn satisfies(&self, predicate: &LeafPredicate) -> bool {
        match &predicate.field {
            Field::Text => predicate.mode.matches(&self.text()),
            Field::Html => predicate.mode.matches(&self.inner_html()),
            Field::Attr(name) => self
                .attr(name)
                .is_some_and(|value| predicate.mode.matches(value)),
            Field::Value => self
                .form_value()
                .is_some_and(|value| value.matches(&predicate.mode)),
        }
    }
}

/// The ordered node set currently matched by a query chain.
pub struct QueryResult<'a> {
    nodes: Vec<NodeHandle<'a>>,
}

impl<'a> QueryResult<'a> {
    /// Narrow by a single content predicate (`text`, `html` or `value`).
    pub fn filter(self, field: Field, pattern: &str) -> Result<Self> {
        let mode = MatchMode::parse(pattern)?;
        let predicate = LeafPredicate { field, mode };
        Ok(Self {
            nodes: self
                .nodes
                .into_iter()
                .filter(|n| n.satisfies(&predicate))
                .collect(),
        })
    }

    /// Narrow by comparing a named attribute.
    pub fn filter_attr(self, name: &str, pattern: &str) -> Result<Self> {
        self.filter(Field::Attr(name.to_string()), pattern)
    }

    /// Narrow by exactly one leaf predicate string (no boolean operators).
    pub fn eval(self, qstr: &str) -> Result<Self> {
        let predicate = LeafPredicate::parse(qstr)?;
        Ok(Self {
            nodes: self
                .nodes
                .into_iter()
                .filter(|n| n.satisfies(&predicate))
                .collect(),
        })
    }

    /// Narrow by a boolean combination of leaf predicates, e.g.
    /// `text : %silly% & (text : %bit% | attr.class : %urban%)`.
    /// `&` binds tighter than `|`; both associate left.
    pub fn where_expr(self, expression: &str) -> Result<Self> {
        let precedence = HashMap::from([
            ("|".to_string(), Precedence::left(1)),
            ("&".to_string(), Precedence::left(2)),
        ]);
        let compiler = ExprCompiler::new(&SYMBOLS, precedence);
        let tokens = tokenize(expression);
        let Compiled { postfix, tree } = compiler.compile(&tokens)?;
        debug!("where postfix: {postfix}");
        debug!("where tree:\n{tree}");

        let nodes = eval_tree(&tree, &self.nodes)?;
        Ok(Self { nodes })
    }

    /// Number of matched nodes.
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// All matched nodes, in document order.
    pub fn all(&self) -> &[NodeHandle<'a>] {
        &self.nodes
    }

    /// Project every matched node.
    pub fn map<T>(&self, f: impl FnMut(&NodeHandle<'a>) -> T) -> Vec<T> {
        self.nodes.iter().map(f).collect()
    }

    /// Node at a 0-based index.
    pub fn at(&self, index: usize) -> Option<&NodeHandle<'a>> {
        self.nodes.get(index)
    }

    /// Node at a 1-based position; `0` and out-of-bounds yield `None`.
    pub fn nth(&self, num: usize) -> Option<&NodeHandle<'a>> {
        if num == 0 {
            return None;
        }
        self.at(num - 1)
    }

    /// First matched node.
    pub fn first(&self) -> Option<&NodeHandle<'a>> {
        self.nth(1)
    }

    /// Last matched node.
    pub fn last(&self) -> Option<&NodeHandle<'a>> {
        self.nth(self.nodes.len())
    }
}

/// Split a boolean expression on the operator symbols, treating any maximal
/// run of other characters (trimmed) as one leaf token.
fn tokenize(expression: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let flush = |buffer: &mut String, tokens: &mut Vec<String>| {
        let leaf = buffer.trim();
        if !leaf.is_empty() {
            tokens.push(leaf.to_string());
        }
        buffer.clear();
    };

    for c in expression.chars() {
        if matches!(c, '&' | '|' | '(' | ')') {
            flush(&mut buffer, &mut tokens);
            tokens.push(c.to_string());
        } else {
            buffer.push(c);
        }
    }
    flush(&mut buffer, &mut tokens);
    tokens
}

/// Evaluate a compiled predicate tree against the snapshot node set.
///
/// Leaves evaluate their predicate against the snapshot; `&` intersects and
/// `|` unions the child results over node identity, preserving first-seen
/// document order.
fn eval_tree<'a>(tree: &SyntaxTree, snapshot: &[NodeHandle<'a>]) -> Result<Vec<NodeHandle<'a>>> {
    match tree {
        SyntaxTree::Leaf(qstr) => {
            let predicate = LeafPredicate::parse(qstr)?;
            Ok(snapshot
                .iter()
                .filter(|n| n.satisfies(&predicate))
                .copied()
                .collect())
        }
        SyntaxTree::Branch { op, left, right } => {
            let left_eval = eval_tree(left, snapshot)?;
            let right_eval = eval_tree(right, snapshot)?;
            match op.as_str() {
                "&" => Ok(intersect(left_eval, right_eval)),
                "|" => Ok(union(left_eval, right_eval)),
                other => Err(AppError::syntax(format!(
                    "symbol \"{other}\" is not an operator"
                ))),
            }
        }
    }
}

fn intersect<'a>(a: Vec<NodeHandle<'a>>, b: Vec<NodeHandle<'a>>) -> Vec<NodeHandle<'a>> {
    let b_ids: HashSet<NodeId> = b.iter().map(|n| n.id()).collect();
    a.into_iter().filter(|n| b_ids.contains(&n.id())).collect()
}

fn union<'a>(a: Vec<NodeHandle<'a>>, b: Vec<NodeHandle<'a>>) -> Vec<NodeHandle<'a>> {
    let mut seen: HashSet<NodeId> = a.iter().map(|n| n.id()).collect();
    let mut result = a;
    for node in b {
        if seen.insert(node.id()) {
            result.push(node);
        }
    }
    result
}
