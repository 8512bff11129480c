//! Minimal CSS selector matcher for [`MemoryDom`](super::MemoryDom).
//!
//! The grammar (`selector.pest`) covers type, `#id`, `.class`, attribute
//! tests (`[a]`, `=`, `~=`, `*=`, `^=`, `$=`, optional `i` flag), `:not(..)`,
//! descendant and child combinators and comma lists. That covers every
//! selector the engine's heuristics use; live pages go through the browser's
//! own `querySelectorAll`.

use super::NodeId;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "dom/selector.pest"]
pub struct SelectorParser;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("invalid selector: {0}")]
    Syntax(Box<pest::error::Error<Rule>>),
    #[error("unsupported pseudo-class in `{0}`")]
    Pseudo(String),
}

impl From<pest::error::Error<Rule>> for SelectorError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        SelectorError::Syntax(Box::new(e))
    }
}

/// Read access a selector needs from a document tree.
pub trait ElementView {
    fn tag_of(&self, node: NodeId) -> Option<&str>;
    fn attr_of(&self, node: NodeId, name: &str) -> Option<&str>;
    fn parent_of(&self, node: NodeId) -> Option<NodeId>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Word,
    Contains,
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    op: AttrOp,
    value: String,
    ignore_case: bool,
}

impl AttrTest {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        if self.op == AttrOp::Exists {
            return true;
        }
        let (actual, expected) = if self.ignore_case {
            (actual.to_lowercase(), self.value.to_lowercase())
        } else {
            (actual.to_string(), self.value.clone())
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Word => actual.split_whitespace().any(|w| w == expected),
            AttrOp::Contains => !expected.is_empty() && actual.contains(&expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
    /// `:not(..)` arguments; none may match.
    negated: Vec<Compound>,
}

impl Compound {
    fn matches<V: ElementView + ?Sized>(&self, view: &V, node: NodeId) -> bool {
        let Some(tag) = view.tag_of(node) else {
            return false;
        };
        if let Some(expected) = &self.tag {
            if expected != "*" && !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if self
            .ids
            .iter()
            .any(|id| view.attr_of(node, "id") != Some(id.as_str()))
        {
            return false;
        }
        if !self.classes.is_empty() {
            let class_attr = view.attr_of(node, "class").unwrap_or_default();
            if !self
                .classes
                .iter()
                .all(|c| class_attr.split_whitespace().any(|w| w == c))
            {
                return false;
            }
        }
        self.attrs
            .iter()
            .all(|test| test.matches(view.attr_of(node, &test.name)))
            && !self.negated.iter().any(|n| n.matches(view, node))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One comma-separated branch: compounds joined by combinators, left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<(Combinator, Compound)>,
}

impl Complex {
    fn matches<V: ElementView + ?Sized>(&self, view: &V, node: NodeId) -> bool {
        self.matches_at(view, self.parts.len() - 1, node)
    }

    fn matches_at<V: ElementView + ?Sized>(&self, view: &V, idx: usize, node: NodeId) -> bool {
        let (combinator, compound) = &self.parts[idx];
        if !compound.matches(view, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => view
                .parent_of(node)
                .is_some_and(|p| self.matches_at(view, idx - 1, p)),
            Combinator::Descendant => {
                let mut current = view.parent_of(node);
                while let Some(ancestor) = current {
                    if self.matches_at(view, idx - 1, ancestor) {
                        return true;
                    }
                    current = view.parent_of(ancestor);
                }
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    branches: Vec<Complex>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        if input.trim().is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut pairs = SelectorParser::parse(Rule::selector_list, input)?;
        let branches = pairs
            .next()
            .into_iter()
            .flat_map(|list| list.into_inner())
            .filter(|pair| pair.as_rule() == Rule::complex)
            .map(|pair| build_complex(pair, input))
            .collect::<Result<Vec<_>, _>>()?;
        if branches.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { branches })
    }

    pub fn matches<V: ElementView + ?Sized>(&self, view: &V, node: NodeId) -> bool {
        self.branches.iter().any(|b| b.matches(view, node))
    }
}

fn build_complex(pair: Pair<Rule>, full: &str) -> Result<Complex, SelectorError> {
    let mut parts = Vec::new();
    let mut pending = Combinator::Descendant;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::compound => parts.push((pending, build_compound(inner, full)?)),
            Rule::child => pending = Combinator::Child,
            Rule::descendant => pending = Combinator::Descendant,
            _ => {}
        }
    }
    if parts.is_empty() {
        return Err(SelectorError::Empty);
    }
    Ok(Complex { parts })
}

fn inner_text(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|ident| ident.as_str().to_string())
        .unwrap_or_default()
}

fn build_compound(pair: Pair<Rule>, full: &str) -> Result<Compound, SelectorError> {
    let mut compound = Compound::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::universal => compound.tag = Some("*".to_string()),
            Rule::tag => compound.tag = Some(inner.as_str().to_lowercase()),
            Rule::id => compound.ids.push(inner_text(inner)),
            Rule::class => compound.classes.push(inner_text(inner)),
            Rule::attr => compound.attrs.push(build_attr(inner)),
            Rule::pseudo => {
                let mut parts = inner.into_inner();
                let name = parts.next().map(|p| p.as_str()).unwrap_or_default();
                match parts.next() {
                    Some(arg) if name.eq_ignore_ascii_case("not") => {
                        compound.negated.push(build_compound(arg, full)?)
                    }
                    _ => return Err(SelectorError::Pseudo(full.to_string())),
                }
            }
            _ => {}
        }
    }
    Ok(compound)
}

fn build_attr(pair: Pair<Rule>) -> AttrTest {
    let mut test = AttrTest {
        name: String::new(),
        op: AttrOp::Exists,
        value: String::new(),
        ignore_case: false,
    };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::attr_name => test.name = inner.as_str().to_lowercase(),
            Rule::attr_op => {
                test.op = match inner.as_str() {
                    "~=" => AttrOp::Word,
                    "*=" => AttrOp::Contains,
                    "^=" => AttrOp::Prefix,
                    "$=" => AttrOp::Suffix,
                    _ => AttrOp::Equals,
                }
            }
            Rule::quoted => test.value = inner_text(inner),
            Rule::bare_value => test.value = inner.as_str().to_string(),
            Rule::case_flag => test.ignore_case = true,
            _ => {}
        }
    }
    test
}
