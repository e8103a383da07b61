//! CSS-like locators over the document tree.
//!
//! Supports the subset host profiles need: type selectors, `#id`, `.class`,
//! `[attr]`, `[attr="value"]`, compounds of those, and the descendant
//! (whitespace) and child (`>`) combinators.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use super::{Document, NodeId};
use crate::error::{HatewatchError, Result};

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(
            r#"^(?:(?P<tag>[A-Za-z][\w-]*|\*)|#(?P<id>[\w-]+)|\.(?P<class>[\w-]+)|\[\s*(?P<attr>[\w-]+)\s*(?:=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[\w-]+))\s*)?\])"#,
        )
        .expect("selector token pattern is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeCondition {
    Exists(String),
    Equals(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeCondition>,
}

impl Compound {
    fn parse(source: &str, text: &str) -> Result<Self> {
        let mut compound = Compound::default();
        let mut rest = text;
        let mut first = true;

        while !rest.is_empty() {
            let caps = token_regex()
                .captures(rest)
                .ok_or_else(|| HatewatchError::selector(source, format!("unexpected input at '{}'", rest)))?;

            if let Some(tag) = caps.name("tag") {
                if !first {
                    return Err(HatewatchError::selector(source, "type selector must come first"));
                }
                if tag.as_str() != "*" {
                    compound.tag = Some(tag.as_str().to_ascii_lowercase());
                }
            } else if let Some(id) = caps.name("id") {
                compound.id = Some(id.as_str().to_string());
            } else if let Some(class) = caps.name("class") {
                compound.classes.push(class.as_str().to_string());
            } else if let Some(attr) = caps.name("attr") {
                let name = attr.as_str().to_string();
                let value = caps
                    .name("dq")
                    .or_else(|| caps.name("sq"))
                    .or_else(|| caps.name("bare"));
                compound.attributes.push(match value {
                    Some(v) => AttributeCondition::Equals(name, v.as_str().to_string()),
                    None => AttributeCondition::Exists(name),
                });
            }

            let consumed = caps.get(0).map(|m| m.end()).unwrap_or(0);
            if consumed == 0 {
                return Err(HatewatchError::selector(source, "empty token"));
            }
            rest = &rest[consumed..];
            first = false;
        }

        Ok(compound)
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        if let Some(expected) = &self.tag {
            if !tag.eq_ignore_ascii_case(expected) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if doc.attribute(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| doc.has_class(node, c)) {
            return false;
        }
        self.attributes.iter().all(|cond| match cond {
            AttributeCondition::Exists(name) => doc.has_attribute(node, name),
            AttributeCondition::Equals(name, value) => {
                doc.attribute(node, name) == Some(value.as_str())
            }
        })
    }
}

/// A parsed locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    // The combinator of the first part is never consulted.
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(HatewatchError::selector(source, "empty selector"));
        }

        let mut parts = Vec::new();
        let mut pending = Combinator::Descendant;
        let mut current = String::new();
        let mut in_brackets = false;
        let mut quote: Option<char> = None;

        let flush = |current: &mut String, pending: &mut Combinator, parts: &mut Vec<(Combinator, Compound)>| -> Result<()> {
            if !current.is_empty() {
                parts.push((*pending, Compound::parse(source, current)?));
                current.clear();
                *pending = Combinator::Descendant;
            }
            Ok(())
        };

        for ch in trimmed.chars() {
            if let Some(q) = quote {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
                continue;
            }
            match ch {
                '"' | '\'' if in_brackets => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '[' => {
                    in_brackets = true;
                    current.push(ch);
                }
                ']' => {
                    in_brackets = false;
                    current.push(ch);
                }
                c if c.is_whitespace() && !in_brackets => {
                    flush(&mut current, &mut pending, &mut parts)?;
                }
                '>' if !in_brackets => {
                    flush(&mut current, &mut pending, &mut parts)?;
                    if parts.is_empty() {
                        return Err(HatewatchError::selector(source, "leading combinator"));
                    }
                    pending = Combinator::Child;
                }
                _ => current.push(ch),
            }
        }

        if in_brackets || quote.is_some() {
            return Err(HatewatchError::selector(source, "unterminated attribute"));
        }
        if current.is_empty() && pending == Combinator::Child {
            return Err(HatewatchError::selector(source, "trailing combinator"));
        }
        flush(&mut current, &mut pending, &mut parts)?;

        Ok(Self {
            source: trimmed.to_string(),
            parts,
        })
    }

    /// `[name]`
    pub fn attribute(name: &str) -> Self {
        Self {
            source: format!("[{}]", name),
            parts: vec![(
                Combinator::Descendant,
                Compound {
                    attributes: vec![AttributeCondition::Exists(name.to_string())],
                    ..Compound::default()
                },
            )],
        }
    }

    /// `.name`
    pub fn class(name: &str) -> Self {
        Self {
            source: format!(".{}", name),
            parts: vec![(
                Combinator::Descendant,
                Compound {
                    classes: vec![name.to_string()],
                    ..Compound::default()
                },
            )],
        }
    }

    /// Parses each entry, dropping the ones that are not valid selectors.
    pub fn parse_list(sources: &[&str]) -> Vec<Self> {
        sources.iter().filter_map(|s| Selector::parse(s).ok()).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `node` is matched by this selector, evaluated against the whole document.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match self.parts.len() {
            0 => false,
            n => self.matches_part(doc, node, n - 1),
        }
    }

    fn matches_part(&self, doc: &Document, node: NodeId, idx: usize) -> bool {
        let (combinator, compound) = &self.parts[idx];
        if !compound.matches(doc, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => doc
                .parent(node)
                .map(|p| self.matches_part(doc, p, idx - 1))
                .unwrap_or(false),
            Combinator::Descendant => {
                let mut ancestor = doc.parent(node);
                while let Some(a) = ancestor {
                    if self.matches_part(doc, a, idx - 1) {
                        return true;
                    }
                    ancestor = doc.parent(a);
                }
                false
            }
        }
    }
}

impl FromStr for Selector {
    type Err = HatewatchError;

    fn from_str(s: &str) -> Result<Self> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Selector::parse(&raw).map_err(serde::de::Error::custom)
    }
}
