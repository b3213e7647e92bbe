// src/query/predicate.rs

//! Leaf predicate parsing and matching.
//!
//! A leaf predicate is the atomic, non-boolean unit of the query language:
//! `<field> (":" | "=") <value>`. Each predicate is parsed once into a
//! [`Field`] and a [`MatchMode`] and the parsed form is evaluated, instead
//! of re-dispatching on raw strings per node.

use regex::{Regex, RegexBuilder};

use crate::error::{AppError, Result};

/// Which part of a node the predicate reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Collected text content
    Text,
    /// Inner HTML
    Html,
    /// Form-control value (may be multi-valued for select elements)
    Value,
    /// Named attribute lookup
    Attr(String),
}

/// How the field content is compared against the predicate value.
#[derive(Debug, Clone)]
pub enum MatchMode {
    /// Exact string equality
    Exact(String),
    /// `prefix%` — content starts with
    Prefix(String),
    /// `%suffix` — content ends with
    Suffix(String),
    /// `%substr%` — content contains
    Substring(String),
    /// `@reg /pattern/flags` — content matches
    Regex(Regex),
}

impl MatchMode {
    /// Parse a value string into its matching mode. The `%` markers and the
    /// `@reg` form are tested in precedence order; anything else is an
    /// exact match.
    pub fn parse(value: &str) -> Result<Self> {
        if value.len() >= 2 && value.starts_with('%') && value.ends_with('%') {
            return Ok(Self::Substring(value[1..value.len() - 1].to_string()));
        }
        if let Some(suffix) = value.strip_prefix('%') {
            return Ok(Self::Suffix(suffix.to_string()));
        }
        if let Some(prefix) = value.strip_suffix('%') {
            return Ok(Self::Prefix(prefix.to_string()));
        }
        if let Some(rest) = value.strip_prefix("@reg") {
            return Ok(Self::Regex(parse_regex_literal(rest.trim())?));
        }
        Ok(Self::Exact(value.to_string()))
    }

    /// Test content against this mode. Empty content never matches, and an
    /// exact match against the empty string is always false.
    pub fn matches(&self, content: &str) -> bool {
        if content.is_empty() {
            return false;
        }
        match self {
            Self::Exact(value) => !value.is_empty() && content == value,
            Self::Prefix(prefix) => content.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => content.ends_with(suffix.as_str()),
            Self::Substring(needle) => content.contains(needle.as_str()),
            Self::Regex(regex) => regex.is_match(content),
        }
    }
}

/// A parsed leaf predicate.
#[derive(Debug, Clone)]
pub struct LeafPredicate {
    pub field: Field,
    pub mode: MatchMode,
}

impl LeafPredicate {
    /// Parse `<field> (":" | "=") <value>`, splitting at the first
    /// separator. Quoted values have their quotes stripped and are then
    /// mode-parsed like any other value; bare values must be non-empty and
    /// balanced.
    pub fn parse(input: &str) -> Result<Self> {
        let sep = input
            .find([':', '='])
            .ok_or_else(|| AppError::syntax(format!("invalid expression \"{input}\"")))?;
        let field_raw = input[..sep].trim();
        let value_raw = input[sep + 1..].trim();

        let field = match field_raw {
            "text" => Field::Text,
            "html" => Field::Html,
            "value" => Field::Value,
            _ => {
                if let Some(name) = field_raw.strip_prefix("attr.") {
                    Field::Attr(name.to_string())
                } else {
                    return Err(AppError::validation(format!(
                        "invalid expression \"{field_raw}\""
                    )));
                }
            }
        };

        let value = match strip_quotes(value_raw) {
            Some(inner) => inner,
            None => {
                if value_raw.is_empty() {
                    return Err(AppError::validation(format!("invalid literal at \"{input}\"")));
                }
                if has_partial_quote(value_raw) {
                    return Err(AppError::validation(format!(
                        "invalid literal due to \" or ' at \"{input}\""
                    )));
                }
                value_raw.to_string()
            }
        };

        Ok(Self {
            field,
            mode: MatchMode::parse(&value)?,
        })
    }
}

/// Strip a balanced pair of single or double quotes, if present.
fn strip_quotes(value: &str) -> Option<String> {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return Some(value[1..value.len() - 1].to_string());
        }
    }
    None
}

/// Detect a bare value with only one side quoted.
fn has_partial_quote(value: &str) -> bool {
    value.starts_with('"') || value.starts_with('\'') || value.ends_with('"') || value.ends_with('\'')
}

/// Parse the `/pattern/flags` form following `@reg`.
fn parse_regex_literal(literal: &str) -> Result<Regex> {
    let open = literal
        .find('/')
        .ok_or_else(|| regex_form_error(literal))?;
    let close = literal.rfind('/').ok_or_else(|| regex_form_error(literal))?;
    if close <= open {
        return Err(regex_form_error(literal));
    }
    let pattern = &literal[open + 1..close];
    let flags = &literal[close + 1..];

    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            // global/sticky/unicode flags have no per-match meaning here
            'g' | 'u' | 'y' => {}
            other => {
                return Err(AppError::syntax(format!(
                    "unsupported regex flag '{other}' in \"{literal}\""
                )));
            }
        }
    }
    builder
        .build()
        .map_err(|e| AppError::syntax(format!("error parsing \"{literal}\": {e}")))
}

fn regex_form_error(literal: &str) -> AppError {
    AppError::syntax(format!(
        "regex pattern invalid at \"{literal}\", expects \"@reg /{{regex}}/{{flag}}\""
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(value: &str) -> MatchMode {
        MatchMode::parse(value).unwrap()
    }

    #[test]
    fn match_modes_against_hello_world() {
        assert!(mode("%World").matches("Hello World"));
        assert!(mode("%World%").matches("Hello World"));
        assert!(mode("Hello%").matches("Hello World"));
        assert!(mode("@reg /wo(.+)/ig").matches("Hello World"));
        assert!(mode("@reg /W(.+)d/i").matches("Hello World"));

        assert!(!mode("World%").matches("Hello World"));
        assert!(!mode("World").matches("Hello World"));
        assert!(!mode("world%").matches("Hello World"));
    }

    #[test]
    fn empty_content_never_matches() {
        assert!(!mode("%anything%").matches(""));
        assert!(!mode("@reg /.*/").matches(""));
    }

    #[test]
    fn exact_empty_value_never_matches() {
        let parsed = LeafPredicate::parse("text = \"\"").unwrap();
        assert!(!parsed.mode.matches("something"));
    }

    #[test]
    fn parse_splits_at_first_separator() {
        let parsed = LeafPredicate::parse("attr.href : http://example.com").unwrap();
        assert_eq!(parsed.field, Field::Attr("href".to_string()));
        assert!(parsed.mode.matches("http://example.com"));
    }

    #[test]
    fn parse_accepts_equals_separator() {
        let parsed = LeafPredicate::parse("text = hello").unwrap();
        assert_eq!(parsed.field, Field::Text);
    }

    #[test]
    fn quoted_values_keep_match_modes() {
        let parsed = LeafPredicate::parse("attr.value = \"%John%\"").unwrap();
        assert!(parsed.mode.matches("My name is John"));
    }

    #[test]
    fn reserved_fields_parse() {
        for (input, field) in [
            ("text : x", Field::Text),
            ("html : x", Field::Html),
            ("value : x", Field::Value),
            ("attr.class : x", Field::Attr("class".to_string())),
        ] {
            assert_eq!(LeafPredicate::parse(input).unwrap().field, field);
        }
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(LeafPredicate::parse("foo = 1234").is_err());
        assert!(LeafPredicate::parse("at tr.value = 1234").is_err());
    }

    #[test]
    fn missing_separator_is_rejected() {
        assert!(LeafPredicate::parse("just a string").is_err());
    }

    #[test]
    fn empty_bare_literal_is_rejected() {
        assert!(LeafPredicate::parse("attr.value = ").is_err());
    }

    #[test]
    fn partial_quotes_are_rejected() {
        assert!(LeafPredicate::parse("value = 1234\"").is_err());
        assert!(LeafPredicate::parse("value = '1234").is_err());
    }

    #[test]
    fn malformed_regex_literal_is_rejected() {
        assert!(MatchMode::parse("@reg pattern-without-slashes").is_err());
        assert!(MatchMode::parse("@reg /unclosed").is_err());
        assert!(MatchMode::parse("@reg /ok/Z").is_err());
    }
}
