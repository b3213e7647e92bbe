// src/models/plan.rs

//! Declarative crawl plan: schema, loading and strict validation.
//!
//! A plan is authored in TOML or JSON, normalized to a `serde_json::Value`
//! and validated eagerly by a hand-written schema walk. Validation is
//! fail-fast: the plan is never partially accepted, and every error message
//! carries the path of the offending key (e.g. `iterate.PAGE.range`).

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

use crate::error::{AppError, Result};

/// The plan version this engine supports.
pub const SUPPORTED_VERSION: &str = "1.0.0";

/// Where a candidate's raw link value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSource {
    /// The node's trimmed text content
    Text,
    /// A named attribute
    Attr(String),
}

/// One level of link selection. `follow_link` makes the structure
/// recursive: author-defined, acyclic by convention, never cycle-checked.
#[derive(Debug, Clone)]
pub struct Filter {
    pub select: String,
    pub where_expr: Option<String>,
    pub link_from: LinkSource,
    /// Regex pattern → replacement pairs, applied in declaration order
    pub link_modifier: Vec<(String, String)>,
    pub follow_link: Option<Box<Filter>>,
}

/// Policy applied when one iteration of a counter fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    #[default]
    Continue,
    Break,
}

/// One named, ranged loop variable, possibly nested.
#[derive(Debug, Clone)]
pub struct Iterate {
    pub name: String,
    /// Inclusive bounds, start ≤ end
    pub range: (i64, i64),
    pub on_error: OnError,
    pub each: Option<Box<Iterate>>,
}

/// A validated crawl plan.
#[derive(Debug, Clone)]
pub struct Plan {
    pub version: String,
    /// Book title template (may reference `{PARAM}` and built-ins)
    pub title: String,
    pub targets: Vec<String>,
    pub filter: Filter,
    pub iterate: Option<Iterate>,
    pub required: Vec<String>,
    /// Default parameter values, in declaration order; values are templates
    pub defaults: Vec<(String, String)>,
    pub headless: bool,
    pub use_proxy: bool,
    pub verbose: bool,
    pub canonical_name: bool,
}

impl Plan {
    /// Parse and validate a JSON plan.
    pub fn from_json_str(source: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(source)?;
        Self::validate(&raw)
    }

    /// Parse and validate a TOML plan.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let raw: toml::Value = toml::from_str(source)?;
        Self::validate(&serde_json::to_value(raw)?)
    }

    /// Load a plan file, dispatching on the `.json` extension (anything
    /// else is treated as TOML).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Strict schema walk over the raw plan value.
    pub fn validate(raw: &Value) -> Result<Self> {
        let root = raw
            .as_object()
            .ok_or_else(|| AppError::validation("plan is not a key-value object"))?;

        let version = require_str(root, "version")?;
        if version != SUPPORTED_VERSION {
            return Err(AppError::validation(format!(
                "version {version} not supported, expected {SUPPORTED_VERSION}"
            )));
        }

        let targets = match root.get("target") {
            None => {
                return Err(AppError::validation(
                    "required key \"target\" not found in the plan",
                ));
            }
            Some(value) => parse_targets(value)?,
        };

        let title = match root.get("title") {
            Some(value) => as_str(value, "title")?.to_string(),
            None => "untitled_{_TIMESTAMP_}".to_string(),
        };

        let headless = optional_bool(root, "headless")?;
        let use_proxy = optional_bool(root, "useProxy")?;
        let verbose = optional_bool(root, "verbose")?;
        let canonical_name = optional_bool(root, "canonicalName")?;

        let required = match root.get("required") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(|s| s.to_string()).ok_or_else(|| {
                        AppError::validation(format!(
                            "required variable name {item} is not a string"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(AppError::validation(format!(
                    "\"required\" is not an array, got {other}"
                )));
            }
        };

        let defaults = match root.get("default") {
            None => Vec::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, value)| {
                    as_str(value, &format!("default.{key}")).map(|s| (key.clone(), s.to_string()))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(AppError::validation("\"default\" is not a key-value object"));
            }
        };

        let filter = match root.get("filter") {
            None => {
                return Err(AppError::validation(
                    "required key \"filter\" not found in the plan",
                ));
            }
            Some(value) => parse_filter(value, "filter")?,
        };

        // Counter names must be unique against required vars and each other.
        let mut used_names: HashSet<String> = required.iter().cloned().collect();
        let iterate = match root.get("iterate") {
            None => None,
            Some(value) => Some(parse_iterate(value, "iterate", &mut used_names)?),
        };

        Ok(Self {
            version: version.to_string(),
            title,
            targets,
            filter,
            iterate,
            required,
            defaults,
            headless,
            use_proxy,
            verbose,
            canonical_name,
        })
    }

    /// Every counter name declared by the plan's `iterate` structure.
    pub fn counter_names(&self) -> HashSet<&str> {
        let mut names = HashSet::new();
        let mut level: Option<&Iterate> = self.iterate.as_ref();
        while let Some(counter) = level {
            names.insert(counter.name.as_str());
            level = counter.each.as_deref();
        }
        names
    }
}

fn require_str<'a>(root: &'a serde_json::Map<String, Value>, key: &str) -> Result<&'a str> {
    match root.get(key) {
        None => Err(AppError::validation(format!(
            "required key \"{key}\" not found in the plan"
        ))),
        Some(value) => as_str(value, key),
    }
}

fn as_str<'a>(value: &'a Value, path: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| AppError::validation(format!("\"{path}\" is not a string")))
}

fn optional_bool(root: &serde_json::Map<String, Value>, key: &str) -> Result<bool> {
    match root.get(key) {
        None => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(AppError::validation(format!(
            "\"{key}\" is not a boolean, got {other}"
        ))),
    }
}

/// `target` may be a single string or an array of strings.
fn parse_targets(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(single) => Ok(vec![single.clone()]),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| AppError::validation(format!("\"target[{i}]\" is not a string")))
            })
            .collect(),
        _ => Err(AppError::validation("\"target\" is not a string or an array")),
    }
}

fn parse_filter(value: &Value, path: &str) -> Result<Filter> {
    let map = value
        .as_object()
        .ok_or_else(|| AppError::validation(format!("\"{path}\" is not a key-value object")))?;

    let select = match map.get("select") {
        Some(value) => as_str(value, &format!("{path}.select"))?.to_string(),
        None => {
            return Err(AppError::validation(format!(
                "no node selected at {path}: \"select\" is missing"
            )));
        }
    };

    let link_from = match map.get("linkFrom") {
        None => {
            return Err(AppError::validation(format!(
                "\"linkFrom\" is undefined at {path}"
            )));
        }
        Some(value) => {
            let raw = as_str(value, &format!("{path}.linkFrom"))?;
            if raw == "text" {
                LinkSource::Text
            } else if let Some(name) = raw.strip_prefix("attr.") {
                LinkSource::Attr(name.to_string())
            } else {
                return Err(AppError::validation(format!(
                    "\"linkFrom\" at {path} must be \"text\" or \"attr.<name>\", got \"{raw}\""
                )));
            }
        }
    };

    let where_expr = match map.get("where") {
        None => None,
        Some(value) => Some(as_str(value, &format!("{path}.where"))?.to_string()),
    };

    let link_modifier = match map.get("linkModifier") {
        None => Vec::new(),
        Some(Value::Array(_)) => {
            return Err(AppError::validation(format!(
                "\"linkModifier\" should be an object at {path}, got array"
            )));
        }
        Some(Value::Object(modifiers)) => modifiers
            .iter()
            .map(|(pattern, replacement)| {
                as_str(replacement, &format!("{path}.linkModifier.{pattern}"))
                    .map(|r| (pattern.clone(), r.to_string()))
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(AppError::validation(format!(
                "\"linkModifier\" is not a key-value object at {path}"
            )));
        }
    };

    let follow_link = match map.get("followLink") {
        None => None,
        Some(value) => Some(Box::new(parse_filter(value, &format!("{path}.followLink"))?)),
    };

    Ok(Filter {
        select,
        where_expr,
        link_from,
        link_modifier,
        follow_link,
    })
}

fn parse_iterate(value: &Value, path: &str, used_names: &mut HashSet<String>) -> Result<Iterate> {
    let map = value
        .as_object()
        .ok_or_else(|| AppError::validation(format!("\"{path}\" is not a key-value object")))?;

    if map.len() != 1 {
        return Err(AppError::validation(format!(
            "exactly one counter name expected at {path}, got {}",
            map.len()
        )));
    }
    let Some((name, counter)) = map.iter().next() else {
        return Err(AppError::validation(format!(
            "counter name undefined at {path}"
        )));
    };
    let path = format!("{path}.{name}");
    if !used_names.insert(name.clone()) {
        return Err(AppError::validation(format!(
            "variable \"{name}\" already used at {path}"
        )));
    }

    let counter = counter
        .as_object()
        .ok_or_else(|| AppError::validation(format!("\"{path}\" is not a key-value object")))?;

    let on_error = match counter.get("onError") {
        None => OnError::default(),
        Some(value) => match as_str(value, &format!("{path}.onError"))? {
            "continue" => OnError::Continue,
            "break" => OnError::Break,
            other => {
                return Err(AppError::validation(format!(
                    "onError has invalid value \"{other}\" at {path}, \
                     \"continue\" or \"break\" expected"
                )));
            }
        },
    };

    let range = match counter.get("range") {
        None => {
            return Err(AppError::validation(format!("range is undefined at {path}")));
        }
        Some(Value::Array(bounds)) => {
            if bounds.len() != 2 {
                return Err(AppError::validation(format!(
                    "invalid range size at {path}.range, expected 2 entries"
                )));
            }
            let start = parse_bound(&bounds[0], &format!("{path}.range[0]"))?;
            let end = parse_bound(&bounds[1], &format!("{path}.range[1]"))?;
            if start > end {
                return Err(AppError::validation(format!(
                    "{start} > {end} at {path}.range"
                )));
            }
            (start, end)
        }
        Some(_) => {
            return Err(AppError::validation(format!(
                "range is not an array at {path}"
            )));
        }
    };

    let each = match counter.get("each") {
        None => None,
        Some(value) => Some(Box::new(parse_iterate(
            value,
            &format!("{path}.each"),
            used_names,
        )?)),
    };

    Ok(Iterate {
        name: name.clone(),
        range,
        on_error,
        each,
    })
}

/// Range bounds accept integers or numeric strings.
fn parse_bound(value: &Value, path: &str) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| AppError::validation(format!("{n} is not an integer at {path}"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::validation(format!("\"{s}\" is not a number at {path}"))),
        other => Err(AppError::validation(format!(
            "{other} is not a number at {path}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_TOML: &str = r#"
        version = "1.0.0"
        title = "gallery-{NAME}"
        target = "https://example.com/{NAME}"
        required = ["NAME"]

        [default]
        SUFFIX = "latest"

        [filter]
        select = "div.gallery a"
        where = "attr.href : %page%"
        linkFrom = "attr.href"

        [filter.linkModifier]
        "thumb" = "full"

        [filter.followLink]
        select = "img.main"
        linkFrom = "attr.src"

        [iterate.PAGE]
        range = [1, 3]
        onError = "continue"

        [iterate.PAGE.each.SLOT]
        range = [0, 1]
        onError = "break"
    "#;

    #[test]
    fn valid_plan_parses() {
        let plan = Plan::from_toml_str(VALID_TOML).unwrap();
        assert_eq!(plan.version, SUPPORTED_VERSION);
        assert_eq!(plan.targets, vec!["https://example.com/{NAME}"]);
        assert_eq!(plan.required, vec!["NAME"]);
        assert_eq!(plan.defaults, vec![("SUFFIX".to_string(), "latest".to_string())]);
        assert_eq!(plan.filter.link_from, LinkSource::Attr("href".to_string()));
        assert_eq!(
            plan.filter.link_modifier,
            vec![("thumb".to_string(), "full".to_string())]
        );
        assert!(plan.filter.follow_link.is_some());

        let iterate = plan.iterate.as_ref().unwrap();
        assert_eq!(iterate.name, "PAGE");
        assert_eq!(iterate.range, (1, 3));
        assert_eq!(iterate.on_error, OnError::Continue);
        let inner = iterate.each.as_ref().unwrap();
        assert_eq!(inner.name, "SLOT");
        assert_eq!(inner.on_error, OnError::Break);

        assert_eq!(plan.counter_names(), HashSet::from(["PAGE", "SLOT"]));
    }

    #[test]
    fn json_plan_parses() {
        let plan = Plan::from_json_str(
            r#"{
                "version": "1.0.0",
                "target": ["https://a.example", "https://b.example"],
                "filter": { "select": "a", "linkFrom": "text" }
            }"#,
        )
        .unwrap();
        assert_eq!(plan.targets.len(), 2);
        assert_eq!(plan.filter.link_from, LinkSource::Text);
        assert_eq!(plan.title, "untitled_{_TIMESTAMP_}");
    }

    fn minimal(extra: &str) -> String {
        format!(
            r#"
            version = "1.0.0"
            target = "https://example.com"
            [filter]
            select = "a"
            linkFrom = "text"
            {extra}
            "#
        )
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let source = minimal("").replace("1.0.0", "2.0.0");
        let err = Plan::from_toml_str(&source).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn missing_target_is_rejected() {
        let source = r#"
            version = "1.0.0"
            [filter]
            select = "a"
            linkFrom = "text"
        "#;
        assert!(Plan::from_toml_str(source).is_err());
    }

    #[test]
    fn missing_filter_select_is_rejected() {
        let source = r#"
            version = "1.0.0"
            target = "https://example.com"
            [filter]
            linkFrom = "text"
        "#;
        let err = Plan::from_toml_str(source).unwrap_err();
        assert!(err.to_string().contains("select"));
    }

    #[test]
    fn bad_link_from_is_rejected() {
        let source = r#"
            version = "1.0.0"
            target = "https://example.com"
            [filter]
            select = "a"
            linkFrom = "href"
        "#;
        assert!(Plan::from_toml_str(source).is_err());
    }

    #[test]
    fn link_modifier_array_is_rejected() {
        let source = r#"{
            "version": "1.0.0",
            "target": "https://example.com",
            "filter": {
                "select": "a",
                "linkFrom": "text",
                "linkModifier": ["thumb", "full"]
            }
        }"#;
        let err = Plan::from_json_str(source).unwrap_err();
        assert!(err.to_string().contains("got array"));
    }

    #[test]
    fn nested_follow_link_is_validated() {
        let source = r#"{
            "version": "1.0.0",
            "target": "https://example.com",
            "filter": {
                "select": "a",
                "linkFrom": "text",
                "followLink": { "select": "img" }
            }
        }"#;
        let err = Plan::from_json_str(source).unwrap_err();
        assert!(err.to_string().contains("filter.followLink"));
    }

    #[test]
    fn descending_range_is_rejected() {
        let err = Plan::from_toml_str(&minimal(
            "[iterate.PAGE]\nrange = [5, 2]",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("5 > 2"));
        assert!(err.to_string().contains("iterate.PAGE.range"));
    }

    #[test]
    fn non_numeric_range_is_rejected() {
        assert!(Plan::from_toml_str(&minimal(
            "[iterate.PAGE]\nrange = [\"x\", 2]",
        ))
        .is_err());
    }

    #[test]
    fn string_range_bounds_are_accepted() {
        let plan = Plan::from_toml_str(&minimal(
            "[iterate.PAGE]\nrange = [\"1\", \"4\"]",
        ))
        .unwrap();
        assert_eq!(plan.iterate.unwrap().range, (1, 4));
    }

    #[test]
    fn missing_range_is_rejected() {
        assert!(Plan::from_toml_str(&minimal(
            "[iterate.PAGE]\nonError = \"continue\"",
        ))
        .is_err());
    }

    #[test]
    fn bad_on_error_is_rejected() {
        let err = Plan::from_toml_str(&minimal(
            "[iterate.PAGE]\nrange = [1, 2]\nonError = \"retry\"",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("onError"));
    }

    #[test]
    fn counter_name_colliding_with_required_is_rejected() {
        let source = r#"
            version = "1.0.0"
            target = "https://example.com"
            required = ["PAGE"]
            [filter]
            select = "a"
            linkFrom = "text"
            [iterate.PAGE]
            range = [1, 2]
        "#;
        let err = Plan::from_toml_str(source).unwrap_err();
        assert!(err.to_string().contains("already used"));
    }

    #[test]
    fn duplicate_nested_counter_names_are_rejected() {
        assert!(Plan::from_toml_str(&minimal(
            "[iterate.PAGE]\nrange = [1, 2]\n[iterate.PAGE.each.PAGE]\nrange = [1, 2]",
        ))
        .is_err());
    }

    #[test]
    fn load_dispatches_on_extension() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("plan.toml");
        std::fs::File::create(&toml_path)
            .unwrap()
            .write_all(minimal("").as_bytes())
            .unwrap();
        assert!(Plan::load(&toml_path).is_ok());

        let json_path = dir.path().join("plan.json");
        std::fs::File::create(&json_path)
            .unwrap()
            .write_all(
                br#"{"version":"1.0.0","target":"https://example.com",
                     "filter":{"select":"a","linkFrom":"text"}}"#,
            )
            .unwrap();
        assert!(Plan::load(&json_path).is_ok());
    }
}
