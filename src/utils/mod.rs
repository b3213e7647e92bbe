// src/utils/mod.rs

//! Template substitution, URL helpers and log formatting utilities.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use url::Url;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_ ]+)\}").expect("valid pattern"))
}

/// Substitute `{NAME}` placeholders from the parameter map.
///
/// The built-ins `_TIMESTAMP_` (current epoch milliseconds) and `_RAND_`
/// (random digits) resolve when the name is not bound; unresolved tokens
/// are left untouched. Caller-bound parameters take precedence over
/// built-ins.
pub fn feed_values(template: &str, params: &HashMap<String, String>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let key = caps[1].trim();
            if let Some(value) = params.get(key) {
                return value.clone();
            }
            match key {
                "_TIMESTAMP_" => Utc::now().timestamp_millis().to_string(),
                "_RAND_" => rand::random::<u32>().to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Shorten a string for log output by eliding the middle.
pub fn resume_text(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < max {
        return text.to_string();
    }
    let delta = chars.len() - max;
    let chunk_end = (chars.len() / 2).saturating_sub(delta.div_ceil(2));
    let head: String = chars[..chunk_end].iter().collect();
    let tail: String = chars[chunk_end + delta..].iter().collect();
    format!("{head} .. {tail}")
}

/// Extract the host name of a URL, with a leading `www.` stripped.
/// Used to derive one tag per crawl target.
pub fn host_tag(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

/// Resolve a leading-slash link against a base URL's origin.
pub fn resolve_rooted(base: &Url, href: &str) -> String {
    if href.starts_with('/') {
        base.join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    } else {
        href.to_string()
    }
}

/// Infer a file extension from the trailing path segment: the first run of
/// ASCII letters after the last dot, defaulting to `jpg`.
pub fn infer_extension(link: &str) -> String {
    fn letter_run(raw: &str) -> Option<String> {
        static LETTERS: OnceLock<Regex> = OnceLock::new();
        let re = LETTERS.get_or_init(|| Regex::new(r"[A-Za-z]+").expect("valid pattern"));
        re.find(raw).map(|m| m.as_str().to_string())
    }

    link.rsplit('.')
        .next()
        .and_then(letter_run)
        .unwrap_or_else(|| "jpg".to_string())
}
