// src/planner/mod.rs

//! Crawl planner: executes a validated plan against the fetch collaborator.
//!
//! A run walks every top-level target, selecting link candidates with the
//! query language, optionally following indirect links, and assembling the
//! extracted pages into one chapter per target. Iterating plans drive the
//! walker once per counter combination, appending onto the same chapter so
//! page numbering stays contiguous.
//!
//! Failure domains are deliberately narrow: one bad candidate never aborts
//! its siblings, and one failed iteration is handled by that counter's
//! `continue`/`break` policy without affecting outer loops or targets.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use regex::Regex;
use url::Url;

use crate::error::{AppError, Result};
use crate::fetch::Fetch;
use crate::models::{Book, Chapter, Filter, Iterate, LinkSource, OnError, PageUnit, Plan, Tag};
use crate::query::Document;
use crate::utils::{feed_values, host_tag, infer_extension, resolve_rooted, resume_text};

/// Callback invoked for every resolved leaf link, successful or not.
pub type OnTarget<'a> = &'a mut (dyn FnMut(&str, Option<&AppError>) + Send);

/// A validated plan bound to parameters and a fetch collaborator.
///
/// One instance drives one run at a time: counter values are bound into
/// the parameter map as iteration advances, which `run(&mut self)` makes
/// the compiler enforce.
pub struct QueryPlan {
    plan: Plan,
    params: HashMap<String, String>,
    title: String,
    fetcher: Arc<dyn Fetch>,
}

impl QueryPlan {
    /// Wrap a validated plan.
    pub fn new(plan: Plan, fetcher: Arc<dyn Fetch>) -> Self {
        let title = feed_values(&plan.title, &HashMap::new());
        Self {
            plan,
            params: HashMap::new(),
            title,
            fetcher,
        }
    }

    /// Record caller-supplied parameters and resolve the book title.
    ///
    /// Fails when a key collides with a name reserved by the plan's
    /// `iterate` structure.
    pub fn bind(&mut self, params: HashMap<String, String>) -> Result<&mut Self> {
        let counters: Vec<String> = self
            .plan
            .counter_names()
            .into_iter()
            .map(String::from)
            .collect();
        for key in params.keys() {
            if counters.iter().any(|name| name == key) {
                return Err(AppError::validation(format!(
                    "parameters error, variable \"{key}\" already used in the plan"
                )));
            }
        }
        self.params = params;
        self.title = feed_values(&self.plan.title, &self.params);
        Ok(self)
    }

    /// The resolved book title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Execute the plan, returning a fresh [`Book`].
    pub async fn run(&mut self, on_target: Option<OnTarget<'_>>) -> Result<Book> {
        if self.plan.verbose {
            info!("[plan] verbose enabled");
        }
        if self.plan.canonical_name {
            info!("[plan] canonical naming enabled");
        }

        // Plan defaults fill in whatever the caller left unbound; the
        // values are themselves templates.
        for (key, value) in self.plan.defaults.clone() {
            if self.params.contains_key(&key) {
                continue;
            }
            let fed = feed_values(&value, &self.params);
            self.params.insert(key, fed);
        }

        for requirement in &self.plan.required {
            if !self.params.contains_key(requirement) {
                let available = if self.params.is_empty() {
                    "<none>".to_string()
                } else {
                    self.params
                        .keys()
                        .map(|k| format!("\"{k}\""))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                return Err(AppError::validation(format!(
                    "unable to resolve required variable \"{requirement}\", \
                     available names: {available}"
                )));
            }
        }

        let all_targets: Vec<String> = self
            .plan
            .targets
            .iter()
            .map(|target| feed_values(target, &self.params))
            .collect();

        let mut noop = |_: &str, _: Option<&AppError>| {};
        let callback: OnTarget<'_> = match on_target {
            Some(callback) => callback,
            None => &mut noop,
        };

        let fetcher = Arc::clone(&self.fetcher);
        let filter = self.plan.filter.clone();
        let iterate = self.plan.iterate.clone();

        let mut chapters: Vec<Chapter> = Vec::new();
        for target in &all_targets {
            let mut chapter = Chapter::numbered(chapters.len() + 1, target.clone());

            if let Some(iterate) = &iterate {
                process_iterate(
                    fetcher.as_ref(),
                    &filter,
                    iterate,
                    target,
                    &mut self.params,
                    &mut chapter,
                    &mut *callback,
                )
                .await?;
            } else {
                // Non-iterating path: per-candidate errors are logged and
                // reported via the callback, never raised for the run.
                let mut errors = Vec::new();
                let pages = process_url(
                    fetcher.as_ref(),
                    &filter,
                    target,
                    &self.params,
                    &mut *callback,
                    &mut errors,
                )
                .await?;
                chapter.pages = pages
                    .into_iter()
                    .enumerate()
                    .map(|(i, unit)| unit.into_page(i + 1))
                    .collect();
                for (link, error) in &errors {
                    info!("fetch error {link}: {error}");
                }
            }

            chapters.push(chapter);
        }

        Ok(Book {
            title: self.title.clone(),
            title_aliases: Vec::new(),
            source_id: self.title.clone(),
            description: all_targets.join(", "),
            authors: Vec::new(),
            chapters,
            tags: all_targets
                .iter()
                .filter_map(|target| host_tag(target))
                .map(|name| Tag {
                    name,
                    metadatas: Vec::new(),
                })
                .collect(),
            metadatas: Vec::new(),
            url: all_targets.first().cloned().unwrap_or_default(),
        })
    }
}

/// Depth-first walk of the nested counters. Counter values are bound into
/// the parameter map before each level's iterations; the walker runs once
/// per leaf combination and the `continue`/`break` policy consumes failed
/// iterations locally.
fn process_iterate<'a>(
    fetcher: &'a dyn Fetch,
    filter: &'a Filter,
    iterate: &'a Iterate,
    target: &'a str,
    params: &'a mut HashMap<String, String>,
    chapter: &'a mut Chapter,
    on_target: OnTarget<'a>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let (start, end) = iterate.range;
        for value in start..=end {
            params.insert(iterate.name.clone(), value.to_string());

            if let Some(each) = &iterate.each {
                process_iterate(
                    fetcher,
                    filter,
                    each,
                    target,
                    &mut *params,
                    &mut *chapter,
                    &mut *on_target,
                )
                .await?;
                continue;
            }

            let mut errors = Vec::new();
            let failed = match process_url(
                fetcher,
                filter,
                target,
                params,
                &mut *on_target,
                &mut errors,
            )
            .await
            {
                Ok(pages) => {
                    if pages.is_empty() {
                        warn!("no content found at {target} ({}={value})", iterate.name);
                        true
                    } else {
                        // Offset by the pages already collected so numbering
                        // stays contiguous across iterations.
                        let offset = chapter.pages.len();
                        for (i, unit) in pages.into_iter().enumerate() {
                            chapter.pages.push(unit.into_page(offset + i + 1));
                        }
                        !errors.is_empty()
                    }
                }
                Err(error) => {
                    warn!("iteration {}={value} failed: {error}", iterate.name);
                    true
                }
            };

            if failed && iterate.on_error == OnError::Break {
                debug!("breaking counter {} at {value}", iterate.name);
                break;
            }
        }
        Ok(())
    })
}

/// Resolve one target URL through the parameter templates and run the link
/// walker against it.
async fn process_url(
    fetcher: &dyn Fetch,
    filter: &Filter,
    target: &str,
    params: &HashMap<String, String>,
    on_target: OnTarget<'_>,
    errors: &mut Vec<(String, AppError)>,
) -> Result<Vec<PageUnit>> {
    let url = feed_values(target, params);
    let base = Url::parse(&url)?;
    let mut pages = Vec::new();
    navigate(fetcher, filter, url, &base, 0, &mut pages, on_target, errors).await?;
    Ok(pages)
}

/// Recursive link walker for one filter level.
///
/// A failed top-level fetch propagates to the caller; everything that goes
/// wrong for a single candidate (empty link, modifier failure, a failed
/// fetch inside `follow_link`) is caught here, reported via the callback,
/// and appended to the local error list.
#[allow(clippy::too_many_arguments)]
fn navigate<'a>(
    fetcher: &'a dyn Fetch,
    filter: &'a Filter,
    url: String,
    base: &'a Url,
    depth: usize,
    pages: &'a mut Vec<PageUnit>,
    on_target: OnTarget<'a>,
    errors: &'a mut Vec<(String, AppError)>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let url = resolve_rooted(base, &url);
        debug!("{}> focus on {url}", "=".repeat(depth));

        let html = fetcher.get(&url).await?;

        // Extraction is synchronous: the parsed document must not live
        // across an await point.
        let candidates: Vec<(Option<String>, String)> = {
            let document = Document::parse(&html);
            let mut selection = document.select(&filter.select)?;
            if let Some(expression) = &filter.where_expr {
                selection = selection.where_expr(expression)?;
            }
            selection.map(|node| {
                let raw = match &filter.link_from {
                    LinkSource::Text => Some(node.text().trim().to_string()),
                    LinkSource::Attr(name) => node.attr(name).map(|v| v.trim().to_string()),
                };
                let title = node.attr("alt").unwrap_or_default().to_string();
                (raw, title)
            })
        };

        for (raw_link, title) in candidates {
            let shown = raw_link.clone().unwrap_or_default();
            let resolved = resolve_candidate(filter, raw_link, base);

            let outcome = match resolved {
                Ok(link) => {
                    if let Some(follow) = &filter.follow_link {
                        navigate(
                            fetcher,
                            follow,
                            link.clone(),
                            base,
                            depth + 1,
                            &mut *pages,
                            &mut *on_target,
                            &mut *errors,
                        )
                        .await
                        .map_err(|error| (link, error))
                    } else {
                        on_target(&link, None);
                        debug!(
                            "{}> detected {} #{}",
                            "=".repeat(depth),
                            resume_text(&link, 50),
                            pages.len() + 1
                        );
                        pages.push(PageUnit {
                            extension: infer_extension(&link),
                            title,
                            url: link,
                        });
                        Ok(())
                    }
                }
                Err(error) => Err((shown, error)),
            };

            if let Err((link, error)) = outcome {
                debug!("candidate failed: {error}");
                on_target(&link, Some(&error));
                errors.push((link, error));
            }
        }

        Ok(())
    })
}

/// Per-candidate link resolution: reject empty links, apply the modifier
/// pairs in declaration order, then root the result against the target's
/// origin.
fn resolve_candidate(filter: &Filter, raw: Option<String>, base: &Url) -> Result<String> {
    let mut link = raw.unwrap_or_default();
    if link.is_empty() {
        return Err(AppError::crawl(
            filter.select.clone(),
            "unable to extract a link, got an empty value",
        ));
    }
    for (pattern, replacement) in &filter.link_modifier {
        let regex = Regex::new(pattern)
            .map_err(|e| AppError::crawl(filter.select.clone(), format!("linkModifier: {e}")))?;
        link = regex.replace_all(&link, replacement.as_str()).into_owned();
    }
    Ok(resolve_rooted(base, &link))
}
