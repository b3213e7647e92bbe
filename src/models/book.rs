// src/models/book.rs

//! Output records assembled by a crawl run.

use serde::{Deserialize, Serialize};

/// One extracted asset before it is numbered into a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUnit {
    pub extension: String,
    pub title: String,
    pub url: String,
}

impl PageUnit {
    /// Number this unit into a chapter page. `number` is 1-based.
    pub fn into_page(self, number: usize) -> Page {
        Page {
            filename: format!("{}.{}", number, self.extension),
            number,
            title: self.title,
            url: self.url,
        }
    }
}

/// One extracted page of a chapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub title: String,
    pub url: String,
    /// 1-based index of the page within its chapter
    pub number: usize,
    /// Synthesized filename, `<number>.<extension>`
    pub filename: String,
}

/// An ordered group of pages, one per top-level target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub description: String,
    /// 1-based index of the chapter within its book
    pub number: usize,
    pub pages: Vec<Page>,
    pub url: String,
}

impl Chapter {
    /// Create an empty chapter for the `n`-th target.
    pub fn numbered(number: usize, url: impl Into<String>) -> Self {
        Self {
            title: format!("CH.{number}"),
            description: String::new(),
            number,
            pages: Vec::new(),
            url: url.into(),
        }
    }
}

/// A tag characterised by its name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub metadatas: Vec<Metadata>,
}

/// Arbitrary key/value metadata attached to a book or tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub label: String,
    pub content: String,
}

/// The full extracted work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    #[serde(default)]
    pub title_aliases: Vec<String>,
    /// Unique id relative to the source
    pub source_id: String,
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub chapters: Vec<Chapter>,
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub metadatas: Vec<Metadata>,
    /// Source url of the book
    pub url: String,
}

impl Book {
    /// Total page count across all chapters.
    pub fn page_count(&self) -> usize {
        self.chapters.iter().map(|c| c.pages.len()).sum()
    }
}
