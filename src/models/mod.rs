// src/models/mod.rs

//! Domain models: crawl plans and the output records a run assembles.

mod book;
mod plan;

pub use book::{Book, Chapter, Metadata, Page, PageUnit, Tag};
pub use plan::{Filter, Iterate, LinkSource, OnError, Plan, SUPPORTED_VERSION};
