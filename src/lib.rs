// src/lib.rs

//! folio: declarative query & crawl engine.
//!
//! A plan file describes which nodes to select, how to combine field
//! predicates, and how to walk link graphs; the engine assembles the
//! extracted pages into chapters and a book record.

pub mod error;
pub mod expr;
pub mod fetch;
pub mod models;
pub mod planner;
pub mod query;
pub mod utils;

pub use error::{AppError, Result};
pub use fetch::{Fetch, FetchConfig, HttpFetcher};
pub use models::{Book, Chapter, Page, Plan};
pub use planner::QueryPlan;
pub use query::Document;
