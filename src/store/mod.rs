// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod http;
pub mod memory;
pub mod properties;

use chrono::NaiveDate;
use thiserror::Error;

pub use properties::{FormulaValue, Icon, Page, Properties, PropertyValue};

#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP 5xx, 429, network blips. Recovered by a later full run.
    #[error("transient store failure: {0}")]
    Transient(String),
    /// The store rejected the request outright (bad id, bad payload).
    #[error("store rejected request: {0}")]
    Request(String),
    /// A page came back with properties that do not match the expected shape.
    #[error("page {page}: property '{property}' {problem}")]
    Schema {
        page: String,
        property: String,
        problem: String,
    },
}

#[derive(Debug, Clone)]
pub enum Filter {
    All,
    TitleEquals {
        property: String,
        value: String,
    },
    RichTextEquals {
        property: String,
        value: String,
    },
    DateOnOrAfter {
        property: String,
        date: NaiveDate,
    },
    DateBetween {
        property: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    And(Vec<Filter>),
}

impl Filter {
    /// Lenient evaluation used by the in-memory store: a page whose property
    /// is absent or of another kind simply does not match.
    pub fn matches(&self, page: &Page) -> bool {
        match self {
            Filter::All => true,
            Filter::TitleEquals { property, value } => {
                page.title(property).map(|t| t == value).unwrap_or(false)
            }
            Filter::RichTextEquals { property, value } => page
                .rich_text(property)
                .map(|t| t == value)
                .unwrap_or(false),
            Filter::DateOnOrAfter { property, date } => page
                .date_start(property)
                .ok()
                .flatten()
                .map(|d| d >= *date)
                .unwrap_or(false),
            Filter::DateBetween {
                property,
                start,
                end,
            } => page
                .date_start(property)
                .ok()
                .flatten()
                .map(|d| d >= *start && d <= *end)
                .unwrap_or(false),
            Filter::And(parts) => parts.iter().all(|f| f.matches(page)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sort {
    pub property: String,
    pub descending: bool,
}

/// The Notion surface the engine consumes. `query` follows pagination
/// transparently; `update_page` replaces the listed properties (relations are
/// full replacement); `archive_page` is a soft delete.
pub trait Store {
    fn query(
        &self,
        database_id: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Page>, StoreError>;

    fn create_page(
        &self,
        database_id: &str,
        properties: Properties,
        icon: Option<Icon>,
    ) -> Result<Page, StoreError>;

    fn update_page(&self, page_id: &str, properties: Properties) -> Result<(), StoreError>;

    fn archive_page(&self, page_id: &str) -> Result<(), StoreError>;
}
