// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::StoreError;

pub type Properties = BTreeMap<String, PropertyValue>;

/// One Notion property value. Formula is read-only: the store computes it
/// and it is never sent back on create/update.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Number(Option<Decimal>),
    Checkbox(bool),
    Url(Option<String>),
    Select(Option<String>),
    MultiSelect(Vec<String>),
    Date {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    Relation(Vec<String>),
    Formula(Option<FormulaValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(Decimal),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Icon {
    Emoji(String),
    External(String),
}

#[derive(Debug, Clone)]
pub struct Page {
    pub id: String,
    pub last_edited: DateTime<Utc>,
    pub icon: Option<Icon>,
    pub properties: Properties,
}

static NO_IDS: &[String] = &[];

impl Page {
    fn schema_err(&self, property: &str, problem: &str) -> StoreError {
        StoreError::Schema {
            page: self.id.clone(),
            property: property.to_string(),
            problem: problem.to_string(),
        }
    }

    /// Title is the one property every page must carry.
    pub fn title(&self, key: &str) -> Result<&str, StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::Title(s)) => Ok(s.as_str()),
            Some(_) => Err(self.schema_err(key, "is not a title")),
            None => Err(self.schema_err(key, "is missing")),
        }
    }

    /// Missing rich text reads as empty, matching a cleared Notion field.
    pub fn rich_text(&self, key: &str) -> Result<&str, StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::RichText(s)) => Ok(s.as_str()),
            Some(_) => Err(self.schema_err(key, "is not rich text")),
            None => Ok(""),
        }
    }

    pub fn number(&self, key: &str) -> Result<Option<Decimal>, StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::Number(n)) => Ok(*n),
            Some(_) => Err(self.schema_err(key, "is not a number")),
            None => Ok(None),
        }
    }

    pub fn checkbox(&self, key: &str) -> Result<bool, StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::Checkbox(b)) => Ok(*b),
            Some(_) => Err(self.schema_err(key, "is not a checkbox")),
            None => Ok(false),
        }
    }

    pub fn url(&self, key: &str) -> Result<Option<&str>, StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::Url(u)) => Ok(u.as_deref()),
            Some(_) => Err(self.schema_err(key, "is not a url")),
            None => Ok(None),
        }
    }

    pub fn select(&self, key: &str) -> Result<Option<&str>, StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::Select(s)) => Ok(s.as_deref()),
            Some(_) => Err(self.schema_err(key, "is not a select")),
            None => Ok(None),
        }
    }

    pub fn multi_select(&self, key: &str) -> Result<&[String], StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::MultiSelect(v)) => Ok(v.as_slice()),
            Some(_) => Err(self.schema_err(key, "is not a multi-select")),
            None => Ok(NO_IDS),
        }
    }

    pub fn date_start(&self, key: &str) -> Result<Option<NaiveDate>, StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::Date { start, .. }) => Ok(*start),
            Some(_) => Err(self.schema_err(key, "is not a date")),
            None => Ok(None),
        }
    }

    pub fn date_range(&self, key: &str) -> Result<Option<(NaiveDate, Option<NaiveDate>)>, StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::Date { start, end }) => Ok(start.map(|s| (s, *end))),
            Some(_) => Err(self.schema_err(key, "is not a date")),
            None => Ok(None),
        }
    }

    pub fn relation(&self, key: &str) -> Result<&[String], StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::Relation(ids)) => Ok(ids.as_slice()),
            Some(_) => Err(self.schema_err(key, "is not a relation")),
            None => Ok(NO_IDS),
        }
    }

    pub fn formula_number(&self, key: &str) -> Result<Option<Decimal>, StoreError> {
        match self.properties.get(key) {
            Some(PropertyValue::Formula(Some(FormulaValue::Number(n)))) => Ok(Some(*n)),
            Some(PropertyValue::Formula(None)) => Ok(None),
            Some(PropertyValue::Formula(Some(FormulaValue::Text(_)))) => {
                Err(self.schema_err(key, "is a text formula, expected number"))
            }
            Some(_) => Err(self.schema_err(key, "is not a formula")),
            None => Ok(None),
        }
    }
}
