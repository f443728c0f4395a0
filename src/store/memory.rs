// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use super::{Filter, FormulaValue, Icon, Page, Properties, PropertyValue, Sort, Store, StoreError};

/// Emulation of Notion's rollup formula column: when pages of `database_id`
/// are read, `formula_property` is computed as the sum of
/// `source_number_property` over the pages of `source_database_id` referenced
/// by `relation_property`.
#[derive(Debug, Clone)]
pub struct RelationSum {
    pub database_id: String,
    pub formula_property: String,
    pub relation_property: String,
    pub source_database_id: String,
    pub source_number_property: String,
}

struct Inner {
    databases: HashMap<String, Vec<Page>>,
    archived: Vec<Page>,
    next_id: u64,
    clock: i64,
}

/// In-memory `Store` used by the test suite and `--dry-run` style checks.
/// Last-edited stamps increase monotonically so "most recently edited" is
/// deterministic.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    relation_sum: Option<RelationSum>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Mutex::new(Inner {
                databases: HashMap::new(),
                archived: Vec::new(),
                next_id: 1,
                clock: 0,
            }),
            relation_sum: None,
        }
    }

    pub fn with_relation_sum(sum: RelationSum) -> Self {
        let mut store = Self::new();
        store.relation_sum = Some(sum);
        store
    }

    pub fn page_count(&self, database_id: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .databases
            .get(database_id)
            .map(|pages| pages.len())
            .unwrap_or(0)
    }

    pub fn archived_count(&self) -> usize {
        self.inner.lock().unwrap().archived.len()
    }

    fn compute_formulas(&self, database_id: &str, pages: &mut [Page], inner: &Inner) {
        let Some(sum) = &self.relation_sum else {
            return;
        };
        if sum.database_id != database_id {
            return;
        }
        let sources = inner
            .databases
            .get(&sum.source_database_id)
            .cloned()
            .unwrap_or_default();
        for page in pages.iter_mut() {
            let ids = page
                .relation(&sum.relation_property)
                .unwrap_or(&[])
                .to_vec();
            let mut total = Decimal::ZERO;
            for source in sources.iter().filter(|p| ids.contains(&p.id)) {
                if let Ok(Some(n)) = source.number(&sum.source_number_property) {
                    total += n;
                }
            }
            page.properties.insert(
                sum.formula_property.clone(),
                PropertyValue::Formula(Some(FormulaValue::Number(total))),
            );
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn query(
        &self,
        database_id: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Page>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut pages: Vec<Page> = inner
            .databases
            .get(database_id)
            .cloned()
            .unwrap_or_default();
        self.compute_formulas(database_id, &mut pages, &inner);
        pages.retain(|p| filter.matches(p));
        if let Some(sort) = sort {
            pages.sort_by(|a, b| {
                let ka = a.date_start(&sort.property).ok().flatten();
                let kb = b.date_start(&sort.property).ok().flatten();
                let ord = ka.cmp(&kb);
                if sort.descending { ord.reverse() } else { ord }
            });
        }
        Ok(pages)
    }

    fn create_page(
        &self,
        database_id: &str,
        properties: Properties,
        icon: Option<Icon>,
    ) -> Result<Page, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = format!("page-{:04}", inner.next_id);
        inner.next_id += 1;
        inner.clock += 1;
        let stamp = Utc.timestamp_opt(inner.clock, 0).unwrap();
        let page = Page {
            id,
            last_edited: stamp,
            icon,
            properties,
        };
        inner
            .databases
            .entry(database_id.to_string())
            .or_default()
            .push(page.clone());
        Ok(page)
    }

    fn update_page(&self, page_id: &str, properties: Properties) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let stamp = Utc.timestamp_opt(inner.clock, 0).unwrap();
        let page = inner
            .databases
            .values_mut()
            .flat_map(|pages| pages.iter_mut())
            .find(|p| p.id == page_id);
        let Some(page) = page else {
            return Err(StoreError::Request(format!("no such page '{}'", page_id)));
        };
        for (key, value) in properties {
            page.properties.insert(key, value);
        }
        page.last_edited = stamp;
        Ok(())
    }

    fn archive_page(&self, page_id: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        for pages in inner.databases.values_mut() {
            if let Some(pos) = pages.iter().position(|p| p.id == page_id) {
                let page = pages.remove(pos);
                inner.archived.push(page);
                return Ok(());
            }
        }
        Err(StoreError::Request(format!("no such page '{}'", page_id)))
    }
}
