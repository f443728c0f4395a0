// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{Expense, MonthKey, P_PROCESSED_DATE};
use crate::resolver::Resolver;
use crate::rollup::RollupEngine;
use crate::scraper::{Orchestrator, ScrapeReport, ScrapeStatus, ScrapedTransaction, load_output};
use crate::store::{Filter, Store};

/// Run counts surfaced in the final status log line and the CLI summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub scraped: usize,
    pub added: usize,
    pub skipped_existing: usize,
    pub categories_updated: usize,
    pub months_averaged: usize,
    pub failed_accounts: Vec<String>,
}

/// Loads scraper output, builds expense records, and writes only the missing
/// ones to the Notion expense database.
pub struct SyncService<'a, S: Store> {
    store: &'a S,
    cfg: &'a Config,
    resolver: &'a Resolver,
}

impl<'a, S: Store> SyncService<'a, S> {
    pub fn new(store: &'a S, cfg: &'a Config, resolver: &'a Resolver) -> SyncService<'a, S> {
        SyncService {
            store,
            cfg,
            resolver,
        }
    }

    /// Top-level entry point: scrape, ingest, roll up the current month.
    /// Safe to invoke arbitrarily often; fingerprinting guarantees
    /// idempotence.
    pub fn add_all(&self, today: NaiveDate, check_before_adding: bool) -> Result<SyncSummary> {
        let report = Orchestrator::new(&self.cfg.scraper).run(today);
        self.add_from_report(&report, today, check_before_adding)
    }

    /// Ingestion half of `add_all`, split out so callers with an existing
    /// scrape report (or none at all) can drive it directly.
    pub fn add_from_report(
        &self,
        report: &ScrapeReport,
        today: NaiveDate,
        check_before_adding: bool,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary {
            failed_accounts: report
                .failed_accounts
                .iter()
                .map(|f| f.account_id.clone())
                .collect(),
            ..SyncSummary::default()
        };

        match report.status {
            ScrapeStatus::Fatal => {
                // Leave existing data untouched; the next run picks it up.
                error!("scraper produced no usable output, skipping ingestion");
                return Ok(summary);
            }
            ScrapeStatus::Partial => {
                warn!(
                    accounts = ?summary.failed_accounts,
                    "ingesting partial scrape, failed accounts will be picked up next run"
                );
            }
            ScrapeStatus::Full => {}
        }

        let scraped = load_output(&self.cfg.scraper.output_path)?;
        summary.scraped = scraped.len();
        let built = self.build_records(&scraped);

        let existing = if check_before_adding {
            self.fetch_existing(today)?
        } else {
            Vec::new()
        };

        let mut known: Vec<Expense> = existing;
        let mut seen: HashSet<String> = known.iter().map(|e| e.fingerprint()).collect();
        for expense in built {
            if seen.contains(&expense.fingerprint()) {
                summary.skipped_existing += 1;
                continue;
            }
            match self.create(expense) {
                Ok(created) => {
                    info!(name = %created.name, date = %created.txn_date,
                        amount = %created.charged_amount, "added expense");
                    seen.insert(created.fingerprint());
                    known.push(created);
                    summary.added += 1;
                }
                Err(err) => {
                    // A single failed write aborts only this record.
                    error!(%err, "failed to create expense page");
                }
            }
        }

        let month = MonthKey::from_date(today);
        let engine = RollupEngine::new(self.store, self.cfg);
        // The rollup replaces relations wholesale, so its input must be the
        // month's complete expense set. Without the dedup fetch the in-memory
        // set only holds this run's records; re-read the month from the store.
        let month_expenses: Vec<Expense> = if check_before_adding {
            known
                .iter()
                .filter(|e| month.contains(e.txn_date))
                .cloned()
                .collect()
        } else {
            engine.fetch_month_expenses(month)?
        };
        summary.categories_updated = engine.update_month(month, &month_expenses)?;
        if engine.needs_average_update(month)? {
            summary.months_averaged = engine.update_averages(month)?;
        }

        info!(
            added = summary.added,
            skipped = summary.skipped_existing,
            categories = summary.categories_updated,
            averaged = summary.months_averaged,
            failed_accounts = summary.failed_accounts.len(),
            "sync finished"
        );
        Ok(summary)
    }

    /// Instantiate expense records from raw scraper rows, newest first.
    /// Individual bad rows are logged and skipped.
    pub fn build_records(&self, scraped: &[ScrapedTransaction]) -> Vec<Expense> {
        let mut records: Vec<Expense> = Vec::with_capacity(scraped.len());
        for raw in scraped {
            match Expense::from_scraped(raw, self.cfg, self.resolver) {
                Ok(expense) => records.push(expense),
                Err(err) => {
                    error!(%err, description = %raw.description, "skipping malformed record");
                }
            }
        }
        // Newest first, purely for log readability.
        records.sort_by(|a, b| b.txn_date.cmp(&a.txn_date));
        records
    }

    /// Expense records already in Notion for the trailing dedup window.
    pub fn fetch_existing(&self, today: NaiveDate) -> Result<Vec<Expense>> {
        let window_start = MonthKey::from_date(today)
            .back(self.cfg.trailing_window_months.saturating_sub(1))
            .first_day();
        let pages = self
            .store
            .query(
                &self.cfg.expense_db_id,
                &Filter::DateOnOrAfter {
                    property: P_PROCESSED_DATE.to_string(),
                    date: window_start,
                },
                None,
            )
            .context("Fetch existing expenses")?;
        let mut expenses = Vec::with_capacity(pages.len());
        for page in &pages {
            match Expense::from_page(page) {
                Ok(expense) => expenses.push(expense),
                Err(err) => {
                    // Skip the offending page, keep the run going.
                    error!(%err, "skipping expense page with unexpected shape");
                }
            }
        }
        Ok(expenses)
    }

    fn create(&self, expense: Expense) -> Result<Expense> {
        let page = self
            .store
            .create_page(&self.cfg.expense_db_id, expense.to_properties(), None)
            .with_context(|| format!("Create expense page for '{}'", expense.name))?;
        Ok(Expense {
            external_id: Some(page.id),
            ..expense
        })
    }

    /// Group every Notion expense by fingerprint, keep the most recently
    /// edited page per group, archive the rest.
    pub fn remove_duplicates(&self) -> Result<usize> {
        let pages = self
            .store
            .query(&self.cfg.expense_db_id, &Filter::All, None)
            .context("Fetch all expenses for dedup")?;

        let mut groups: HashMap<String, Vec<(String, chrono::DateTime<chrono::Utc>)>> =
            HashMap::new();
        for page in &pages {
            match Expense::from_page(page) {
                Ok(expense) => {
                    groups
                        .entry(expense.fingerprint())
                        .or_default()
                        .push((page.id.clone(), page.last_edited));
                }
                Err(err) => {
                    error!(%err, "skipping expense page with unexpected shape");
                }
            }
        }

        let mut removed = 0;
        for (fingerprint, mut members) in groups {
            if members.len() < 2 {
                continue;
            }
            members.sort_by(|a, b| b.1.cmp(&a.1));
            for (page_id, _) in &members[1..] {
                match self.store.archive_page(page_id) {
                    Ok(()) => {
                        info!(page = %page_id, %fingerprint, "archived duplicate expense");
                        removed += 1;
                    }
                    Err(err) => {
                        error!(%err, page = %page_id, "failed to archive duplicate");
                    }
                }
            }
        }
        Ok(removed)
    }
}
