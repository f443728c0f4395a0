// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{Expense, MonthKey, P_DATE};
use crate::store::{Filter, Icon, Page, Properties, PropertyValue, Store};

// Monthly-category database property names.
pub const P_TITLE: &str = "Name";
pub const P_MONTH: &str = "Month";
pub const P_MONTH_DATE: &str = "Date";
pub const P_TARGET: &str = "Target";
pub const P_AVERAGE: &str = "4 Months Average";
pub const P_EXPENSE_RELATION: &str = "Expenses";
pub const P_TOTAL: &str = "Total";
pub const P_MONTHLY_EXPENSES: &str = "Monthly Expenses";

/// Sub-category tags that take precedence over the main category when
/// grouping a month.
pub const RECOGNIZED_SUBS: [&str; 5] = [
    "Saving",
    "Insurance",
    "Subscriptions",
    "Credit Card",
    "Expenses",
];

/// The per-month summary page; its `Monthly Expenses` number is the sum of
/// the other categories' totals.
pub const SUMMARY_CATEGORY: &str = "Expenses";
const SUMMARY_ICON: &str = "💸";

/// Categories whose totals are not spending and stay out of the summary sum.
const SUMMARY_EXCLUDED: [&str; 3] = ["Income", "Saving", "Credit Card"];

#[derive(Debug, Clone, Serialize)]
pub struct MonthRow {
    pub category: String,
    pub expenses: usize,
    pub total: Option<Decimal>,
    pub target: Option<Decimal>,
    pub average: Option<Decimal>,
}

/// Maintains one page per (month, category) whose expense relation is the
/// exact set of that month's expenses, plus trailing four-month averages.
pub struct RollupEngine<'a, S: Store> {
    store: &'a S,
    cfg: &'a Config,
}

impl<'a, S: Store> RollupEngine<'a, S> {
    pub fn new(store: &'a S, cfg: &'a Config) -> RollupEngine<'a, S> {
        RollupEngine { store, cfg }
    }

    /// Recompute the month: ensure pages exist, replace every category's
    /// expense relation, refresh the summary sum. Returns the number of
    /// category pages updated.
    pub fn update_month(&self, month: MonthKey, expenses: &[Expense]) -> Result<usize> {
        let pages = self.ensure_month_pages(month)?;

        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for expense in expenses {
            if !month.contains(expense.txn_date) {
                continue;
            }
            let Some(id) = &expense.external_id else {
                warn!(name = %expense.name, "expense without page id skipped in rollup");
                continue;
            };
            if self.cfg.is_excluded(id) {
                continue;
            }
            groups
                .entry(normalize_category(target_category(expense)))
                .or_default()
                .push(id.clone());
        }

        let mut updated = 0;
        for page in &pages {
            let category = match page.title(P_TITLE) {
                Ok(t) => t.to_string(),
                Err(err) => {
                    warn!(%err, "skipping month page with unexpected shape");
                    continue;
                }
            };
            let ids = groups
                .remove(&normalize_category(&category))
                .unwrap_or_default();
            let mut props = Properties::new();
            // Full replacement: this also drops expenses deleted elsewhere.
            props.insert(
                P_EXPENSE_RELATION.to_string(),
                PropertyValue::Relation(ids),
            );
            self.store
                .update_page(&page.id, props)
                .with_context(|| format!("Replace expense relation for '{}'", category))?;
            updated += 1;
        }
        for category in groups.keys() {
            warn!(%category, month = %month, "expenses grouped under a category with no month page");
        }

        self.update_summary(month)?;
        info!(month = %month, categories = updated, "month rollup complete");
        Ok(updated)
    }

    /// Sum the freshly computed totals and store them on the summary page.
    /// Runs after relation replacement so the store-side formulas are current.
    fn update_summary(&self, month: MonthKey) -> Result<()> {
        let pages = self.month_pages(month)?;
        let mut sum = Decimal::ZERO;
        let mut summary_page: Option<&Page> = None;
        for page in &pages {
            let Ok(category) = page.title(P_TITLE) else {
                continue;
            };
            if is_category(category, SUMMARY_CATEGORY) {
                summary_page = Some(page);
                continue;
            }
            if SUMMARY_EXCLUDED.iter().any(|c| is_category(category, c)) {
                continue;
            }
            if let Ok(Some(total)) = page.formula_number(P_TOTAL) {
                sum += total;
            }
        }
        let Some(summary) = summary_page else {
            warn!(month = %month, "no summary page found for month");
            return Ok(());
        };
        let mut props = Properties::new();
        props.insert(
            P_MONTHLY_EXPENSES.to_string(),
            PropertyValue::Number(Some(sum)),
        );
        self.store
            .update_page(&summary.id, props)
            .context("Update monthly expenses summary")?;
        Ok(())
    }

    /// Create the full per-category page set for a month. An existing month
    /// is returned as-is, never re-created.
    pub fn ensure_month_pages(&self, month: MonthKey) -> Result<Vec<Page>> {
        let existing = self.month_pages(month)?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let previous: HashMap<String, Page> = self
            .month_pages(month.prev())?
            .into_iter()
            .filter_map(|p| {
                p.title(P_TITLE)
                    .ok()
                    .map(|t| (normalize_category(t), p.clone()))
            })
            .collect();

        let mut created = Vec::new();
        for (name, icon) in self.configured_categories() {
            // Budgets are user-authored; carry them across the month boundary.
            let target = previous
                .get(&normalize_category(&name))
                .and_then(|p| p.number(P_TARGET).ok().flatten());
            let average = self.trailing_average(month, &name)?;

            let mut props = Properties::new();
            props.insert(P_TITLE.to_string(), PropertyValue::Title(name.clone()));
            props.insert(P_MONTH.to_string(), PropertyValue::RichText(month.key()));
            props.insert(
                P_MONTH_DATE.to_string(),
                PropertyValue::Date {
                    start: Some(month.first_day()),
                    end: Some(month.last_day()),
                },
            );
            props.insert(P_TARGET.to_string(), PropertyValue::Number(target));
            props.insert(P_AVERAGE.to_string(), PropertyValue::Number(average));
            let page = self
                .store
                .create_page(
                    &self.cfg.monthly_category_db_id,
                    props,
                    icon.as_deref().map(parse_icon),
                )
                .with_context(|| format!("Create month page '{}' for {}", name, month))?;
            created.push(page);
        }
        info!(month = %month, pages = created.len(), "created month pages");
        Ok(created)
    }

    /// Re-run the month procedure for the last `months` months, oldest
    /// first, then compute averages in a second pass. Two passes because each
    /// month's average depends on totals finalized in the first.
    pub fn backfill(&self, months: u32, today: NaiveDate) -> Result<()> {
        let current = MonthKey::from_date(today);
        let keys: Vec<MonthKey> = (0..months).rev().map(|i| current.back(i)).collect();
        for month in &keys {
            let expenses = self.fetch_month_expenses(*month)?;
            self.update_month(*month, &expenses)?;
        }
        for month in &keys {
            self.update_averages(*month)?;
        }
        Ok(())
    }

    /// Arithmetic mean of the four calendar months ending at M-1, strictly
    /// excluding M itself. Missing months are skipped, not zeroed.
    pub fn trailing_average(&self, month: MonthKey, category: &str) -> Result<Option<Decimal>> {
        let end = month.prev().last_day();
        let start = month.back(self.cfg.average_window_months).first_day();
        let pages = self
            .store
            .query(
                &self.cfg.monthly_category_db_id,
                &Filter::And(vec![
                    Filter::TitleEquals {
                        property: P_TITLE.to_string(),
                        value: category.to_string(),
                    },
                    Filter::DateBetween {
                        property: P_MONTH_DATE.to_string(),
                        start,
                        end,
                    },
                ]),
                None,
            )
            .with_context(|| format!("Fetch history for '{}'", category))?;

        let mut totals: Vec<Decimal> = Vec::new();
        for page in &pages {
            let total = if is_category(category, SUMMARY_CATEGORY) {
                page.number(P_MONTHLY_EXPENSES).ok().flatten()
            } else {
                page.formula_number(P_TOTAL).ok().flatten()
            };
            if let Some(total) = total {
                totals.push(total);
            }
        }
        if totals.is_empty() {
            return Ok(None);
        }
        let sum: Decimal = totals.iter().sum();
        Ok(Some((sum / Decimal::from(totals.len())).round_dp(2)))
    }

    /// Recompute and store the trailing average on every page of the month.
    /// Returns how many pages received a value.
    pub fn update_averages(&self, month: MonthKey) -> Result<usize> {
        let mut updated = 0;
        for page in self.month_pages(month)? {
            let Ok(category) = page.title(P_TITLE) else {
                continue;
            };
            let Some(average) = self.trailing_average(month, category)? else {
                continue;
            };
            let mut props = Properties::new();
            props.insert(
                P_AVERAGE.to_string(),
                PropertyValue::Number(Some(average)),
            );
            self.store
                .update_page(&page.id, props)
                .with_context(|| format!("Update average for '{}'", category))?;
            updated += 1;
        }
        info!(month = %month, pages = updated, "averages updated");
        Ok(updated)
    }

    /// True when any page of the month still lacks a trailing average.
    pub fn needs_average_update(&self, month: MonthKey) -> Result<bool> {
        for page in self.month_pages(month)? {
            if page.number(P_AVERAGE).ok().flatten().is_none() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Expenses whose transaction date falls inside the month, read back
    /// from the store. Pages with unexpected shapes are skipped.
    pub fn fetch_month_expenses(&self, month: MonthKey) -> Result<Vec<Expense>> {
        let pages = self
            .store
            .query(
                &self.cfg.expense_db_id,
                &Filter::DateBetween {
                    property: P_DATE.to_string(),
                    start: month.first_day(),
                    end: month.last_day(),
                },
                None,
            )
            .with_context(|| format!("Fetch expenses for {}", month))?;
        let mut expenses = Vec::with_capacity(pages.len());
        for page in &pages {
            match Expense::from_page(page) {
                Ok(expense) => expenses.push(expense),
                Err(err) => warn!(%err, "skipping expense page with unexpected shape"),
            }
        }
        Ok(expenses)
    }

    /// Per-category snapshot of a month for reporting.
    pub fn month_report(&self, month: MonthKey) -> Result<Vec<MonthRow>> {
        let mut rows = Vec::new();
        for page in self.month_pages(month)? {
            let Ok(category) = page.title(P_TITLE) else {
                continue;
            };
            let total = if is_category(category, SUMMARY_CATEGORY) {
                page.number(P_MONTHLY_EXPENSES).ok().flatten()
            } else {
                page.formula_number(P_TOTAL).ok().flatten()
            };
            rows.push(MonthRow {
                category: category.to_string(),
                expenses: page.relation(P_EXPENSE_RELATION).map(|r| r.len()).unwrap_or(0),
                total,
                target: page.number(P_TARGET).ok().flatten(),
                average: page.number(P_AVERAGE).ok().flatten(),
            });
        }
        Ok(rows)
    }

    fn month_pages(&self, month: MonthKey) -> Result<Vec<Page>> {
        self.store
            .query(
                &self.cfg.monthly_category_db_id,
                &Filter::RichTextEquals {
                    property: P_MONTH.to_string(),
                    value: month.key(),
                },
                None,
            )
            .with_context(|| format!("Fetch month pages for {}", month))
    }

    /// Main categories, refinement tags, and the summary page, with icons.
    fn configured_categories(&self) -> Vec<(String, Option<String>)> {
        let mut out: Vec<(String, Option<String>)> = self
            .cfg
            .categories
            .iter()
            .chain(self.cfg.sub_categories.iter())
            .map(|c| (c.name.clone(), c.icon.clone()))
            .collect();
        if !out
            .iter()
            .any(|(name, _)| is_category(name, SUMMARY_CATEGORY))
        {
            out.push((
                SUMMARY_CATEGORY.to_string(),
                Some(SUMMARY_ICON.to_string()),
            ));
        }
        out
    }
}

/// The bucket a month groups an expense under: the sub-category when it is a
/// recognized refinement tag, the main category otherwise.
pub fn target_category(expense: &Expense) -> &str {
    if let Some(sub) = &expense.sub_category {
        if RECOGNIZED_SUBS.iter().any(|s| is_category(sub, s)) {
            return sub;
        }
    }
    &expense.category
}

/// Emoji-stripped, case-insensitive category comparison key.
pub fn normalize_category(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_lowercase()
}

fn is_category(a: &str, b: &str) -> bool {
    normalize_category(a) == normalize_category(b)
}

fn parse_icon(icon: &str) -> Icon {
    if icon.starts_with("http://") || icon.starts_with("https://") {
        Icon::External(icon.to_string())
    } else {
        Icon::Emoji(icon.to_string())
    }
}
