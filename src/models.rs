// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::installment::parse_installment;
use crate::resolver::Resolver;
use crate::scraper::ScrapedTransaction;
use crate::store::{Page, Properties, PropertyValue, StoreError};

// Expense database property names. These are the format-stable surface the
// Notion workspace must expose.
pub const P_NAME: &str = "Name";
pub const P_ORIGINAL_NAME: &str = "Original Name";
pub const P_DATE: &str = "Date";
pub const P_PROCESSED_DATE: &str = "Processed Date";
pub const P_ORIGINAL_AMOUNT: &str = "Original Amount";
pub const P_ORIGINAL_CURRENCY: &str = "Original Currency";
pub const P_CHARGED_AMOUNT: &str = "Charged Amount";
pub const P_CHARGED_CURRENCY: &str = "Charged Currency";
pub const P_MEMO: &str = "Memo";
pub const P_CATEGORY: &str = "Category";
pub const P_SUB_CATEGORY: &str = "Sub Category";
pub const P_REMAINING_AMOUNT: &str = "Remaining Amount";
pub const P_STATUS: &str = "Status";
pub const P_PERSON_CARD: &str = "Person Card";
pub const P_TYPE: &str = "Type";
pub const P_ACCOUNT: &str = "Account";

#[derive(Debug, Error)]
pub enum RecordError {
    /// Programmer error: the constructed record violates a model invariant.
    /// Aborts the current record only.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    Ils,
    Usd,
    Eur,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Ils => "ILS",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Ils => "₪",
            Currency::Usd => "$",
            Currency::Eur => "€",
        }
    }

    /// Legacy symbol-suffixed form ("ILS ₪"), produced only at the Notion
    /// boundary.
    pub fn suffixed(&self) -> String {
        format!("{} {}", self.code(), self.symbol())
    }

    /// Lenient parse: code, symbol, suffixed form, and common aliases.
    pub fn parse(s: &str) -> Option<Currency> {
        let t = s.trim().to_uppercase();
        if t.is_empty() {
            return None;
        }
        if t.contains("ILS") || t.contains("NIS") || t.contains('₪') {
            return Some(Currency::Ils);
        }
        if t.contains("USD") || t.contains('$') {
            return Some(Currency::Usd);
        }
        if t.contains("EUR") || t.contains('€') {
            return Some(Currency::Eur);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseKind {
    Normal,
    /// Installment purchase; the only kind that may carry a remaining balance.
    Credit,
}

impl ExpenseKind {
    pub fn parse(s: &str) -> ExpenseKind {
        match s.trim().to_lowercase().as_str() {
            "installments" | "credit" => ExpenseKind::Credit,
            _ => ExpenseKind::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseKind::Normal => "Normal",
            ExpenseKind::Credit => "Credit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseStatus {
    Pending,
    Completed,
}

impl ExpenseStatus {
    pub fn parse(s: &str) -> ExpenseStatus {
        if s.trim().eq_ignore_ascii_case("completed") {
            ExpenseStatus::Completed
        } else {
            ExpenseStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "Pending",
            ExpenseStatus::Completed => "Completed",
        }
    }
}

/// One calendar month, the grouping key of the rollup engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> MonthKey {
        MonthKey { year, month }
    }

    pub fn from_date(date: NaiveDate) -> MonthKey {
        MonthKey {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The `MM/YY` key stored on month pages.
    pub fn key(&self) -> String {
        format!("{:02}/{:02}", self.month, self.year.rem_euclid(100))
    }

    pub fn prev(&self) -> MonthKey {
        if self.month == 1 {
            MonthKey::new(self.year - 1, 12)
        } else {
            MonthKey::new(self.year, self.month - 1)
        }
    }

    pub fn next(&self) -> MonthKey {
        if self.month == 12 {
            MonthKey::new(self.year + 1, 1)
        } else {
            MonthKey::new(self.year, self.month + 1)
        }
    }

    pub fn back(&self, months: u32) -> MonthKey {
        let mut key = *self;
        for _ in 0..months {
            key = key.prev();
        }
        key
    }

    pub fn first_day(&self) -> NaiveDate {
        // Valid by construction for months 1..=12.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap()
    }

    pub fn last_day(&self) -> NaiveDate {
        let last = match self.month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ => {
                if NaiveDate::from_ymd_opt(self.year, 2, 29).is_some() {
                    29
                } else {
                    28
                }
            }
        };
        NaiveDate::from_ymd_opt(self.year, self.month, last).unwrap()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One ingested transaction. Immutable after construction; the engine never
/// mutates an expense in place once it lives in Notion.
#[derive(Debug, Clone, Serialize)]
pub struct Expense {
    pub kind: ExpenseKind,
    pub txn_date: NaiveDate,
    pub processed_date: NaiveDate,
    pub original_amount: Decimal,
    pub original_currency: Currency,
    pub charged_amount: Decimal,
    pub charged_currency: Currency,
    pub original_name: String,
    pub name: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub memo: String,
    pub remaining_amount: Decimal,
    pub status: ExpenseStatus,
    pub account_id: String,
    pub person_card: String,
    pub external_id: Option<String>,
}

impl Expense {
    /// Build a record from a scraped transaction: resolver, installment
    /// parser, then the month-end date adjustment for configured names.
    pub fn from_scraped(
        raw: &ScrapedTransaction,
        cfg: &Config,
        resolver: &Resolver,
    ) -> Result<Expense, RecordError> {
        let resolved = resolver.resolve(&raw.description, &raw.category, raw.charged_amount);
        let kind = ExpenseKind::parse(&raw.txn_type);

        let charged_currency = Currency::parse(&raw.charged_currency).unwrap_or_else(|| {
            warn!(currency = %raw.charged_currency, name = %raw.description,
                "unknown charged currency, falling back to default");
            cfg.default_currency()
        });
        let original_currency = Currency::parse(&raw.original_currency).unwrap_or_else(|| {
            warn!(currency = %raw.original_currency, name = %raw.description,
                "unknown original currency, falling back to default");
            cfg.default_currency()
        });

        let mut memo = raw.memo.trim().to_string();
        let mut remaining_amount = Decimal::ZERO;
        if let Some(inst) =
            parse_installment(&raw.memo, raw.charged_amount.abs(), charged_currency, kind)
        {
            memo = inst.memo;
            remaining_amount = inst.remaining;
        }

        let adjust = cfg
            .date_adjustment_names
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&resolved.name));
        let txn_date = if adjust { roll_month_end(raw.date) } else { raw.date };
        let processed_date = if adjust {
            roll_month_end(raw.processed_date)
        } else {
            raw.processed_date
        };

        let person_card = cfg
            .cards
            .get(&raw.account_number)
            .cloned()
            .unwrap_or_else(|| raw.account_number.clone());

        let expense = Expense {
            kind,
            txn_date,
            processed_date,
            original_amount: raw.original_amount.abs(),
            original_currency,
            charged_amount: raw.charged_amount.abs(),
            charged_currency,
            original_name: raw.description.clone(),
            name: resolved.name,
            category: resolved.category,
            sub_category: resolved.sub_category,
            memo,
            remaining_amount,
            status: ExpenseStatus::parse(&raw.status),
            account_id: raw.account_number.clone(),
            person_card,
            external_id: None,
        };
        expense.check_invariants()?;
        Ok(expense)
    }

    fn check_invariants(&self) -> Result<(), RecordError> {
        if self.original_amount < Decimal::ZERO || self.charged_amount < Decimal::ZERO {
            return Err(RecordError::Invariant(format!(
                "negative amount on '{}'",
                self.name
            )));
        }
        if self.remaining_amount < Decimal::ZERO {
            return Err(RecordError::Invariant(format!(
                "negative remaining amount on '{}'",
                self.name
            )));
        }
        if self.remaining_amount > Decimal::ZERO && self.kind != ExpenseKind::Credit {
            return Err(RecordError::Invariant(format!(
                "remaining amount on non-credit expense '{}'",
                self.name
            )));
        }
        Ok(())
    }

    /// Identity fingerprint: stable across re-scrapes and deliberately blind
    /// to name, category, and memo so re-categorization never duplicates.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.txn_date.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(format!("{:.2}", self.original_amount).as_bytes());
        hasher.update(b"|");
        hasher.update(format!("{:.2}", self.charged_amount).as_bytes());
        hasher.update(b"|");
        hasher.update(self.person_card.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn same_txn(&self, other: &Expense) -> bool {
        self.fingerprint() == other.fingerprint()
    }

    /// Flat property map consumed by the Notion store.
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(P_NAME.into(), PropertyValue::Title(self.name.clone()));
        props.insert(
            P_ORIGINAL_NAME.into(),
            PropertyValue::RichText(self.original_name.clone()),
        );
        props.insert(
            P_DATE.into(),
            PropertyValue::Date {
                start: Some(self.txn_date),
                end: None,
            },
        );
        props.insert(
            P_PROCESSED_DATE.into(),
            PropertyValue::Date {
                start: Some(self.processed_date),
                end: None,
            },
        );
        props.insert(
            P_ORIGINAL_AMOUNT.into(),
            PropertyValue::Number(Some(self.original_amount)),
        );
        props.insert(
            P_ORIGINAL_CURRENCY.into(),
            PropertyValue::Select(Some(self.original_currency.suffixed())),
        );
        props.insert(
            P_CHARGED_AMOUNT.into(),
            PropertyValue::Number(Some(self.charged_amount)),
        );
        props.insert(
            P_CHARGED_CURRENCY.into(),
            PropertyValue::Select(Some(self.charged_currency.suffixed())),
        );
        props.insert(P_MEMO.into(), PropertyValue::RichText(self.memo.clone()));
        props.insert(
            P_CATEGORY.into(),
            PropertyValue::Select(Some(self.category.clone())),
        );
        props.insert(
            P_SUB_CATEGORY.into(),
            PropertyValue::Select(self.sub_category.clone()),
        );
        props.insert(
            P_REMAINING_AMOUNT.into(),
            PropertyValue::Number(Some(self.remaining_amount)),
        );
        props.insert(
            P_STATUS.into(),
            PropertyValue::Select(Some(self.status.as_str().to_string())),
        );
        props.insert(
            P_PERSON_CARD.into(),
            PropertyValue::Select(Some(self.person_card.clone())),
        );
        props.insert(
            P_TYPE.into(),
            PropertyValue::Select(Some(self.kind.as_str().to_string())),
        );
        props.insert(
            P_ACCOUNT.into(),
            PropertyValue::RichText(self.account_id.clone()),
        );
        props
    }

    /// Read a record back from its Notion page through the typed accessors.
    pub fn from_page(page: &Page) -> Result<Expense, StoreError> {
        let missing = |property: &str| StoreError::Schema {
            page: page.id.clone(),
            property: property.to_string(),
            problem: "is empty".to_string(),
        };

        let txn_date = page.date_start(P_DATE)?.ok_or_else(|| missing(P_DATE))?;
        let processed_date = page
            .date_start(P_PROCESSED_DATE)?
            .ok_or_else(|| missing(P_PROCESSED_DATE))?;
        let charged_amount = page
            .number(P_CHARGED_AMOUNT)?
            .ok_or_else(|| missing(P_CHARGED_AMOUNT))?;
        let original_amount = page.number(P_ORIGINAL_AMOUNT)?.unwrap_or(charged_amount);

        let charged_currency = page
            .select(P_CHARGED_CURRENCY)?
            .and_then(Currency::parse)
            .unwrap_or(Currency::Ils);
        let original_currency = page
            .select(P_ORIGINAL_CURRENCY)?
            .and_then(Currency::parse)
            .unwrap_or(charged_currency);

        Ok(Expense {
            kind: page
                .select(P_TYPE)?
                .map(ExpenseKind::parse)
                .unwrap_or(ExpenseKind::Normal),
            txn_date,
            processed_date,
            original_amount,
            original_currency,
            charged_amount,
            charged_currency,
            original_name: page.rich_text(P_ORIGINAL_NAME)?.to_string(),
            name: page.title(P_NAME)?.to_string(),
            category: page.select(P_CATEGORY)?.unwrap_or_default().to_string(),
            sub_category: page.select(P_SUB_CATEGORY)?.map(|s| s.to_string()),
            memo: page.rich_text(P_MEMO)?.to_string(),
            remaining_amount: page.number(P_REMAINING_AMOUNT)?.unwrap_or(Decimal::ZERO),
            status: page
                .select(P_STATUS)?
                .map(ExpenseStatus::parse)
                .unwrap_or(ExpenseStatus::Pending),
            account_id: page.rich_text(P_ACCOUNT)?.to_string(),
            person_card: page.select(P_PERSON_CARD)?.unwrap_or_default().to_string(),
            external_id: Some(page.id.clone()),
        })
    }
}

/// Salary-like names dated on the last 1-3 days of a month belong to the
/// next month; roll them forward to its first day.
fn roll_month_end(date: NaiveDate) -> NaiveDate {
    let month = MonthKey::from_date(date);
    if date.day() >= month.last_day().day() - 2 {
        month.next().first_day()
    } else {
        date
    }
}
