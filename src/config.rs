// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::Currency;

static APP: Lazy<(&str, &str, &str)> = Lazy::new(|| ("com.expenser", "Expenser", "expenser"));

const DEFAULT_BOILERPLATE: &[&str] = &["ltd", "llc", "inc", "בע\"מ", "בעמ"];

/// Amount gate on a name rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountOp {
    Exact,
    Approx { percent: Decimal },
    Above,
    Below,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameRule {
    /// Pattern that must appear in the raw vendor string.
    pub substring: String,
    #[serde(default)]
    pub expected_amount: Option<Decimal>,
    #[serde(default)]
    pub amount_op: Option<AmountOp>,
    /// Name of a resolver extension registered at startup.
    #[serde(default)]
    pub hook: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameDef {
    pub canonical: String,
    #[serde(default)]
    pub rules: Vec<NameRule>,
    /// Optional category override; keyword resolution applies otherwise.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDef {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// One-character emoji or an external URL.
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditCardDef {
    pub label: String,
    #[serde(default)]
    pub substrings: Vec<String>,
    #[serde(default)]
    pub min_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyDef {
    pub code: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperSettings {
    /// Path of the out-of-process scraper binary.
    pub runner: PathBuf,
    /// Where the scraper writes its JSON transaction file.
    pub output_path: PathBuf,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
    #[serde(default = "default_true")]
    pub skip_if_fresh_today: bool,
    #[serde(default = "default_backoff_s")]
    pub backoff_base_s: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub expense_db_id: String,
    pub monthly_category_db_id: String,
    pub scraper: ScraperSettings,
    #[serde(default)]
    pub notion_token: Option<String>,
    #[serde(default = "default_window")]
    pub trailing_window_months: u32,
    #[serde(default = "default_window")]
    pub average_window_months: u32,
    /// Expense page IDs that never contribute to totals or averages.
    #[serde(default)]
    pub exclusion_ids: Vec<String>,
    /// Canonical names whose month-end dates roll to the next month.
    #[serde(default)]
    pub date_adjustment_names: Vec<String>,
    #[serde(default = "default_category")]
    pub default_category: String,
    #[serde(default = "default_currencies")]
    pub currencies: Vec<CurrencyDef>,
    /// account_id to human-readable card label.
    #[serde(default)]
    pub cards: BTreeMap<String, String>,
    #[serde(default)]
    pub names: Vec<NameDef>,
    pub categories: Vec<CategoryDef>,
    #[serde(default)]
    pub sub_categories: Vec<CategoryDef>,
    #[serde(default)]
    pub credit_cards: Vec<CreditCardDef>,
    #[serde(default)]
    pub boilerplate: Vec<String>,
}

fn default_retries() -> u32 {
    3
}
fn default_timeout_s() -> u64 {
    300
}
fn default_backoff_s() -> u64 {
    5
}
fn default_true() -> bool {
    true
}
fn default_window() -> u32 {
    4
}
fn default_category() -> String {
    "Other".to_string()
}
fn default_currencies() -> Vec<CurrencyDef> {
    [Currency::Ils, Currency::Usd, Currency::Eur]
        .iter()
        .map(|c| CurrencyDef {
            code: c.code().to_string(),
            symbol: c.symbol().to_string(),
        })
        .collect()
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
            .context("Could not determine platform-specific config dir")?;
        let config_dir = proj.config_dir();
        fs::create_dir_all(config_dir).context("Failed to create config dir")?;
        Ok(config_dir.join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Open config at {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&text)
            .with_context(|| format!("Parse config at {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.expense_db_id.trim().is_empty() {
            return Err(anyhow!("expense_db_id must not be empty"));
        }
        if self.monthly_category_db_id.trim().is_empty() {
            return Err(anyhow!("monthly_category_db_id must not be empty"));
        }
        if self.scraper.retries == 0 {
            return Err(anyhow!("scraper.retries must be at least 1"));
        }
        if self.scraper.timeout_s == 0 {
            return Err(anyhow!("scraper.timeout_s must be positive"));
        }
        if self.trailing_window_months == 0 || self.average_window_months == 0 {
            return Err(anyhow!("window sizes must be positive"));
        }
        if self.currencies.is_empty() {
            return Err(anyhow!("at least one currency must be configured"));
        }
        for def in &self.currencies {
            if Currency::parse(&def.code).is_none() {
                return Err(anyhow!("unrecognized currency code '{}'", def.code));
            }
        }
        if self.categories.is_empty() {
            return Err(anyhow!("at least one category must be configured"));
        }
        let known: Vec<&str> = self
            .categories
            .iter()
            .chain(self.sub_categories.iter())
            .map(|c| c.name.as_str())
            .collect();
        for def in &self.names {
            if let Some(cat) = &def.category {
                if !known.iter().any(|k| k.eq_ignore_ascii_case(cat)) {
                    return Err(anyhow!(
                        "name '{}' references unknown category '{}'",
                        def.canonical,
                        cat
                    ));
                }
            }
        }
        Ok(())
    }

    /// First configured currency; the fallback for unrecognized inputs.
    pub fn default_currency(&self) -> Currency {
        self.currencies
            .first()
            .and_then(|d| Currency::parse(&d.code))
            .unwrap_or(Currency::Ils)
    }

    pub fn boilerplate_tokens(&self) -> Vec<String> {
        if self.boilerplate.is_empty() {
            DEFAULT_BOILERPLATE.iter().map(|s| s.to_string()).collect()
        } else {
            self.boilerplate.clone()
        }
    }

    pub fn is_excluded(&self, page_id: &str) -> bool {
        self.exclusion_ids.iter().any(|id| id == page_id)
    }
}
