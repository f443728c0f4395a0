// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Local;

use crate::config::Config;
use crate::models::MonthKey;
use crate::rollup::P_MONTH;
use crate::store::{Filter, Store};
use crate::utils::pretty_table;

pub fn handle<S: Store>(store: &S, cfg: &Config) -> Result<()> {
    let mut rows = Vec::new();

    // 1) Scraper binary and output file
    if !cfg.scraper.runner.exists() {
        rows.push(vec![
            "missing_scraper".into(),
            cfg.scraper.runner.display().to_string(),
        ]);
    }
    if !cfg.scraper.output_path.exists() {
        rows.push(vec![
            "no_scraper_output".into(),
            cfg.scraper.output_path.display().to_string(),
        ]);
    }
    if cfg.scraper.accounts.is_empty() {
        rows.push(vec![
            "no_accounts".into(),
            "scraper.accounts is empty, all configured sources will run".into(),
        ]);
    }

    // 2) Notion reachability, one cheap query per database
    if let Err(err) = store.query(&cfg.expense_db_id, &Filter::All, None) {
        rows.push(vec!["expense_db_unreachable".into(), err.to_string()]);
    }
    let month = MonthKey::from_date(Local::now().date_naive());
    match store.query(
        &cfg.monthly_category_db_id,
        &Filter::RichTextEquals {
            property: P_MONTH.to_string(),
            value: month.key(),
        },
        None,
    ) {
        Ok(pages) if pages.is_empty() => {
            rows.push(vec![
                "month_pages_missing".into(),
                format!("no pages for {}, run `expenser rollup`", month),
            ]);
        }
        Ok(_) => {}
        Err(err) => {
            rows.push(vec!["monthly_db_unreachable".into(), err.to_string()]);
        }
    }

    // 3) Exclusion ids that no longer resolve to a page
    if !cfg.exclusion_ids.is_empty() {
        if let Ok(pages) = store.query(&cfg.expense_db_id, &Filter::All, None) {
            for id in &cfg.exclusion_ids {
                if !pages.iter().any(|p| &p.id == id) {
                    rows.push(vec!["stale_exclusion".into(), id.clone()]);
                }
            }
        }
    }

    if rows.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}
