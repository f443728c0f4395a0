// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Local;

use crate::config::Config;
use crate::models::MonthKey;
use crate::rollup::RollupEngine;
use crate::store::Store;
use crate::utils::{fmt_opt_money, maybe_print_json, parse_month, pretty_table};

pub fn handle<S: Store>(store: &S, cfg: &Config, m: &clap::ArgMatches) -> Result<()> {
    let json_flag = m.get_flag("json");
    let jsonl_flag = m.get_flag("jsonl");
    let month = match m.get_one::<String>("month") {
        Some(s) => parse_month(s)?,
        None => MonthKey::from_date(Local::now().date_naive()),
    };

    let engine = RollupEngine::new(store, cfg);
    let expenses = engine.fetch_month_expenses(month)?;
    engine.update_month(month, &expenses)?;
    engine.update_averages(month)?;

    let report = engine.month_report(month)?;
    if !maybe_print_json(json_flag, jsonl_flag, &report)? {
        let rows = report
            .into_iter()
            .map(|r| {
                vec![
                    r.category,
                    r.expenses.to_string(),
                    fmt_opt_money(r.total),
                    fmt_opt_money(r.target),
                    fmt_opt_money(r.average),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Category", "Expenses", "Total", "Target", "4mo Avg"],
                rows
            )
        );
    }
    Ok(())
}
