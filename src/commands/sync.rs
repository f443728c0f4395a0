// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Local;

use crate::config::Config;
use crate::resolver::Resolver;
use crate::scraper::{ScrapeReport, ScrapeStatus};
use crate::store::Store;
use crate::sync::SyncService;
use crate::utils::{maybe_print_json, pretty_table};

pub fn handle<S: Store>(store: &S, cfg: &Config, m: &clap::ArgMatches) -> Result<()> {
    let json_flag = m.get_flag("json");
    let jsonl_flag = m.get_flag("jsonl");
    let check = !m.get_flag("no-check");
    let today = Local::now().date_naive();

    let resolver = Resolver::new(cfg)?;
    let service = SyncService::new(store, cfg, &resolver);
    let summary = if m.get_flag("no-scrape") {
        // Pretend the scraper just ran cleanly and ingest what is on disk.
        let report = ScrapeReport {
            status: ScrapeStatus::Full,
            failed_accounts: Vec::new(),
            attempts: 0,
            skipped_fresh: true,
        };
        service.add_from_report(&report, today, check)?
    } else {
        service.add_all(today, check)?
    };

    if !maybe_print_json(json_flag, jsonl_flag, &summary)? {
        let rows = vec![
            vec!["scraped".to_string(), summary.scraped.to_string()],
            vec!["added".to_string(), summary.added.to_string()],
            vec![
                "skipped existing".to_string(),
                summary.skipped_existing.to_string(),
            ],
            vec![
                "categories updated".to_string(),
                summary.categories_updated.to_string(),
            ],
            vec![
                "months averaged".to_string(),
                summary.months_averaged.to_string(),
            ],
            vec![
                "failed accounts".to_string(),
                summary.failed_accounts.join(", "),
            ],
        ];
        println!("{}", pretty_table(&["Step", "Result"], rows));
    }
    Ok(())
}
