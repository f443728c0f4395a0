// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::fs;

use chrono::NaiveDate;
use expenser::config::Config;
use expenser::models::{Expense, MonthKey};
use expenser::resolver::Resolver;
use expenser::rollup::{P_EXPENSE_RELATION, P_MONTH, P_TITLE};
use expenser::scraper::{FailedAccount, ScrapeReport, ScrapeStatus};
use expenser::store::memory::{MemoryStore, RelationSum};
use expenser::store::{Filter, Page, Store};
use expenser::sync::SyncService;
use serde_json::json;
use tempfile::TempDir;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 15).unwrap()
}

fn full_report() -> ScrapeReport {
    ScrapeReport {
        status: ScrapeStatus::Full,
        failed_accounts: Vec::new(),
        attempts: 1,
        skipped_fresh: false,
    }
}

fn test_store() -> MemoryStore {
    MemoryStore::with_relation_sum(RelationSum {
        database_id: "months".to_string(),
        formula_property: "Total".to_string(),
        relation_property: "Expenses".to_string(),
        source_database_id: "expenses".to_string(),
        source_number_property: "Charged Amount".to_string(),
    })
}

fn month_page(store: &MemoryStore, name: &str) -> Page {
    store
        .query(
            "months",
            &Filter::RichTextEquals {
                property: P_MONTH.to_string(),
                value: MonthKey::from_date(today()).key(),
            },
            None,
        )
        .unwrap()
        .into_iter()
        .find(|p| p.title(P_TITLE).unwrap() == name)
        .unwrap_or_else(|| panic!("no '{}' page for the month", name))
}

fn test_config(output_path: &std::path::Path) -> Config {
    serde_json::from_value(json!({
        "expense_db_id": "expenses",
        "monthly_category_db_id": "months",
        "scraper": {
            "runner": "/bin/true",
            "output_path": output_path
        },
        "cards": {"1234": "Jane Gold"},
        "categories": [
            {"name": "Food", "keywords": ["super", "restaurant"]},
            {"name": "Transport", "keywords": ["fuel"]},
            {"name": "Income", "keywords": []}
        ]
    }))
    .unwrap()
}

fn scraped_rows() -> serde_json::Value {
    json!([
        {
            "type": "normal",
            "date": "2025-11-10T00:00:00.000Z",
            "processedDate": "2025-11-10",
            "originalAmount": -120.5,
            "originalCurrency": "ILS",
            "chargedAmount": -120.5,
            "chargedCurrency": "ILS",
            "description": "SUPER YUDA",
            "status": "completed",
            "accountNumber": "1234"
        },
        {
            "type": "normal",
            "date": "2025-11-12",
            "processedDate": "2025-11-12",
            "originalAmount": -200,
            "originalCurrency": "ILS",
            "chargedAmount": -200,
            "chargedCurrency": "ILS",
            "description": "FUEL STATION",
            "status": "completed",
            "accountNumber": "1234"
        },
        {
            "type": "normal",
            "date": "2025-11-01",
            "processedDate": "2025-11-01",
            "originalAmount": 9000,
            "originalCurrency": "ILS",
            "chargedAmount": 9000,
            "chargedCurrency": "ILS",
            "description": "ACME PAYROLL",
            "status": "completed",
            "accountNumber": "1234"
        }
    ])
}

#[test]
fn fresh_sync_adds_everything_and_builds_the_month() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    fs::write(&output, scraped_rows().to_string()).unwrap();

    let store = test_store();
    let cfg = test_config(&output);
    let resolver = Resolver::new(&cfg).unwrap();
    let service = SyncService::new(&store, &cfg, &resolver);

    let summary = service
        .add_from_report(&full_report(), today(), true)
        .unwrap();
    assert_eq!(summary.scraped, 3);
    assert_eq!(summary.added, 3);
    assert_eq!(summary.skipped_existing, 0);
    assert_eq!(store.page_count("expenses"), 3);

    // Food, Transport, Income, plus the Expenses summary page.
    assert_eq!(store.page_count("months"), 4);
    assert_eq!(summary.categories_updated, 4);
}

#[test]
fn second_run_over_the_same_output_adds_nothing() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    fs::write(&output, scraped_rows().to_string()).unwrap();

    let store = test_store();
    let cfg = test_config(&output);
    let resolver = Resolver::new(&cfg).unwrap();
    let service = SyncService::new(&store, &cfg, &resolver);

    service
        .add_from_report(&full_report(), today(), true)
        .unwrap();
    let second = service
        .add_from_report(&full_report(), today(), true)
        .unwrap();

    assert_eq!(second.added, 0);
    assert_eq!(second.skipped_existing, 3);
    assert_eq!(store.page_count("expenses"), 3);
}

#[test]
fn skipping_the_duplicate_check_duplicates() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    fs::write(&output, scraped_rows().to_string()).unwrap();

    let store = test_store();
    let cfg = test_config(&output);
    let resolver = Resolver::new(&cfg).unwrap();
    let service = SyncService::new(&store, &cfg, &resolver);

    service
        .add_from_report(&full_report(), today(), true)
        .unwrap();
    service
        .add_from_report(&full_report(), today(), false)
        .unwrap();
    assert_eq!(store.page_count("expenses"), 6);
}

#[test]
fn unchecked_run_keeps_existing_month_relations() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    fs::write(&output, scraped_rows().to_string()).unwrap();

    let store = test_store();
    let cfg = test_config(&output);
    let resolver = Resolver::new(&cfg).unwrap();
    let service = SyncService::new(&store, &cfg, &resolver);

    service
        .add_from_report(&full_report(), today(), true)
        .unwrap();
    let mut before: Vec<String> = month_page(&store, "Food")
        .relation(P_EXPENSE_RELATION)
        .unwrap()
        .to_vec();
    before.sort();
    assert!(!before.is_empty());

    // A later run with the duplicate check disabled and nothing new scraped
    // must not unlink what the month already holds.
    fs::write(&output, "[]").unwrap();
    service
        .add_from_report(&full_report(), today(), false)
        .unwrap();
    let mut after: Vec<String> = month_page(&store, "Food")
        .relation(P_EXPENSE_RELATION)
        .unwrap()
        .to_vec();
    after.sort();
    assert_eq!(after, before);
}

#[test]
fn partial_scrape_ingests_the_subset_then_a_full_run_completes() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    let rows = scraped_rows();
    // The failing account's transaction is missing from the first output.
    fs::write(
        &output,
        json!([rows[0].clone(), rows[2].clone()]).to_string(),
    )
    .unwrap();

    let store = test_store();
    let cfg = test_config(&output);
    let resolver = Resolver::new(&cfg).unwrap();
    let service = SyncService::new(&store, &cfg, &resolver);

    let partial = ScrapeReport {
        status: ScrapeStatus::Partial,
        failed_accounts: vec![FailedAccount {
            account_id: "acc-2".to_string(),
            username: None,
            message: Some("login failed".to_string()),
        }],
        attempts: 3,
        skipped_fresh: false,
    };
    let first = service.add_from_report(&partial, today(), true).unwrap();
    assert_eq!(first.added, 2);
    assert_eq!(first.failed_accounts, vec!["acc-2".to_string()]);
    assert_eq!(store.page_count("expenses"), 2);

    let survivors: Vec<String> = store
        .query("expenses", &Filter::All, None)
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();

    // Next run the account recovers and the full output is available.
    fs::write(&output, rows.to_string()).unwrap();
    let second = service
        .add_from_report(&full_report(), today(), true)
        .unwrap();
    assert_eq!(second.added, 1);
    assert_eq!(second.skipped_existing, 2);
    assert_eq!(store.page_count("expenses"), 3);

    // The pages from the partial run are untouched.
    let ids: Vec<String> = store
        .query("expenses", &Filter::All, None)
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    for id in &survivors {
        assert!(ids.contains(id));
    }
}

#[test]
fn fatal_scrape_leaves_the_store_untouched() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    fs::write(&output, scraped_rows().to_string()).unwrap();

    let store = test_store();
    let cfg = test_config(&output);
    let resolver = Resolver::new(&cfg).unwrap();
    let service = SyncService::new(&store, &cfg, &resolver);

    let report = ScrapeReport {
        status: ScrapeStatus::Fatal,
        failed_accounts: Vec::new(),
        attempts: 3,
        skipped_fresh: false,
    };
    let summary = service.add_from_report(&report, today(), true).unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(store.page_count("expenses"), 0);
    assert_eq!(store.page_count("months"), 0);
}

#[test]
fn remove_duplicates_keeps_the_most_recently_edited() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    fs::write(&output, scraped_rows().to_string()).unwrap();

    let store = test_store();
    let cfg = test_config(&output);
    let resolver = Resolver::new(&cfg).unwrap();
    let service = SyncService::new(&store, &cfg, &resolver);

    // Same scrape ingested twice without the duplicate check.
    service
        .add_from_report(&full_report(), today(), true)
        .unwrap();
    service
        .add_from_report(&full_report(), today(), false)
        .unwrap();
    assert_eq!(store.page_count("expenses"), 6);

    let removed = service.remove_duplicates().unwrap();
    assert_eq!(removed, 3);
    assert_eq!(store.page_count("expenses"), 3);
    assert_eq!(store.archived_count(), 3);

    // The surviving pages are the later copies.
    let survivors = store.query("expenses", &Filter::All, None).unwrap();
    let mut fingerprints: Vec<String> = survivors
        .iter()
        .map(|p| Expense::from_page(p).unwrap().fingerprint())
        .collect();
    fingerprints.sort();
    fingerprints.dedup();
    assert_eq!(fingerprints.len(), 3);
}
