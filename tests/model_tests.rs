// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{NaiveDate, Utc};
use expenser::config::Config;
use expenser::models::{Currency, Expense, ExpenseKind, MonthKey};
use expenser::resolver::Resolver;
use expenser::scraper::ScrapedTransaction;
use expenser::store::Page;
use rust_decimal::Decimal;
use serde_json::json;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn test_config() -> Config {
    serde_json::from_value(json!({
        "expense_db_id": "expenses",
        "monthly_category_db_id": "months",
        "scraper": {
            "runner": "/bin/true",
            "output_path": "/tmp/expenser-model-test.json"
        },
        "date_adjustment_names": ["Salary"],
        "cards": {"1234": "Jane Gold"},
        "categories": [
            {"name": "Food", "keywords": ["super"]},
            {"name": "Income", "keywords": []}
        ],
        "names": [
            {"canonical": "Salary", "rules": [{"substring": "acme payroll"}]}
        ]
    }))
    .unwrap()
}

fn txn(date_s: &str, amount: &str, description: &str) -> ScrapedTransaction {
    ScrapedTransaction {
        txn_type: "normal".to_string(),
        date: date(date_s),
        processed_date: date(date_s),
        original_amount: dec(amount),
        original_currency: "ILS".to_string(),
        charged_amount: dec(amount),
        charged_currency: "ILS".to_string(),
        description: description.to_string(),
        memo: String::new(),
        category: String::new(),
        status: "completed".to_string(),
        account_number: "1234".to_string(),
    }
}

fn build(raw: &ScrapedTransaction) -> Expense {
    let cfg = test_config();
    let resolver = Resolver::new(&cfg).unwrap();
    Expense::from_scraped(raw, &cfg, &resolver).unwrap()
}

#[test]
fn fingerprint_ignores_name_category_and_memo() {
    let a = build(&txn("2025-11-10", "-120.50", "SUPER YUDA"));
    let mut b = a.clone();
    b.name = "Renamed Vendor".to_string();
    b.category = "Transport".to_string();
    b.memo = "hand-written note".to_string();
    assert!(a.same_txn(&b));
}

#[test]
fn fingerprint_distinguishes_date_amount_and_card() {
    let base = build(&txn("2025-11-10", "-120.50", "SUPER YUDA"));

    let other_day = build(&txn("2025-11-11", "-120.50", "SUPER YUDA"));
    assert!(!base.same_txn(&other_day));

    let other_amount = build(&txn("2025-11-10", "-120.51", "SUPER YUDA"));
    assert!(!base.same_txn(&other_amount));

    let mut other_card = base.clone();
    other_card.person_card = "John Platinum".to_string();
    assert!(!base.same_txn(&other_card));
}

#[test]
fn month_end_salary_rolls_into_next_month() {
    // November has 30 days; the last three days roll forward.
    let rolled = build(&txn("2025-11-29", "12000", "ACME PAYROLL"));
    assert_eq!(rolled.txn_date, date("2025-12-01"));
    assert_eq!(rolled.processed_date, date("2025-12-01"));

    let kept = build(&txn("2025-11-27", "12000", "ACME PAYROLL"));
    assert_eq!(kept.txn_date, date("2025-11-27"));

    // Unlisted names keep their dates even at month end.
    let vendor = build(&txn("2025-11-30", "-50", "SUPER YUDA"));
    assert_eq!(vendor.txn_date, date("2025-11-30"));
}

#[test]
fn amounts_are_stored_unsigned() {
    let e = build(&txn("2025-11-10", "-120.50", "SUPER YUDA"));
    assert_eq!(e.charged_amount, dec("120.50"));
    assert_eq!(e.original_amount, dec("120.50"));
}

#[test]
fn card_labels_come_from_config() {
    let e = build(&txn("2025-11-10", "-10", "SUPER YUDA"));
    assert_eq!(e.person_card, "Jane Gold");

    let mut raw = txn("2025-11-10", "-10", "SUPER YUDA");
    raw.account_number = "9999".to_string();
    assert_eq!(build(&raw).person_card, "9999");
}

#[test]
fn installment_memo_sets_remaining_amount() {
    let mut raw = txn("2025-11-10", "-400", "FURNITURE STORE");
    raw.txn_type = "installments".to_string();
    raw.memo = "payment 1 of 4".to_string();
    let e = build(&raw);
    assert_eq!(e.kind, ExpenseKind::Credit);
    assert_eq!(e.remaining_amount, dec("300.00"));
    assert_eq!(e.memo, "payment 1/4, remaining: ₪ 300.00");
}

#[test]
fn page_round_trip_preserves_the_record() {
    let original = build(&txn("2025-11-10", "-120.50", "SUPER YUDA"));
    let page = Page {
        id: "page-0001".to_string(),
        last_edited: Utc::now(),
        icon: None,
        properties: original.to_properties(),
    };
    let restored = Expense::from_page(&page).unwrap();

    assert_eq!(restored.external_id.as_deref(), Some("page-0001"));
    assert_eq!(restored.name, original.name);
    assert_eq!(restored.txn_date, original.txn_date);
    assert_eq!(restored.processed_date, original.processed_date);
    assert_eq!(restored.charged_amount, original.charged_amount);
    assert_eq!(restored.charged_currency, Currency::Ils);
    assert_eq!(restored.category, original.category);
    assert_eq!(restored.person_card, original.person_card);
    assert!(restored.same_txn(&original));
}

#[test]
fn currency_parse_accepts_legacy_suffixed_forms() {
    assert_eq!(Currency::parse("ILS ₪"), Some(Currency::Ils));
    assert_eq!(Currency::parse("₪"), Some(Currency::Ils));
    assert_eq!(Currency::parse("nis"), Some(Currency::Ils));
    assert_eq!(Currency::parse("USD"), Some(Currency::Usd));
    assert_eq!(Currency::parse("eur"), Some(Currency::Eur));
    assert_eq!(Currency::parse(""), None);
    assert_eq!(Currency::parse("GBP"), None);
}

#[test]
fn month_key_arithmetic_handles_year_boundaries() {
    let jan = MonthKey::new(2026, 1);
    assert_eq!(jan.key(), "01/26");
    assert_eq!(jan.prev(), MonthKey::new(2025, 12));
    assert_eq!(jan.back(4), MonthKey::new(2025, 9));
    assert_eq!(MonthKey::new(2025, 12).next(), jan);

    assert_eq!(jan.first_day(), date("2026-01-01"));
    assert_eq!(jan.last_day(), date("2026-01-31"));
    // 2024 is a leap year.
    assert_eq!(MonthKey::new(2024, 2).last_day(), date("2024-02-29"));
    assert_eq!(MonthKey::new(2025, 2).last_day(), date("2025-02-28"));

    assert!(jan.contains(date("2026-01-15")));
    assert!(!jan.contains(date("2025-12-31")));
}
