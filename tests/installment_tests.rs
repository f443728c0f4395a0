// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use expenser::installment::parse_installment;
use expenser::models::{Currency, ExpenseKind};
use rust_decimal::Decimal;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[test]
fn installment_progression_counts_down() {
    let amount = dec("400");
    let first = parse_installment("payment 1 of 4", amount, Currency::Ils, ExpenseKind::Credit)
        .unwrap();
    assert_eq!(first.payment, 1);
    assert_eq!(first.total, 4);
    assert_eq!(first.remaining, dec("300.00"));
    assert_eq!(first.memo, "payment 1/4, remaining: ₪ 300.00");

    let third = parse_installment("payment 3 of 4", amount, Currency::Ils, ExpenseKind::Credit)
        .unwrap();
    assert_eq!(third.remaining, dec("100.00"));

    let last = parse_installment("payment 4 of 4", amount, Currency::Ils, ExpenseKind::Credit)
        .unwrap();
    assert_eq!(last.remaining, Decimal::ZERO);
    assert_eq!(last.memo, "final payment 4/4");
}

#[test]
fn single_installment_is_final() {
    let inst = parse_installment("payment 1 of 1", dec("99.90"), Currency::Ils, ExpenseKind::Credit)
        .unwrap();
    assert_eq!(inst.remaining, Decimal::ZERO);
    assert_eq!(inst.memo, "final payment 1/1");
}

#[test]
fn non_credit_kind_is_ignored() {
    assert!(
        parse_installment("payment 1 of 4", dec("400"), Currency::Ils, ExpenseKind::Normal)
            .is_none()
    );
}

#[test]
fn hebrew_memo_is_normalized() {
    let inst = parse_installment(
        "תשלום 2 מתוך 5",
        dec("500"),
        Currency::Ils,
        ExpenseKind::Credit,
    )
    .unwrap();
    assert_eq!(inst.payment, 2);
    assert_eq!(inst.total, 5);
    assert_eq!(inst.remaining, dec("300.00"));
}

#[test]
fn counter_form_with_dash_is_recognized() {
    let inst = parse_installment(
        "3 of 6 - 100.00",
        dec("600"),
        Currency::Ils,
        ExpenseKind::Credit,
    )
    .unwrap();
    assert_eq!(inst.payment, 3);
    assert_eq!(inst.total, 6);
    assert_eq!(inst.remaining, dec("300.00"));
}

#[test]
fn rendered_memos_reparse_to_the_same_counter() {
    let first = parse_installment("payment 1 of 4", dec("400"), Currency::Ils, ExpenseKind::Credit)
        .unwrap();
    let again = parse_installment(&first.memo, dec("400"), Currency::Ils, ExpenseKind::Credit)
        .unwrap();
    assert_eq!(again.payment, 1);
    assert_eq!(again.total, 4);
    assert_eq!(again.remaining, first.remaining);

    let last = parse_installment("payment 4 of 4", dec("400"), Currency::Ils, ExpenseKind::Credit)
        .unwrap();
    let again = parse_installment(&last.memo, dec("100"), Currency::Ils, ExpenseKind::Credit)
        .unwrap();
    assert_eq!(again.payment, 4);
    assert_eq!(again.total, 4);
    assert_eq!(again.remaining, Decimal::ZERO);
}

#[test]
fn nonsense_counters_are_rejected() {
    for memo in ["payment 5 of 4", "payment 0 of 3", "payment 3 of 0", "no counter here"] {
        assert!(
            parse_installment(memo, dec("100"), Currency::Ils, ExpenseKind::Credit).is_none(),
            "memo '{}' should not parse",
            memo
        );
    }
}

#[test]
fn fractional_remaining_rounds_to_cents() {
    // 100 * 2/3 = 66.666... -> 66.67
    let inst = parse_installment("payment 1 of 3", dec("100"), Currency::Ils, ExpenseKind::Credit)
        .unwrap();
    assert_eq!(inst.remaining, dec("66.67"));
}

#[test]
fn dollar_memo_uses_dollar_symbol() {
    let inst = parse_installment("payment 1 of 2", dec("50"), Currency::Usd, ExpenseKind::Credit)
        .unwrap();
    assert_eq!(inst.memo, "payment 1/2, remaining: $ 25.00");
}
