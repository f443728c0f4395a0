// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::models::{Currency, ExpenseKind};

/// "payment i of N" / "payment i/N", including the rendered final form.
static PAYMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:final\s+)?payment\s+(\d+)\s*(?:of|/)\s*(\d+)").unwrap());

/// "i of N — transaction amount" style counters.
static COUNTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+of\s+(\d+)\s*[-–—]").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct Installment {
    pub payment: u32,
    pub total: u32,
    /// Outstanding balance after this payment; zero on the final one.
    pub remaining: Decimal,
    /// Human-readable memo persisted on the expense.
    pub memo: String,
}

/// Map localized installment prefixes onto the ASCII forms the patterns
/// expect.
fn normalize(memo: &str) -> String {
    memo.replace("תשלומים", "payment")
        .replace("תשלום", "payment")
        .replace("מתוך", "of")
}

fn capture(memo: &str) -> Option<(u32, u32)> {
    let caps = PAYMENT_RE.captures(memo).or_else(|| COUNTER_RE.captures(memo))?;
    let payment: u32 = caps[1].parse().ok()?;
    let total: u32 = caps[2].parse().ok()?;
    if total == 0 || payment == 0 || payment > total {
        return None;
    }
    Some((payment, total))
}

/// Extract "payment i of N" semantics from a free-text memo. Returns `None`
/// for non-credit kinds and for memos with no recognizable counter.
pub fn parse_installment(
    memo: &str,
    amount: Decimal,
    currency: Currency,
    kind: ExpenseKind,
) -> Option<Installment> {
    if kind != ExpenseKind::Credit {
        return None;
    }
    let (payment, total) = capture(&normalize(memo))?;
    Some(build(payment, total, amount, currency))
}

fn build(payment: u32, total: u32, amount: Decimal, currency: Currency) -> Installment {
    if payment == total {
        return Installment {
            payment,
            total,
            remaining: Decimal::ZERO,
            memo: format!("final payment {}/{}", payment, total),
        };
    }
    let remaining = (amount.abs() * Decimal::from(total - payment) / Decimal::from(total))
        .round_dp(2);
    Installment {
        payment,
        total,
        memo: format!(
            "payment {}/{}, remaining: {} {:.2}",
            payment,
            total,
            currency.symbol(),
            remaining
        ),
        remaining,
    }
}
