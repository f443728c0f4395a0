// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use rust_decimal::Decimal;

use crate::config::{AmountOp, Config, CreditCardDef, NameDef};

const INCOME_CATEGORY: &str = "Income";
const EXACT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

/// Outcome of name + category resolution for one raw transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub name: String,
    pub category: String,
    pub sub_category: Option<String>,
}

pub struct HookInput<'a> {
    pub raw_name: &'a str,
    pub canonical: &'a str,
    pub amount: Decimal,
    pub cards: &'a [CreditCardDef],
}

/// Resolver extensions are plain functions registered by name at startup;
/// rule tables reference them by that name.
pub type Hook = fn(&HookInput) -> String;

fn builtin_hooks() -> HashMap<String, Hook> {
    let mut hooks: HashMap<String, Hook> = HashMap::new();
    hooks.insert("credit_card".to_string(), credit_card_disambiguator);
    hooks
}

/// Pick the concrete card behind a generic "credit card charge" line:
/// explicit substrings first, then the charged-amount threshold. The resolved
/// label is appended to the canonical name.
pub fn credit_card_disambiguator(input: &HookInput) -> String {
    let hay = input.raw_name.to_lowercase();
    for card in input.cards {
        if card
            .substrings
            .iter()
            .any(|s| hay.contains(&s.to_lowercase()))
        {
            return format!("{} {}", input.canonical, card.label);
        }
    }
    for card in input.cards {
        if let Some(min) = card.min_amount {
            if input.amount.abs() >= min {
                return format!("{} {}", input.canonical, card.label);
            }
        }
    }
    input.canonical.to_string()
}

/// Pure mapping from raw vendor strings and signed amounts to canonical
/// names and category buckets. Built once from the validated config.
#[derive(Debug)]
pub struct Resolver {
    names: Vec<NameDef>,
    categories: Vec<(String, Vec<String>)>,
    sub_categories: Vec<(String, Vec<String>)>,
    cards: Vec<CreditCardDef>,
    boilerplate: Vec<String>,
    default_category: String,
    hooks: HashMap<String, Hook>,
}

impl Resolver {
    pub fn new(cfg: &Config) -> Result<Resolver> {
        let hooks = builtin_hooks();
        for def in &cfg.names {
            for rule in &def.rules {
                if let Some(hook) = &rule.hook {
                    if !hooks.contains_key(hook) {
                        return Err(anyhow!(
                            "name '{}' references unknown hook '{}'",
                            def.canonical,
                            hook
                        ));
                    }
                }
            }
        }
        let keywords = |name: &str, kws: &[String]| {
            (
                name.to_string(),
                kws.iter().map(|k| k.to_lowercase()).collect::<Vec<_>>(),
            )
        };
        Ok(Resolver {
            names: cfg.names.clone(),
            categories: cfg
                .categories
                .iter()
                .map(|c| keywords(&c.name, &c.keywords))
                .collect(),
            sub_categories: cfg
                .sub_categories
                .iter()
                .map(|c| keywords(&c.name, &c.keywords))
                .collect(),
            cards: cfg.credit_cards.clone(),
            boilerplate: cfg.boilerplate_tokens(),
            default_category: cfg.default_category.clone(),
            hooks,
        })
    }

    /// `(raw_name, raw_category, signed_amount)` to canonical name + buckets.
    /// Positive amounts are income; everything else is an outflow.
    pub fn resolve(&self, raw_name: &str, raw_category: &str, signed_amount: Decimal) -> Resolved {
        let (name, matched) = self.resolve_name(raw_name, signed_amount);
        if signed_amount > Decimal::ZERO {
            return Resolved {
                name,
                category: INCOME_CATEGORY.to_string(),
                sub_category: matched.and_then(|d| d.sub_category.clone()),
            };
        }
        let (category, sub_category) = match matched {
            Some(def) if def.category.is_some() || def.sub_category.is_some() => (
                def.category
                    .clone()
                    .unwrap_or_else(|| self.keyword_category(&name, raw_category)),
                def.sub_category.clone(),
            ),
            _ => (
                self.keyword_category(&name, raw_category),
                self.keyword_sub_category(&name, raw_category),
            ),
        };
        Resolved {
            name,
            category,
            sub_category,
        }
    }

    /// Canonical names in declaration order; within a name, rules in
    /// declaration order. First match wins.
    fn resolve_name(&self, raw_name: &str, signed_amount: Decimal) -> (String, Option<&NameDef>) {
        let amount = signed_amount.abs();
        for def in &self.names {
            for rule in &def.rules {
                if !raw_name
                    .to_lowercase()
                    .contains(&rule.substring.to_lowercase())
                {
                    continue;
                }
                if !amount_matches(rule.expected_amount, rule.amount_op.as_ref(), amount) {
                    continue;
                }
                let canonical = match &rule.hook {
                    Some(hook_name) => {
                        // Validated at construction.
                        let hook = self.hooks[hook_name];
                        hook(&HookInput {
                            raw_name,
                            canonical: &def.canonical,
                            amount,
                            cards: &self.cards,
                        })
                    }
                    None => def.canonical.clone(),
                };
                return (canonical, Some(def));
            }
        }
        (self.strip_boilerplate(raw_name), None)
    }

    fn keyword_category(&self, canonical: &str, raw_category: &str) -> String {
        match_keywords(&self.categories, canonical, raw_category)
            .unwrap_or_else(|| self.default_category.clone())
    }

    fn keyword_sub_category(&self, canonical: &str, raw_category: &str) -> Option<String> {
        match_keywords(&self.sub_categories, canonical, raw_category)
    }

    /// Fallback canonicalization for unmatched vendors: drop boilerplate
    /// tokens ("Ltd" equivalents) and title-case the rest.
    fn strip_boilerplate(&self, raw_name: &str) -> String {
        let kept: Vec<&str> = raw_name
            .split_whitespace()
            .filter(|word| {
                let w = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '"');
                !self.boilerplate.iter().any(|b| w.eq_ignore_ascii_case(b))
            })
            .collect();
        title_case(&kept.join(" "))
    }
}

fn amount_matches(expected: Option<Decimal>, op: Option<&AmountOp>, amount: Decimal) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    match op {
        Some(AmountOp::Approx { percent }) => {
            (amount - expected).abs() <= expected * *percent / Decimal::from(100)
        }
        Some(AmountOp::Above) => amount > expected,
        Some(AmountOp::Below) => amount < expected,
        // No operation given but an expected amount is: equality.
        Some(AmountOp::Exact) | None => (amount - expected).abs() <= EXACT_EPSILON,
    }
}

fn match_keywords(
    table: &[(String, Vec<String>)],
    canonical: &str,
    raw_category: &str,
) -> Option<String> {
    let hay = format!("{} {}", canonical, raw_category).to_lowercase();
    for (name, keywords) in table {
        if keywords.iter().any(|k| !k.is_empty() && hay.contains(k)) {
            return Some(name.clone());
        }
    }
    None
}

/// Uppercase the first letter of every word segment, lowercase the rest, so
/// "NETFLIX.COM" becomes "Netflix.Com".
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_boundary = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if at_boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_boundary = false;
        } else {
            out.push(c);
            at_boundary = true;
        }
    }
    out
}
