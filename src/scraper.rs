// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::config::ScraperSettings;

/// One element of the scraper's JSON output file. Amounts are signed:
/// negative is an outflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedTransaction {
    #[serde(rename = "type")]
    pub txn_type: String,
    #[serde(deserialize_with = "de_date")]
    pub date: NaiveDate,
    #[serde(deserialize_with = "de_date")]
    pub processed_date: NaiveDate,
    pub original_amount: Decimal,
    #[serde(default)]
    pub original_currency: String,
    pub charged_amount: Decimal,
    #[serde(default)]
    pub charged_currency: String,
    pub description: String,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: String,
    pub account_number: String,
}

/// Scraper date fields are ISO timestamps or plain dates; only the calendar
/// day matters.
fn de_date<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDate, D::Error> {
    let s = String::deserialize(de)?;
    let day = s.get(..10).unwrap_or(&s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

pub fn load_output(path: &std::path::Path) -> Result<Vec<ScrapedTransaction>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Read scraper output {}", path.display()))?;
    let txns: Vec<ScrapedTransaction> = serde_json::from_str(&text)
        .with_context(|| format!("Parse scraper output {}", path.display()))?;
    Ok(txns)
}

/// Line-delimited JSON event printed by the scraper on stdout/stderr.
#[derive(Debug, Clone, Deserialize)]
struct LogEvent {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    code: Option<i32>,
    #[serde(default, rename = "companyId")]
    company_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeStatus {
    /// Every requested account produced transactions.
    Full,
    /// Some accounts failed but usable output exists.
    Partial,
    /// No usable output after the retry budget.
    Fatal,
}

#[derive(Debug, Clone)]
pub struct FailedAccount {
    pub account_id: String,
    pub username: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub status: ScrapeStatus,
    pub failed_accounts: Vec<FailedAccount>,
    pub attempts: u32,
    /// True when a fresh output file made the run unnecessary.
    pub skipped_fresh: bool,
}

struct Attempt {
    exit_code: Option<i32>,
    events: Vec<LogEvent>,
    timed_out: bool,
}

/// Drives the external scraper with bounded retries. Retries after the first
/// attempt are restricted to the accounts that failed last time.
pub struct Orchestrator<'a> {
    settings: &'a ScraperSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a ScraperSettings) -> Orchestrator<'a> {
        Orchestrator { settings }
    }

    pub fn run(&self, today: NaiveDate) -> ScrapeReport {
        if self.settings.skip_if_fresh_today && self.output_fresh(today) {
            info!(path = %self.settings.output_path.display(),
                "scraper output is fresh for today, skipping run");
            return ScrapeReport {
                status: ScrapeStatus::Full,
                failed_accounts: Vec::new(),
                attempts: 0,
                skipped_fresh: true,
            };
        }

        let mut accounts = self.settings.accounts.clone();
        let mut failed: Vec<FailedAccount> = Vec::new();
        for attempt in 1..=self.settings.retries {
            if attempt > 1 {
                // Backoff proportional to the attempt number.
                let pause = Duration::from_secs(self.settings.backoff_base_s * attempt as u64);
                info!(attempt, pause_s = pause.as_secs(), "retrying scraper");
                thread::sleep(pause);
            }
            let result = self.run_attempt(&accounts);
            failed = self.extract_failures(&result, &accounts);
            match result.exit_code {
                Some(0) => {
                    info!(attempt, "scraper finished with full success");
                    return ScrapeReport {
                        status: ScrapeStatus::Full,
                        failed_accounts: Vec::new(),
                        attempts: attempt,
                        skipped_fresh: false,
                    };
                }
                Some(1) => {
                    warn!(attempt, failed = failed.len(), "scraper partial success");
                }
                code => {
                    warn!(attempt, ?code, timed_out = result.timed_out,
                        "scraper infrastructure failure");
                }
            }
            // Narrow the account list to the failures for the next attempt.
            if !failed.is_empty() {
                accounts = failed.iter().map(|f| f.account_id.clone()).collect();
            }
        }

        // Budget exhausted: proceed with whatever partial output exists.
        if self.settings.output_path.exists() {
            warn!(failed = failed.len(), "retry budget exhausted, proceeding with partial output");
            ScrapeReport {
                status: ScrapeStatus::Partial,
                failed_accounts: failed,
                attempts: self.settings.retries,
                skipped_fresh: false,
            }
        } else {
            ScrapeReport {
                status: ScrapeStatus::Fatal,
                failed_accounts: failed,
                attempts: self.settings.retries,
                skipped_fresh: false,
            }
        }
    }

    fn output_fresh(&self, today: NaiveDate) -> bool {
        let Ok(meta) = std::fs::metadata(&self.settings.output_path) else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        let modified: DateTime<Local> = modified.into();
        modified.date_naive() == today
    }

    fn run_attempt(&self, accounts: &[String]) -> Attempt {
        let mut cmd = Command::new(&self.settings.runner);
        cmd.arg(&self.settings.output_path)
            .args(accounts)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(runner = %self.settings.runner.display(), %err, "failed to spawn scraper");
                return Attempt {
                    exit_code: None,
                    events: Vec::new(),
                    timed_out: false,
                };
            }
        };

        // Drain both pipes on their own threads so a chatty scraper cannot
        // stall on a full pipe buffer.
        let stdout = child.stdout.take().map(read_lines);
        let stderr = child.stderr.take().map(read_lines);

        let deadline = Instant::now() + Duration::from_secs(self.settings.timeout_s);
        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        timed_out = true;
                        let _ = child.kill();
                        break child.wait().ok();
                    }
                    thread::sleep(Duration::from_millis(200));
                }
                Err(err) => {
                    warn!(%err, "failed to wait on scraper");
                    let _ = child.kill();
                    break None;
                }
            }
        };

        let mut lines = Vec::new();
        for handle in [stdout, stderr].into_iter().flatten() {
            if let Ok(batch) = handle.join() {
                lines.extend(batch);
            }
        }
        let events: Vec<LogEvent> = lines
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        // When the child died on a signal, fall back to the EXIT log event.
        let exit_code = if timed_out {
            None
        } else {
            status.and_then(|s| s.code()).or_else(|| {
                events
                    .iter()
                    .find(|e| e.level.as_deref() == Some("EXIT"))
                    .and_then(|e| e.code)
            })
        };

        Attempt {
            exit_code,
            events,
            timed_out,
        }
    }

    /// Per-account failures from structured error events; a timeout or spawn
    /// failure fails every account the attempt covered.
    fn extract_failures(&self, attempt: &Attempt, requested: &[String]) -> Vec<FailedAccount> {
        if attempt.timed_out || attempt.exit_code.is_none() {
            let message = if attempt.timed_out {
                "attempt timed out"
            } else {
                "scraper did not report an exit status"
            };
            return requested
                .iter()
                .map(|id| FailedAccount {
                    account_id: id.clone(),
                    username: None,
                    message: Some(message.to_string()),
                })
                .collect();
        }
        let mut failed: Vec<FailedAccount> = Vec::new();
        for event in &attempt.events {
            let Some(company_id) = &event.company_id else {
                continue;
            };
            let is_error = event.error_message.is_some()
                || event
                    .level
                    .as_deref()
                    .map(|l| l.eq_ignore_ascii_case("error"))
                    .unwrap_or(false);
            if !is_error {
                continue;
            }
            if failed.iter().any(|f| &f.account_id == company_id) {
                continue;
            }
            failed.push(FailedAccount {
                account_id: company_id.clone(),
                username: event.username.clone(),
                message: event.error_message.clone(),
            });
        }
        failed
    }
}

fn read_lines<R: Read + Send + 'static>(reader: R) -> thread::JoinHandle<Vec<String>> {
    thread::spawn(move || {
        BufReader::new(reader)
            .lines()
            .map_while(|l| l.ok())
            .collect()
    })
}
