// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Local;
use expenser::config::ScraperSettings;
use expenser::scraper::{Orchestrator, ScrapeStatus};
use tempfile::TempDir;

fn write_runner(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("runner.sh");
    fs::write(&path, format!("#!/bin/sh\n{}", script)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn settings(runner: PathBuf, output: PathBuf, accounts: &[&str]) -> ScraperSettings {
    ScraperSettings {
        runner,
        output_path: output,
        accounts: accounts.iter().map(|s| s.to_string()).collect(),
        retries: 3,
        timeout_s: 30,
        skip_if_fresh_today: false,
        backoff_base_s: 0,
    }
}

#[test]
fn full_success_stops_after_one_attempt() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    let runner = write_runner(
        dir.path(),
        "echo '[]' > \"$1\"\necho '{\"level\":\"EXIT\",\"code\":0}'\nexit 0",
    );
    let settings = settings(runner, output.clone(), &["acc-1"]);

    let report = Orchestrator::new(&settings).run(Local::now().date_naive());
    assert_eq!(report.status, ScrapeStatus::Full);
    assert_eq!(report.attempts, 1);
    assert!(report.failed_accounts.is_empty());
    assert!(output.exists());
}

#[test]
fn retry_narrows_to_failed_accounts_and_recovers() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    let marker = dir.path().join("ran-once");
    let args_log = dir.path().join("args.log");
    // First attempt: partial failure on acc-1. Second attempt: clean exit.
    let script = format!(
        concat!(
            "out=\"$1\"; shift\n",
            "echo \"$@\" >> {args}\n",
            "echo '[]' > \"$out\"\n",
            "if [ ! -f {marker} ]; then\n",
            "  touch {marker}\n",
            "  echo '{{\"level\":\"error\",\"companyId\":\"acc-1\",\"errorMessage\":\"login failed\"}}'\n",
            "  exit 1\n",
            "fi\n",
            "exit 0"
        ),
        args = args_log.display(),
        marker = marker.display(),
    );
    let runner = write_runner(dir.path(), &script);
    let settings = settings(runner, output, &["acc-1", "acc-2"]);

    let report = Orchestrator::new(&settings).run(Local::now().date_naive());
    assert_eq!(report.status, ScrapeStatus::Full);
    assert_eq!(report.attempts, 2);

    let args = fs::read_to_string(&args_log).unwrap();
    let lines: Vec<&str> = args.lines().collect();
    assert_eq!(lines, vec!["acc-1 acc-2", "acc-1"]);
}

#[test]
fn exhausted_retries_with_output_is_partial() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    let script = concat!(
        "echo '[]' > \"$1\"\n",
        "echo '{\"level\":\"error\",\"companyId\":\"acc-2\",\"errorMessage\":\"blocked\"}'\n",
        "exit 1"
    );
    let runner = write_runner(dir.path(), script);
    let settings = settings(runner, output, &["acc-1", "acc-2"]);

    let report = Orchestrator::new(&settings).run(Local::now().date_naive());
    assert_eq!(report.status, ScrapeStatus::Partial);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.failed_accounts.len(), 1);
    assert_eq!(report.failed_accounts[0].account_id, "acc-2");
    assert_eq!(
        report.failed_accounts[0].message.as_deref(),
        Some("blocked")
    );
}

#[test]
fn no_output_at_all_is_fatal() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("never-written.json");
    let runner = write_runner(dir.path(), "exit 2");
    let settings = settings(runner, output, &["acc-1"]);

    let report = Orchestrator::new(&settings).run(Local::now().date_naive());
    assert_eq!(report.status, ScrapeStatus::Fatal);
    assert_eq!(report.attempts, 3);
}

#[test]
fn hung_scraper_is_killed_and_all_accounts_fail() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("never-written.json");
    let runner = write_runner(dir.path(), "sleep 30");
    let mut settings = settings(runner, output, &["acc-1", "acc-2"]);
    settings.retries = 1;
    settings.timeout_s = 1;

    let report = Orchestrator::new(&settings).run(Local::now().date_naive());
    assert_eq!(report.status, ScrapeStatus::Fatal);
    assert_eq!(report.failed_accounts.len(), 2);
    assert_eq!(
        report.failed_accounts[0].message.as_deref(),
        Some("attempt timed out")
    );
}

#[test]
fn fresh_output_from_today_skips_the_run() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("txns.json");
    fs::write(&output, "[]").unwrap();
    // Runner would fail loudly if invoked.
    let runner = write_runner(dir.path(), "exit 9");
    let mut settings = settings(runner, output, &["acc-1"]);
    settings.skip_if_fresh_today = true;

    let report = Orchestrator::new(&settings).run(Local::now().date_naive());
    assert_eq!(report.status, ScrapeStatus::Full);
    assert!(report.skipped_fresh);
    assert_eq!(report.attempts, 0);
}
