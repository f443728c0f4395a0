// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print the result as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .help("Print the result as JSON lines"),
    )
}

pub fn build_cli() -> Command {
    Command::new("expenser")
        .about("Sync bank transactions into Notion and maintain monthly rollups")
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(false)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .help("Config file path (defaults to the platform config dir)"),
        )
        .subcommand(json_flags(
            Command::new("sync")
                .about("Run the scraper, add new expenses, update the current month")
                .arg(
                    Arg::new("no-check")
                        .long("no-check")
                        .action(ArgAction::SetTrue)
                        .help("Skip the duplicate check against existing pages"),
                )
                .arg(
                    Arg::new("no-scrape")
                        .long("no-scrape")
                        .action(ArgAction::SetTrue)
                        .help("Ingest the existing output file without running the scraper"),
                ),
        ))
        .subcommand(json_flags(
            Command::new("rollup")
                .about("Recompute the category pages for one month")
                .arg(
                    Arg::new("month")
                        .long("month")
                        .value_name("YYYY-MM")
                        .help("Month to recompute (defaults to the current month)"),
                ),
        ))
        .subcommand(
            Command::new("backfill")
                .about("Recompute rollups and averages for the trailing months")
                .arg(
                    Arg::new("months")
                        .long("months")
                        .value_name("N")
                        .default_value("3")
                        .help("How many months back, including the current one"),
                ),
        )
        .subcommand(
            Command::new("dedupe")
                .about("Archive duplicate expense pages, keeping the most recently edited"),
        )
        .subcommand(Command::new("doctor").about("Check config, scraper, and Notion connectivity"))
}
