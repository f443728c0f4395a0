// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use expenser::store::http::NotionClient;
use expenser::{cli, commands, config::Config};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let config_path = match matches.get_one::<String>("config") {
        Some(p) => PathBuf::from(p),
        None => Config::default_path()?,
    };
    let cfg = Config::load(&config_path)?;

    let token = cfg
        .notion_token
        .clone()
        .or_else(|| std::env::var("NOTION_TOKEN").ok())
        .context("Notion token missing: set notion_token in the config or NOTION_TOKEN")?;
    let store = NotionClient::new(token)?;

    match matches.subcommand() {
        Some(("sync", sub)) => commands::sync::handle(&store, &cfg, sub)?,
        Some(("rollup", sub)) => commands::rollup::handle(&store, &cfg, sub)?,
        Some(("backfill", sub)) => commands::backfill::handle(&store, &cfg, sub)?,
        Some(("dedupe", _)) => commands::dedupe::handle(&store, &cfg)?,
        Some(("doctor", _)) => commands::doctor::handle(&store, &cfg)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
