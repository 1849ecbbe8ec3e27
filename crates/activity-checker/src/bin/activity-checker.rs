use activity_checker::{ActivityChecker, Args, ConfigLock, ConfigWatcher, Month};
use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_span_events(FmtSpan::CLOSE)
            .init();
    }

    // A missing config file is fine; the built-in defaults cover it.
    let (config, _watcher) = if args.config_file.exists() {
        let watcher = ConfigWatcher::new(&args.config_file)
            .await
            .context("Failed to load checker config")?;
        (watcher.config.clone(), Some(watcher))
    } else {
        tracing::debug!("No config file at {:?}, using defaults", args.config_file);
        (ConfigLock::default(), None)
    };

    let checker = ActivityChecker::from_config(&config, &args.db_url)
        .await
        .context("Failed to construct activity checker")?;

    if args.clear_cache {
        checker.clear_cache(Some(args.address), args.chain.as_deref()).await;
        tracing::info!("Cleared cached results for the requested scope");
    }

    let chains: Vec<String> = match &args.chain {
        Some(slug) => vec![slug.clone()],
        None => checker.registry().active_chains().map(|c| c.slug.clone()).collect(),
    };

    let mut all_results: BTreeMap<String, BTreeMap<Month, bool>> = BTreeMap::new();
    for slug in &chains {
        let results = match args.month {
            Some(month) => {
                let result = checker
                    .check_month(args.address, slug, month, |checked, total| {
                        tracing::info!("{slug} {month}: checked {checked}/{total} chunks");
                    })
                    .await?;
                BTreeMap::from([(month, result)])
            }
            None => {
                checker
                    .check_all_months(args.address, slug, |month, result| {
                        tracing::info!("{slug} {month}: activity = {result}");
                    })
                    .await?
            }
        };
        all_results.insert(slug.clone(), results);
    }

    if args.log_json {
        println!("{}", serde_json::to_string_pretty(&all_results)?);
    } else {
        for (slug, months) in &all_results {
            for (month, result) in months {
                println!("{slug:>10}  {month:<10} {}", if *result { "active" } else { "no activity" });
            }
        }
    }

    Ok(())
}
