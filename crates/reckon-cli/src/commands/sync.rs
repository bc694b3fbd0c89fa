//! `reckon import orders|stops`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reckon_broker::{HmacSigner, HttpBrokerClient};
use reckon_config::resolve_broker_secrets;
use reckon_reconcile::Fetcher;
use tokio::time::Instant;

use super::{load_engine_config, open_engine, print_results};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feed {
    Orders,
    Stops,
}

pub async fn import(feed: Feed, config_paths: &[String], deadline_secs: Option<u64>) -> Result<()> {
    let (loaded, cfg) = load_engine_config(config_paths)?;

    let secrets = resolve_broker_secrets(&cfg.broker.keys_env)?;
    let signer = Arc::new(HmacSigner::new(
        secrets.api_key,
        secrets.api_secret,
        secrets.passphrase,
    ));
    let broker = HttpBrokerClient::new_with_base_url(
        signer,
        cfg.broker.base_url.clone(),
        cfg.broker_timeout(),
    )
    .context("broker client init failed")?;

    let (engine, store) = open_engine(&cfg).await?;
    let fetcher = Fetcher::new(Arc::new(broker), store, engine.context());

    let budget = deadline_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| cfg.fetch_deadline());
    let deadline = Instant::now() + budget;

    let report = match feed {
        Feed::Orders => engine.import_orders(&fetcher, Some(deadline)).await,
        Feed::Stops => engine.import_stops(&fetcher, Some(deadline)).await,
    }
    .context("import failed")?;

    println!("config_hash={}", loaded.config_hash);
    println!("book={}", report.book.as_str());
    println!("history_complete={}", report.history_complete);
    println!("pending_complete={}", report.pending_complete);
    println!(
        "accepted={} rejected={} expired={} noop={}",
        report.tally.accepted, report.tally.rejected, report.tally.expired, report.tally.noop
    );
    print_results(&report.results);
    Ok(())
}
