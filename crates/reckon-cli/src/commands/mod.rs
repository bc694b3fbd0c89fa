//! Command handler modules for the reckon CLI.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod requests;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use reckon_config::{EngineConfig, LoadedConfig};
use reckon_db::PgStore;
use reckon_model::{Action, PositionSide, RecordKey, ReconcileResult, RequestStatus};
use reckon_reconcile::Engine;

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

pub fn parse_action(raw: &str) -> Result<Action> {
    Action::parse(raw.trim())
        .with_context(|| format!("invalid --action '{raw}'. expected one of: buy | sell"))
}

pub fn parse_side(raw: &str) -> Result<PositionSide> {
    PositionSide::parse(raw.trim())
        .with_context(|| format!("invalid --side '{raw}'. expected one of: long | short | net"))
}

pub fn parse_status(raw: &str) -> Result<RequestStatus> {
    RequestStatus::parse(raw).with_context(|| {
        format!("invalid --status '{raw}'. expected e.g. Queued | Pending | Hold | Fulfilled")
    })
}

pub fn parse_key(raw: &str) -> Result<RecordKey> {
    RecordKey::from_client_order_id(raw).with_context(|| format!("invalid request key '{raw}'"))
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn load_engine_config(paths: &[String]) -> Result<(LoadedConfig, EngineConfig)> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = reckon_config::load_layered_yaml(&path_refs)?;
    let engine = loaded.engine()?;
    tracing::info!(config_hash = %loaded.config_hash, account = %engine.account.account_key, "config loaded");
    Ok((loaded, engine))
}

/// Postgres-backed engine: the store doubles as the resolver.
pub async fn open_engine(cfg: &EngineConfig) -> Result<(Engine, Arc<PgStore>)> {
    let pool = reckon_db::connect_from_env().await?;
    let store = Arc::new(PgStore::new(pool));
    let engine = Engine::new(store.clone(), store.clone(), cfg.sync_context());
    engine
        .check_reference_tables()
        .await
        .context("reference tables lack a configured fallback code (run `reckon db migrate`)")?;
    Ok((engine, store))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One line per result, then a summary line.
pub fn print_results(results: &[ReconcileResult]) {
    for r in results {
        println!("{r}");
    }
    println!("{}", summary_line(results));
}

fn summary_line(results: &[ReconcileResult]) -> String {
    let failed = results.iter().filter(|r| !r.success).count();
    let rows: u64 = results.iter().map(|r| r.rows).sum();
    format!("results={} failed={} rows={}", results.len(), failed, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reckon_model::{codes, ReconcileError};

    #[test]
    fn flag_values_parse_and_unknowns_are_rejected() {
        assert_eq!(parse_action("buy").unwrap(), Action::Buy);
        assert_eq!(parse_side(" net ").unwrap(), PositionSide::Net);
        assert_eq!(parse_status("Filled").unwrap(), RequestStatus::Fulfilled);
        assert!(parse_action("hold").is_err());
        assert!(parse_status("pending-ish").is_err());
    }

    #[test]
    fn request_keys_are_hex_client_ids() {
        assert_eq!(parse_key("0xAB").unwrap().to_string(), "0x0000000000ab");
        let err = parse_key("zz").unwrap_err();
        assert!(format!("{err:#}").contains("invalid request key"));
    }

    #[test]
    fn summary_counts_failures_and_rows() {
        let results = vec![
            ReconcileResult::inserted("request.submit", "0x01", 1),
            ReconcileResult::failure(
                "request.submit",
                None,
                &ReconcileError::MalformedRequest("size".into()),
            ),
        ];
        assert_eq!(summary_line(&results), "results=2 failed=1 rows=1");
        assert_eq!(results[1].code, codes::MALFORMED_REQUEST);
    }
}
