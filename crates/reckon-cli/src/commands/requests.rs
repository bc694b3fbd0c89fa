//! `reckon submit`, `reckon cancel`, `reckon sweep`

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use reckon_db::{RequestFilter, Resolver, StopFilter};
use reckon_model::{PositionKey, RecordKey, RequestStatus};
use reckon_reconcile::{PositionRef, SubmitRequest};

use super::{
    load_engine_config, open_engine, parse_action, parse_key, parse_side, parse_status,
    print_results,
};

pub struct SubmitInput {
    pub config_paths: Vec<String>,
    pub symbol: String,
    pub side: String,
    pub action: String,
    pub size: Decimal,
    pub price: Option<Decimal>,
    pub request_type: String,
    pub request: Option<String>,
    pub reduce_only: bool,
    pub memo: Option<String>,
    pub expiry_secs: Option<i64>,
}

pub async fn submit(input: SubmitInput) -> Result<()> {
    // Flag validation runs before any IO.
    let side = parse_side(&input.side)?;
    let action = parse_action(&input.action)?;
    let request = input.request.as_deref().map(parse_key).transpose()?;
    if input.size <= Decimal::ZERO {
        bail!("invalid --size {}: must be positive", input.size);
    }

    let (_, cfg) = load_engine_config(&input.config_paths)?;
    let (engine, _) = open_engine(&cfg).await?;

    let now = Utc::now();
    let mut req = SubmitRequest::new(
        PositionRef::Instrument {
            symbol: input.symbol,
            side,
        },
        action,
        input.size,
        &input.request_type,
        now,
    );
    req.request = request;
    req.price = input.price;
    req.reduce_only = input.reduce_only;
    req.memo = input.memo;
    req.expiry_time = input.expiry_secs.map(|s| now + Duration::seconds(s));

    let result = engine.submit(req).await.context("submit refused")?;
    print_results(&[result]);
    Ok(())
}

pub struct CancelInput {
    pub config_paths: Vec<String>,
    pub request: Option<String>,
    pub symbol: Option<String>,
    pub side: String,
    pub statuses: Vec<String>,
    pub memo: Option<String>,
    pub stops: bool,
}

pub async fn cancel(input: CancelInput) -> Result<()> {
    let request = input.request.as_deref().map(parse_key).transpose()?;
    let side = parse_side(&input.side)?;
    let statuses = input
        .statuses
        .iter()
        .map(|s| parse_status(s))
        .collect::<Result<Vec<RequestStatus>>>()?;
    if request.is_none() && input.symbol.is_none() {
        bail!("cancel needs --request or --symbol");
    }

    let (_, cfg) = load_engine_config(&input.config_paths)?;
    let (engine, store) = open_engine(&cfg).await?;

    let position = match &input.symbol {
        Some(symbol) => Some(
            store
                .position(&cfg.account.account_key, symbol, side)
                .await?
                .map(|p| p.key)
                .with_context(|| {
                    format!("{symbol}:{} is not a position of this account", side.as_str())
                })?,
        ),
        None => None,
    };

    let filter = request_filter(request, position, statuses.clone());
    let mut results = engine.cancel(&filter, input.memo.as_deref()).await;

    if input.stops {
        let stop_filter = StopFilter {
            stop_request: request,
            position,
            statuses,
            ..StopFilter::default()
        };
        results.extend(engine.cancel_stops(&stop_filter, input.memo.as_deref()).await);
    }

    print_results(&results);
    Ok(())
}

fn request_filter(
    request: Option<RecordKey>,
    position: Option<PositionKey>,
    statuses: Vec<RequestStatus>,
) -> RequestFilter {
    RequestFilter {
        request,
        position,
        statuses,
        ..RequestFilter::default()
    }
}

pub async fn sweep(config_paths: &[String]) -> Result<()> {
    let (_, cfg) = load_engine_config(config_paths)?;
    let (engine, _) = open_engine(&cfg).await?;

    let results = engine.sweep(Utc::now()).await;
    print_results(&results);
    Ok(())
}
