//! Thin driver around the courier engine: loads settings, watches the
//! configured addresses and prints what comes back.

mod config;
mod logging;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Local;
use courier_core::{CommandOutcome, Health, LoadingLevel};
use courier_engine::{
    AddressHistory, AddressInfoQuery, AddressRef, AddressUnspent, ApiCommand, ApiEvent,
    ChannelResultSink, CoinRates, CoinsInfo, EngineEvent, EngineHandle, Mempool, ResultSink,
    ValidateAddress,
};
use courier_logging::{net_info, net_warn};

const POLL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));
    let settings = config::load(&path)?;
    logging::initialize(&settings.log);

    let (result_tx, result_rx) = mpsc::channel();
    let results: Arc<dyn ResultSink> = Arc::new(ChannelResultSink::new(result_tx));
    let engine = EngineHandle::new(settings.engine.clone(), Arc::clone(&results))
        .context("starting the engine")?;
    net_info!("courier talking to {}", settings.engine.api_base);

    engine.submit(ApiCommand::boxed(CoinsInfo::new(Arc::clone(&results))));
    if !settings.rate_ids.is_empty() {
        engine.submit(ApiCommand::boxed(CoinRates::new(
            settings.engine.rates_host.as_str(),
            settings.rate_ids.clone(),
            settings.rate_currency.as_str(),
            Arc::clone(&results),
        )));
    }
    watch_addresses(&engine, &results, &settings.watch);

    let mut online: Option<bool> = None;
    let started = Instant::now();

    loop {
        if settings
            .run_for
            .is_some_and(|limit| started.elapsed() >= limit)
        {
            break;
        }

        while let Some(event) = engine.try_recv() {
            match event {
                EngineEvent::Health(health) => report_health(&mut online, &health),
                EngineEvent::CommandFinished { kind, outcome, .. } => {
                    if let CommandOutcome::Failed(err) = &outcome {
                        net_warn!("{kind} failed: {err}");
                    }
                }
                EngineEvent::Stopped => return Ok(()),
            }
        }

        match result_rx.recv_timeout(POLL) {
            Ok(event) => print_result(&event),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.abort();
    Ok(())
}

fn watch_addresses(engine: &EngineHandle, results: &Arc<dyn ResultSink>, watch: &[AddressRef]) {
    let mut per_coin: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for address in watch {
        let checked = address.clone();
        engine.submit(ApiCommand::boxed(ValidateAddress::new(
            address.clone(),
            move |valid| {
                if !valid {
                    net_warn!("server does not accept {checked}");
                }
            },
        )));
        engine.submit(ApiCommand::boxed(AddressInfoQuery::new(
            address.clone(),
            Arc::clone(results),
        )));
        engine.submit(ApiCommand::boxed(AddressUnspent::new(
            address.clone(),
            Arc::clone(results),
        )));
        engine.submit(ApiCommand::boxed(AddressHistory::new(
            address.clone(),
            Arc::clone(results),
        )));
        per_coin
            .entry(address.coin.as_str())
            .or_default()
            .push(address.address.clone());
    }
    for (coin, addresses) in per_coin {
        engine.submit(ApiCommand::boxed(Mempool::new(
            coin,
            addresses,
            Arc::clone(results),
        )));
    }
    engine.advance_level(LoadingLevel::Addresses);
}

fn report_health(online: &mut Option<bool>, health: &Health) {
    let now = health.is_healthy();
    if *online == Some(now) {
        return;
    }
    *online = Some(now);
    let stamp = Local::now().format("%H:%M:%S");
    match health {
        Health::Healthy => println!("[{stamp}] server reachable"),
        Health::Unhealthy { status, message } => {
            println!("[{stamp}] server unreachable ({status}): {message}")
        }
    }
}

fn print_result(event: &ApiEvent) {
    match event {
        ApiEvent::ServerInfo(info) => {
            println!("server {} {} ({})", info.name, info.version_human, info.version);
            for coin in &info.coins {
                println!("  {} height {} status {}", coin.coin, coin.height, coin.status);
            }
        }
        ApiEvent::CoinsInfo(coins) => {
            for coin in coins {
                println!(
                    "coin {} height {} offset {}",
                    coin.coin,
                    coin.height,
                    coin.offset.as_deref().unwrap_or("-")
                );
            }
        }
        ApiEvent::AddressInfo { address, info } => println!(
            "{address}: balance {} in {} transactions ({})",
            info.balance, info.number_of_transactions, info.address_type
        ),
        ApiEvent::HistoryPage {
            address,
            transactions,
            ..
        } => {
            for tx in transactions {
                println!(
                    "{address}: tx {} amount {} fee {} height {}",
                    tx.id,
                    tx.amount,
                    tx.fee,
                    tx.height.map_or_else(|| "-".to_string(), |h| h.to_string())
                );
            }
        }
        ApiEvent::HistoryComplete { address, tx_count } => {
            println!("{address}: history loaded, {tx_count} transactions")
        }
        ApiEvent::Unspent { address, outputs } => {
            let total: i64 = outputs.iter().map(|output| output.amount).sum();
            println!("{address}: {} unspent outputs worth {total}", outputs.len());
        }
        ApiEvent::Mempool {
            coin, transactions, ..
        } => println!("{coin}: {} unconfirmed transactions", transactions.len()),
        ApiEvent::BroadcastAccepted { coin, tx_id } => println!("{coin}: broadcast {tx_id}"),
        ApiEvent::BroadcastRejected {
            coin,
            tx_id,
            detail,
        } => println!("{coin}: {tx_id} rejected: {detail}"),
        ApiEvent::RecommendedFees(estimates) => {
            for estimate in estimates {
                println!(
                    "fee {} sat/B within {} minutes",
                    estimate.satoshi_per_byte, estimate.minutes
                );
            }
        }
        ApiEvent::CoinRates(rates) => {
            for rate in rates {
                println!("rate {} {} {}", rate.coin, rate.rate, rate.currency);
            }
        }
        ApiEvent::UndoApplied { coin, count } => println!("{coin}: undid {count} transactions"),
    }
}
