//! Local forging loop.
//!
//! - Loads a node config (JSON) or falls back to a small built-in schedule
//! - Default mode: one delegate ticking once per `tickMs` against the system clock
//! - `--simulate SECONDS`: a full in-process rotation on a virtual clock, `--offline I,J`
//!   takes delegates out so their slots are missed
//!
//! Usage:
//!   cargo run --bin localnet -- [CONFIG] [--simulate SECONDS] [--offline 1,3]
//!   RUST_LOG=debug cargo run --bin localnet -- --simulate 120

use std::{env, sync::Arc};

use anyhow::{bail, Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dpos_scheduler::{
    config::NodeConfig,
    consensus::forging_loop::{ForgingLoop, ForgingLoopConfig},
    devnet::{init_genesis, start_simulated_network, ClockSource, DevNode},
    pos::{InMemoryHistory, SlotCalculator},
};

const DEFAULT_CONFIG: &str = r#"{
    "tickMs": 1000,
    "delegateIndex": 0,
    "milestones": [
        { "height": 1, "blocktime": 8, "activeDelegates": 4 },
        { "height": 20, "blocktime": 4 },
        { "height": 40, "activeDelegates": 5 }
    ]
}"#;

struct Args {
    config: Option<String>,
    simulate: Option<u64>,
    offline: Vec<u32>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args { config: None, simulate: None, offline: Vec::new() };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--simulate" => {
                let secs = it.next().context("--simulate needs a number of seconds")?;
                args.simulate = Some(secs.parse().context("--simulate expects an integer")?);
            }
            "--offline" => {
                let list = it.next().context("--offline needs a comma-separated list")?;
                for idx in list.split(',').filter(|s| !s.is_empty()) {
                    args.offline.push(idx.trim().parse().with_context(|| format!("bad delegate index {idx}"))?);
                }
            }
            other if other.starts_with("--") => bail!("unknown flag {other}"),
            path => args.config = Some(path.to_string()),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;
    let cfg = match &args.config {
        Some(path) => NodeConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => NodeConfig::from_json_str(DEFAULT_CONFIG)?,
    };
    let schedule = cfg.schedule()?;
    info!(epochs = schedule.len(), delegate = cfg.delegate_index, tick_ms = cfg.tick_ms, "config loaded");

    if let Some(seconds) = args.simulate {
        let net = start_simulated_network(schedule, &args.offline, seconds)?;
        for (delegate, stats) in net.stats() {
            info!(delegate, forged = stats.forged, missed_slots = stats.missed_slots, "delegate stats");
        }
        return Ok(());
    }

    // --- Real-time loop: one delegate on the system clock ---
    let history = Arc::new(InMemoryHistory::new());
    init_genesis(&history);
    let node = DevNode::new(cfg.delegate_index, ClockSource::System(cfg.clock()), history.clone());
    let calculator = Arc::new(SlotCalculator::new(schedule, history));
    let mut forging = ForgingLoop::new(node, calculator, ForgingLoopConfig { tick_ms: cfg.tick_ms });

    let mut ticker = interval(Duration::from_millis(cfg.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                forging.tick_once()?;
            }
            _ = tokio::signal::ctrl_c() => {
                let stats = forging.stats();
                info!(ticks = stats.ticks, forged = stats.forged, missed_slots = stats.missed_slots, "shutting down");
                break;
            }
        }
    }
    Ok(())
}
