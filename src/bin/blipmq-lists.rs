//! blipmq-lists – fill and drain a configured destination set and report what
//! it went through.
//
//  $ blipmq-lists probe --config lists.toml --count 10000 --size 512
//  $ blipmq-lists show-config
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use blipmq_lists::lists::{Event, EventType, ListError, Reason, UserData};
use blipmq_lists::logging::init_logging;
use blipmq_lists::{ListsConfig, NflPriorityFifoSet};

#[derive(Debug, Parser)]
#[command(name = "blipmq-lists", version, about = "BlipMQ destination set probe")]
struct Cli {
    /// Path to config TOML (env BLIPMQ_LISTS_CONFIG is used when absent)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fill a set until it is full or `count` messages went in, then drain it.
    Probe {
        /// Messages to offer
        #[arg(short = 'n', long, default_value_t = 10_000)]
        count: usize,
        /// Payload size in bytes
        #[arg(short, long, default_value_t = 256)]
        size: usize,
        /// Spread messages over every priority level instead of the default one
        #[arg(long)]
        spread: bool,
    },
    /// Print the effective configuration.
    ShowConfig,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let cfg = ListsConfig::load(cli.config.as_deref())?;

    match cli.cmd {
        Command::ShowConfig => {
            println!("{cfg:#?}");
        }
        Command::Probe { count, size, spread } => probe(&cfg, count, size, spread)?,
    }
    Ok(())
}

fn probe(cfg: &ListsConfig, count: usize, size: usize, spread: bool) -> anyhow::Result<()> {
    let set: NflPriorityFifoSet<Bytes> = NflPriorityFifoSet::from_config("probe", cfg)?;

    let full_edges = Arc::new(AtomicUsize::new(0));
    let edges = Arc::clone(&full_edges);
    set.add_event_listener(
        Arc::new(move |_: &Event<Bytes>, _: Option<&UserData>| {
            edges.fetch_add(1, Ordering::Relaxed);
        }),
        EventType::Full,
        None,
        None,
    );

    let levels = set.levels();
    let mut accepted = 0usize;
    for i in 0..count {
        let mut payload = vec![0u8; size];
        payload[..size.min(8)].copy_from_slice(&(i as u64).to_be_bytes()[..size.min(8)]);
        let priority = if spread { i % levels } else { set.default_priority() };
        match set.add(priority, Bytes::from(payload), Reason::ADDED) {
            Ok(()) => accepted += 1,
            Err(err) if err.is_out_of_limits() => {
                warn!(offered = i, %err, "set refused further messages");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }
    info!(accepted, bytes = set.byte_size(), full = set.is_full(), "fill finished");

    let mut drained = 0usize;
    loop {
        match set.remove_next(Reason::DELIVERED) {
            Ok(_) => drained += 1,
            Err(ListError::NoSuchElement) => break,
            Err(err) => return Err(err.into()),
        }
    }

    let snapshot = set.snapshot();
    println!("accepted    : {accepted}");
    println!("drained     : {drained}");
    println!("full edges  : {}", full_edges.load(Ordering::Relaxed));
    println!("{}", toml::to_string_pretty(&snapshot)?);
    Ok(())
}
