//! Market data fan-out.
//!
//! One feed thread publishes quotes for a handful of symbols while several
//! strategy threads read the latest quote for each. Pass a lock mode as the
//! first argument (`monitor`, `spinlock`, `read-write`, `bucket-monitor`,
//! `bucket-read-write`) and set `RUST_LOG=debug` to see the store's logging.

use alertable_data::{AlertableDataConfig, LockMode, OnDemandAlertableData};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SYMBOLS: [&str; 6] = ["VOD.L", "BT.L", "BP.L", "HSBA.L", "RR.L", "AZN.L"];
const STRATEGIES: usize = 4;

#[derive(Debug)]
struct Quote {
    bid: u64,
    ask: u64,
    sequence: u64,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_thread_names(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mode: LockMode = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => LockMode::ReadWrite,
    };

    let config = AlertableDataConfig::new(mode.policy()).with_buckets(7);
    let quotes: OnDemandAlertableData<String, Quote, _> =
        OnDemandAlertableData::init(config, None)?;
    for symbol in SYMBOLS {
        quotes.subscribe(symbol.to_string(), None);
    }
    info!(%mode, symbols = quotes.len(), "subscribed");

    let running = AtomicBool::new(true);
    let published = AtomicU64::new(0);
    let started = Instant::now();

    thread::scope(|s| {
        thread::Builder::new()
            .name("feed".into())
            .spawn_scoped(s, || {
                let mut sequence = 0_u64;
                while running.load(Ordering::Relaxed) {
                    sequence += 1;
                    let symbol = SYMBOLS[(sequence % SYMBOLS.len() as u64) as usize];
                    let mid = 100 + sequence % 17;

                    quotes.publish(symbol, (mid, sequence), |_, (mid, sequence), _| {
                        Some(Arc::new(Quote {
                            bid: mid - 1,
                            ask: mid + 1,
                            sequence,
                        }))
                    });
                    published.fetch_add(1, Ordering::Relaxed);
                }
            })
            .expect("failed to spawn feed thread");

        for id in 0..STRATEGIES {
            let (quotes, running) = (&quotes, &running);
            thread::Builder::new()
                .name(format!("strategy-{id}"))
                .spawn_scoped(s, move || {
                    let mut reads = 0_u64;
                    let mut crossed = 0_u64;
                    while running.load(Ordering::Relaxed) {
                        for symbol in SYMBOLS {
                            let spread =
                                quotes.try_read(symbol, (), |_, _, q| q.ask as i64 - q.bid as i64);
                            match spread {
                                Some(spread) if spread <= 0 => crossed += 1,
                                Some(_) => reads += 1,
                                None => {}
                            }
                        }
                    }
                    if crossed > 0 {
                        warn!(crossed, "saw crossed quotes");
                    }
                    info!(reads, "strategy finished");
                })
                .expect("failed to spawn strategy thread");
        }

        thread::sleep(Duration::from_secs(1));
        running.store(false, Ordering::Relaxed);
    });

    let elapsed = started.elapsed();
    info!(
        published = published.load(Ordering::Relaxed),
        elapsed_ms = elapsed.as_millis() as u64,
        "feed finished"
    );

    for symbol in SYMBOLS {
        let guard = quotes.read(symbol);
        if let Some(quote) = guard.data() {
            info!(
                symbol,
                bid = quote.bid,
                ask = quote.ask,
                sequence = quote.sequence,
                "last quote"
            );
        }
    }

    Ok(())
}
