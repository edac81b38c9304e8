use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use grantauth_models::Identity;
use grantauth_sdk::sim::{ScriptedProvider, ScriptedWallet};
use grantauth_sdk::{
    AuthCoordinator, BroadcastBus, CoordinatorConfig, JetStreamStorage, LocalBus, MemoryStorage,
    NatsBus, SharedStorage, SystemClock,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Parser, Debug, Clone)]
#[command(name = "grantauth-loadtest")]
#[command(about = "Races execution contexts through sign-in and counts duplicate drivers")]
struct Args {
    #[arg(long, value_enum, default_value_t = Backend::Memory)]
    backend: Backend,

    #[arg(long, default_value = "nats://localhost:4222")]
    nats_url: String,

    #[arg(long, default_value = "grantauth-loadtest")]
    namespace: String,

    #[arg(long, default_value_t = 200)]
    trials: usize,

    #[arg(long, default_value_t = 2)]
    contexts: usize,

    /// Later contexts start up to this many milliseconds after the first.
    #[arg(long, default_value_t = 100)]
    spread_ms: u64,

    /// Per-operation latency of the in-memory backend.
    #[arg(long, default_value_t = 50)]
    storage_latency_us: u64,

    #[arg(long, default_value_t = 20)]
    provider_latency_ms: u64,

    #[arg(long, default_value_t = 0)]
    sign_delay_ms: u64,

    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    /// Fail when fewer trials than this end with exactly one driver.
    #[arg(long, default_value_t = 0.95)]
    min_single_ratio: f64,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum Backend {
    /// In-process storage and bus.
    Memory,
    /// JetStream KV storage and NATS pub/sub.
    Nats,
}

/// One simulated tab.
struct Context {
    coordinator: AuthCoordinator,
    wallet: Arc<ScriptedWallet>,
    _listener: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct Tally {
    trials: usize,
    single_driver: usize,
    multi_driver: usize,
    no_driver: usize,
    failures: usize,
    durations_ms: Vec<u64>,
}

impl Tally {
    fn record(&mut self, drivers: usize, failures: usize, elapsed: Duration) {
        self.trials += 1;
        match drivers {
            0 => self.no_driver += 1,
            1 => self.single_driver += 1,
            _ => self.multi_driver += 1,
        }
        self.failures += failures;
        self.durations_ms
            .push(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    }

    fn single_ratio(&self) -> f64 {
        if self.trials == 0 {
            return 0.0;
        }
        self.single_driver as f64 / self.trials as f64
    }
}

fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    println!(
        "Starting race test: backend={:?}, contexts={}, trials={}, spread={}ms, seed={:#x}",
        args.backend, args.contexts, args.trials, args.spread_ms, args.seed
    );

    let tally = run(&args).await?;
    report(&tally);

    let ratio = tally.single_ratio();
    if ratio < args.min_single_ratio {
        return Err(anyhow!(
            "single-driver ratio {ratio:.3} below required {:.3}",
            args.min_single_ratio
        ));
    }
    Ok(())
}

async fn run(args: &Args) -> Result<Tally> {
    if args.contexts < 2 {
        return Err(anyhow!("at least two contexts are needed to race"));
    }
    let contexts = build_contexts(args).await?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let run_id = rng.gen_range(0..u32::MAX);
    let mut tally = Tally::default();

    for trial in 0..args.trials {
        // Fresh identity per trial so earlier credentials never short-circuit.
        let identity = Identity::new(&format!("0xload{run_id:08x}{trial:05}"));
        let offsets: Vec<Duration> = (0..contexts.len())
            .map(|i| {
                if i == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rng.gen_range(0..=args.spread_ms))
                }
            })
            .collect();

        let (drivers, failures, elapsed) = run_trial(&contexts, &identity, &offsets).await;
        tally.record(drivers, failures, elapsed);
        if drivers != 1 {
            info!(trial, drivers, ?offsets, "trial did not have a single driver");
        }
    }
    Ok(tally)
}

async fn build_contexts(args: &Args) -> Result<Vec<Context>> {
    let config = CoordinatorConfig {
        namespace: args.namespace.clone(),
        ..CoordinatorConfig::default()
    };

    let (storage, buses): (Arc<dyn SharedStorage>, Vec<Option<Arc<dyn BroadcastBus>>>) =
        match args.backend {
            Backend::Memory => {
                let storage =
                    MemoryStorage::with_latency(Duration::from_micros(args.storage_latency_us));
                let bus: Arc<dyn BroadcastBus> = Arc::new(LocalBus::new());
                (Arc::new(storage), vec![Some(bus); args.contexts])
            }
            Backend::Nats => {
                let client = async_nats::connect(&args.nats_url).await?;
                let storage = JetStreamStorage::open(client, &args.namespace).await?;
                let mut buses = Vec::with_capacity(args.contexts);
                for _ in 0..args.contexts {
                    match NatsBus::connect(&args.nats_url, &args.namespace).await {
                        Ok(bus) => buses.push(Some(Arc::new(bus) as Arc<dyn BroadcastBus>)),
                        Err(e) => {
                            warn!(error = %e, "bus unavailable, context will poll only");
                            buses.push(None);
                        }
                    }
                }
                (Arc::new(storage), buses)
            }
        };

    let mut contexts = Vec::with_capacity(args.contexts);
    for bus in buses {
        let wallet = Arc::new(
            ScriptedWallet::connected().with_sign_delay(Duration::from_millis(args.sign_delay_ms)),
        );
        let provider = Arc::new(
            ScriptedProvider::new(Arc::new(SystemClock))
                .with_latency(Duration::from_millis(args.provider_latency_ms)),
        );
        let coordinator = AuthCoordinator::builder(storage.clone(), wallet.clone(), provider)
            .config(config.clone())
            .maybe_bus(bus)
            .build();
        let listener = coordinator.start_listener().await;
        contexts.push(Context {
            coordinator,
            wallet,
            _listener: listener,
        });
    }
    Ok(contexts)
}

/// Start every context on `identity` after its offset; return the number of
/// signatures, the number of failed contexts and the wall time.
async fn run_trial(
    contexts: &[Context],
    identity: &Identity,
    offsets: &[Duration],
) -> (usize, usize, Duration) {
    let before: Vec<usize> = contexts.iter().map(|c| c.wallet.sign_count()).collect();
    let start = Instant::now();

    let attempts = contexts.iter().zip(offsets).map(|(ctx, offset)| {
        let coordinator = ctx.coordinator.clone();
        let identity = identity.clone();
        let offset = *offset;
        async move {
            tokio::time::sleep(offset).await;
            coordinator.authenticate(&identity).await
        }
    });
    let results = futures::future::join_all(attempts).await;
    let elapsed = start.elapsed();

    let drivers = contexts
        .iter()
        .zip(before)
        .map(|(c, b)| c.wallet.sign_count() - b)
        .sum();
    let mut failures = 0;
    for e in results.iter().filter_map(|r| r.as_ref().err()) {
        warn!(identity = %identity, error = %e, "context failed");
        failures += 1;
    }
    (drivers, failures, elapsed)
}

fn report(tally: &Tally) {
    let mut durations = tally.durations_ms.clone();
    durations.sort_unstable();

    println!("\n=== Race test report ===");
    println!(
        "trials={} single_driver={} multi_driver={} no_driver={} failures={}",
        tally.trials, tally.single_driver, tally.multi_driver, tally.no_driver, tally.failures
    );
    println!("single_driver_ratio={:.3}", tally.single_ratio());
    println!(
        "trial_ms: p50={} p95={} max={}",
        percentile(&durations, 0.50),
        percentile(&durations, 0.95),
        durations.last().copied().unwrap_or(0),
    );
    if tally.failures > 0 {
        println!("diagnostic: some contexts failed; rerun with RUST_LOG=grantauth_sdk=debug for details");
    }
}
