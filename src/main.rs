use clap::Parser;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use helix::adapters::{BinanceFuturesClient, OrderSink, ReplaySource, StubOrderSink};
use helix::agents::advisor::{ConfidenceAdvisor, HttpAdvisor};
use helix::agents::predict::{DensePredictor, Predictor};
use helix::cli::{parse_symbols, Cli, Commands};
use helix::config::AppConfig;
use helix::engine::{Orchestrator, Reconciler};
use helix::agents::PredictAgent;

const EXIT_CONFIG: i32 = 1;
const EXIT_RUNTIME: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let mut config = match AppConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return EXIT_CONFIG;
        }
    };

    match cli.command {
        Commands::Run { symbols, auto, dry_run } => {
            if let Some(raw) = symbols {
                config.engine.symbols = parse_symbols(&raw);
            } else if auto {
                // Auto-selection delegates to the externally maintained
                // selection in the config file.
                info!(symbols = ?config.engine.symbols, "using configured symbol selection");
            }
            if dry_run {
                config.dry_run.enabled = true;
            }
            if let Err(errors) = config.validate() {
                for problem in &errors {
                    eprintln!("configuration error: {problem}");
                }
                return EXIT_CONFIG;
            }

            helix::logging::init(&config.logging);
            match run_live(config).await {
                Ok(()) => 0,
                Err(e) => {
                    error!(error = %e, "unrecoverable runtime error");
                    EXIT_RUNTIME
                }
            }
        }
        Commands::Backtest { data, symbols, step_secs, cycles } => {
            config.engine.symbols = parse_symbols(&symbols);
            config.dry_run.enabled = true;
            if config.engine.symbols.is_empty() {
                eprintln!("configuration error: backtest needs at least one symbol");
                return EXIT_CONFIG;
            }

            helix::logging::init(&config.logging);
            match run_backtest(config, data, step_secs, cycles).await {
                Ok(()) => 0,
                Err(e) => {
                    error!(error = %e, "backtest failed");
                    EXIT_RUNTIME
                }
            }
        }
    }
}

async fn run_live(config: AppConfig) -> helix::Result<()> {
    let config = Arc::new(config);
    let client = Arc::new(BinanceFuturesClient::new(
        &config.exchange,
        config.dry_run.enabled,
    )?);

    let predictor: Option<Arc<dyn Predictor>> = match &config.predictor.model_path {
        Some(path) => match DensePredictor::load(path) {
            Ok(model) => {
                info!(path = %path, "predictor model loaded");
                Some(Arc::new(model))
            }
            Err(e) => {
                warn!(path = %path, error = %e, "predictor unavailable, rule fallback only");
                None
            }
        },
        None => None,
    };
    let predict = PredictAgent::new(
        predictor,
        Duration::from_millis(config.timeouts.predictor_ms),
    );

    let advisor: Option<Arc<dyn ConfidenceAdvisor>> = if config.advisor.enabled {
        match &config.advisor.endpoint {
            Some(endpoint) => Some(Arc::new(HttpAdvisor::new(endpoint.clone())?)),
            None => {
                warn!("advisor enabled without endpoint, ignoring");
                None
            }
        }
    } else {
        None
    };

    // Seed the reconciler with the live balance when reachable
    let initial_equity = match client.get_balance().await {
        Ok(balance) => balance,
        Err(e) => {
            warn!(error = %e, "balance unavailable at startup, assuming 10k");
            dec!(10_000)
        }
    };
    let (reconciler, outcome_tx, ledger_rx) = Reconciler::new(initial_equity);
    let reconciler_handle = tokio::spawn(reconciler.run());

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        client.clone(),
        client,
        predict,
        advisor,
        ledger_rx,
        outcome_tx,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, letting in-flight orders finish");
        let _ = shutdown_tx.send(true);
    });

    orchestrator.run(shutdown_rx).await?;
    reconciler_handle.abort();
    Ok(())
}

async fn run_backtest(
    config: AppConfig,
    data: std::path::PathBuf,
    step_secs: u64,
    cycles: Option<u64>,
) -> helix::Result<()> {
    let source = Arc::new(ReplaySource::load_dir(&data, &config.engine.symbols)?);
    let sink = Arc::new(StubOrderSink::new(dec!(10_000)));
    let config = Arc::new(config);

    let predict = PredictAgent::new(None, Duration::from_millis(config.timeouts.predictor_ms));
    let (reconciler, outcome_tx, ledger_rx) = Reconciler::new(dec!(10_000));
    let reconciler_handle = tokio::spawn(reconciler.run());

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        source.clone(),
        sink.clone(),
        predict,
        None,
        ledger_rx,
        outcome_tx,
    ));

    let step = chrono::Duration::seconds(step_secs as i64);
    let mut completed: u64 = 0;
    loop {
        if let Some(limit) = cycles {
            if completed >= limit {
                break;
            }
        }
        orchestrator.clone().run_cycle().await;
        completed += 1;
        source.advance_to(source.cursor() + step);
        if completed % 100 == 0 {
            info!(completed, orders = sink.order_count(), "backtest progress");
        }
        if cycles.is_none() && completed >= 10_000 {
            warn!("backtest cycle cap reached");
            break;
        }
    }

    info!(
        cycles = completed,
        orders = sink.order_count(),
        "backtest finished"
    );
    reconciler_handle.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
