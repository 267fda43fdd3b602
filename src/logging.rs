//! Tracing setup: env-filtered console output plus an optional
//! daily-rolling file layer.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize the global subscriber. `RUST_LOG` wins over the configured
/// level; the file layer only attaches when its directory is writable.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn", config.level)));

    let file_layer = config.dir.as_deref().and_then(|dir| {
        // `tracing_appender::rolling::daily` panics when it cannot create
        // the first file, so writability is checked up front.
        if std::fs::create_dir_all(dir).is_err() {
            eprintln!("log dir {dir} not creatable, console logging only");
            return None;
        }
        let probe = std::path::Path::new(dir).join(".helix_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&probe) {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                let appender = tracing_appender::rolling::daily(dir, "helix.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                // Keep the flush guard alive for the process lifetime
                Box::leak(Box::new(guard));
                Some(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
            }
            Err(e) => {
                eprintln!("log dir {dir} not writable ({e}), console logging only");
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init();
}

/// Minimal logging for short-lived CLI invocations
pub fn init_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
