use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub dry_run: DryRunConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Symbols to trade (e.g., ["BTCUSDT", "ETHUSDT"])
    pub symbols: Vec<String>,
    /// Seconds between decision cycles
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    /// Candles requested per timeframe (must be >= 200)
    #[serde(default = "default_kline_limit")]
    pub kline_limit: usize,
}

fn default_cycle_interval_secs() -> u64 {
    300
}

fn default_kline_limit() -> usize {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Futures REST endpoint
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Optional external endpoint for institutional netflow; missing means
    /// the sentiment sub-score runs without it
    #[serde(default)]
    pub netflow_url: Option<String>,
}

fn default_rest_url() -> String {
    "https://fapi.binance.com".to_string()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            api_key: None,
            api_secret: None,
            netflow_url: None,
        }
    }
}

/// Per-call timeouts for external I/O (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_klines_timeout_ms")]
    pub klines_ms: u64,
    #[serde(default = "default_aux_timeout_ms")]
    pub aux_ms: u64,
    #[serde(default = "default_predictor_timeout_ms")]
    pub predictor_ms: u64,
    #[serde(default = "default_advisor_timeout_ms")]
    pub advisor_ms: u64,
    #[serde(default = "default_order_timeout_ms")]
    pub order_ms: u64,
}

fn default_klines_timeout_ms() -> u64 {
    5_000
}

fn default_aux_timeout_ms() -> u64 {
    3_000
}

fn default_predictor_timeout_ms() -> u64 {
    2_000
}

fn default_advisor_timeout_ms() -> u64 {
    6_000
}

fn default_order_timeout_ms() -> u64 {
    5_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            klines_ms: default_klines_timeout_ms(),
            aux_ms: default_aux_timeout_ms(),
            predictor_ms: default_predictor_timeout_ms(),
            advisor_ms: default_advisor_timeout_ms(),
            order_ms: default_order_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Leverage applied to every opened position
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Fraction of balance committed as notional per trade (e.g., 0.10)
    #[serde(default = "default_position_size_pct")]
    pub position_size_pct: Decimal,
    /// Stop distance as a multiple of ATR(14)
    #[serde(default = "default_atr_stop_mult")]
    pub atr_stop_mult: f64,
    /// Take-profit distance as a multiple of the stop distance
    #[serde(default = "default_take_profit_rr")]
    pub take_profit_rr: f64,
    /// Maximum order submission attempts before the symbol is quarantined
    #[serde(default = "default_max_order_retries")]
    pub max_order_retries: u32,
}

fn default_leverage() -> u32 {
    3
}

fn default_position_size_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_atr_stop_mult() -> f64 {
    2.0
}

fn default_take_profit_rr() -> f64 {
    2.0
}

fn default_max_order_retries() -> u32 {
    3
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            leverage: default_leverage(),
            position_size_pct: default_position_size_pct(),
            atr_stop_mult: default_atr_stop_mult(),
            take_profit_rr: default_take_profit_rr(),
            max_order_retries: default_max_order_retries(),
        }
    }
}

/// Hard limits enforced by the risk auditor
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    /// Leverage above this raises a warning without blocking
    #[serde(default = "default_warn_leverage")]
    pub warn_leverage: u32,
    /// Stop distance bounds as a fraction of entry price
    #[serde(default = "default_min_stop_distance_pct")]
    pub min_stop_distance_pct: Decimal,
    #[serde(default = "default_max_stop_distance_pct")]
    pub max_stop_distance_pct: Decimal,
    /// Required margin must stay below this fraction of balance
    #[serde(default = "default_margin_buffer")]
    pub margin_buffer: Decimal,
    /// Notional cap as a fraction of balance
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: Decimal,
    /// Worst-case loss cap as a fraction of balance
    #[serde(default = "default_max_total_risk_pct")]
    pub max_total_risk_pct: Decimal,
    /// Account drawdown that halts new entries
    #[serde(default = "default_stop_trading_drawdown_pct")]
    pub stop_trading_drawdown_pct: Decimal,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
}

fn default_max_leverage() -> u32 {
    10
}

fn default_warn_leverage() -> u32 {
    5
}

fn default_min_stop_distance_pct() -> Decimal {
    Decimal::new(5, 3) // 0.005
}

fn default_max_stop_distance_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_margin_buffer() -> Decimal {
    Decimal::new(95, 2) // 0.95
}

fn default_max_position_pct() -> Decimal {
    Decimal::new(30, 2) // 0.30
}

fn default_max_total_risk_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_stop_trading_drawdown_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_max_consecutive_losses() -> u32 {
    3
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_leverage: default_max_leverage(),
            warn_leverage: default_warn_leverage(),
            min_stop_distance_pct: default_min_stop_distance_pct(),
            max_stop_distance_pct: default_max_stop_distance_pct(),
            margin_buffer: default_margin_buffer(),
            max_position_pct: default_max_position_pct(),
            max_total_risk_pct: default_max_total_risk_pct(),
            stop_trading_drawdown_pct: default_stop_trading_drawdown_pct(),
            max_consecutive_losses: default_max_consecutive_losses(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PredictorConfig {
    /// Path to a JSON dense-network model; absent means rule fallback only
    #[serde(default)]
    pub model_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdvisorConfig {
    /// Enable the optional LLM confidence advisor
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Root directory for append-only artifact logs
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
}

fn default_artifact_dir() -> String {
    "./data/artifacts".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional directory for daily-rolling log files
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunConfig {
    /// Enable dry run mode (no real orders)
    pub enabled: bool,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from either a config directory or a single TOML file
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_path = config_dir.as_ref();

        let mut builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("engine.cycle_interval_secs", 300)?
            .set_default("engine.kline_limit", 250)?
            .set_default("dry_run.enabled", true)?;

        // Accept either a config directory (`config/`) or a single TOML file.
        if config_path.is_file() {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::from(config_path.join("default.toml")).required(false))
                .add_source(
                    File::from(config_path.join(
                        std::env::var("HELIX_ENV").unwrap_or_else(|_| "development".to_string()),
                    ))
                    .required(false),
                );
        }

        builder = builder.add_source(
            // Override with environment variables (HELIX_EXCHANGE__API_KEY, etc.)
            Environment::with_prefix("HELIX")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("engine.symbols")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(dry_run: bool, symbols: Vec<String>) -> Self {
        Self {
            engine: EngineConfig {
                symbols,
                cycle_interval_secs: default_cycle_interval_secs(),
                kline_limit: default_kline_limit(),
            },
            exchange: ExchangeConfig {
                rest_url: default_rest_url(),
                api_key: None,
                api_secret: None,
                netflow_url: None,
            },
            timeouts: TimeoutConfig::default(),
            trading: TradingConfig {
                leverage: default_leverage(),
                position_size_pct: default_position_size_pct(),
                atr_stop_mult: default_atr_stop_mult(),
                take_profit_rr: default_take_profit_rr(),
                max_order_retries: default_max_order_retries(),
            },
            risk: RiskConfig::default(),
            predictor: PredictorConfig::default(),
            advisor: AdvisorConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
            dry_run: DryRunConfig { enabled: dry_run },
        }
    }

    /// Validate configuration values. Returns all problems, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.engine.symbols.is_empty() {
            errors.push("engine.symbols must not be empty".to_string());
        }
        if self.engine.kline_limit < 200 {
            errors.push(format!(
                "engine.kline_limit must be >= 200 for indicator stability, got {}",
                self.engine.kline_limit
            ));
        }

        if self.trading.leverage == 0 {
            errors.push("trading.leverage must be >= 1".to_string());
        }
        if self.trading.leverage > self.risk.max_leverage {
            errors.push(format!(
                "trading.leverage {} exceeds risk.max_leverage {}",
                self.trading.leverage, self.risk.max_leverage
            ));
        }
        if self.trading.position_size_pct <= Decimal::ZERO
            || self.trading.position_size_pct > Decimal::ONE
        {
            errors.push("trading.position_size_pct must be in (0, 1]".to_string());
        }
        if self.trading.atr_stop_mult <= 0.0 {
            errors.push("trading.atr_stop_mult must be > 0".to_string());
        }
        if self.trading.take_profit_rr <= 0.0 {
            errors.push("trading.take_profit_rr must be > 0".to_string());
        }

        if self.risk.min_stop_distance_pct >= self.risk.max_stop_distance_pct {
            errors.push(format!(
                "risk.min_stop_distance_pct {} must be below risk.max_stop_distance_pct {}",
                self.risk.min_stop_distance_pct, self.risk.max_stop_distance_pct
            ));
        }
        if self.risk.margin_buffer <= Decimal::ZERO || self.risk.margin_buffer > Decimal::ONE {
            errors.push("risk.margin_buffer must be in (0, 1]".to_string());
        }
        if self.risk.max_position_pct <= Decimal::ZERO {
            errors.push("risk.max_position_pct must be positive".to_string());
        }
        if self.risk.max_total_risk_pct <= Decimal::ZERO {
            errors.push("risk.max_total_risk_pct must be positive".to_string());
        }

        if !self.dry_run.enabled
            && (self.exchange.api_key.is_none() || self.exchange.api_secret.is_none())
        {
            errors.push("live trading requires exchange.api_key and exchange.api_secret".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
