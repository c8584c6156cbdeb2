//! Layered configuration for the per-user trading orchestrator: built-in
//! defaults < sport config < market-level override < runtime override,
//! producing the `EffectiveConfig` a single Decision Engine evaluation
//! consumes. Loaded from TOML plus environment variables via the `config`
//! crate (`PLOY_*` env vars override file values).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::EffectiveConfig;
use crate::exchange::ExchangeKind;

/// Top-level configuration for one user's bot instance.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub user_id: String,
    pub exchange: ExchangeConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scoreboard: ScoreboardConfig,
    pub global: GlobalSettings,
    /// Keyed by sport identifier (lowercase, e.g. "nba").
    #[serde(default)]
    pub sports: HashMap<String, SportConfig>,
    /// Keyed by condition id; sparse, only markets with an explicit override.
    #[serde(default)]
    pub market_overrides: HashMap<String, MarketOverride>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health-check server port, out of scope for this core but kept as a
    /// named collaborator seam (§1 out-of-scope HTTP surface).
    #[serde(default)]
    pub health_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_kind")]
    pub kind: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
}

fn default_exchange_kind() -> String {
    "kalshi".to_string()
}

impl ExchangeConfig {
    pub fn kind(&self) -> crate::error::Result<ExchangeKind> {
        crate::exchange::parse_exchange_kind(&self.kind)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Scoreboard client configuration: cache TTL and the per-sport "group id"
/// parameter used to fetch unranked college teams.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreboardConfig {
    #[serde(default = "default_scoreboard_base_url")]
    pub base_url: String,
    #[serde(default = "default_scoreboard_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Sport -> group id (e.g. NCAA football "80" for FBS).
    #[serde(default)]
    pub college_group_ids: HashMap<String, String>,
}

fn default_scoreboard_base_url() -> String {
    "https://site.api.espn.com/apis/site/v2/sports".to_string()
}

fn default_scoreboard_cache_ttl_secs() -> u64 {
    30
}

impl Default for ScoreboardConfig {
    fn default() -> Self {
        Self {
            base_url: default_scoreboard_base_url(),
            cache_ttl_secs: default_scoreboard_cache_ttl_secs(),
            college_group_ids: HashMap::new(),
        }
    }
}

/// Per-user global risk settings (§6.2 `global_settings` table).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub bot_enabled: bool,
    pub max_daily_loss_usdc: Decimal,
    pub max_portfolio_exposure_usdc: Decimal,
    #[serde(default = "default_max_slippage_pct")]
    pub max_slippage_pct: Decimal,
    #[serde(default = "default_order_fill_timeout_seconds")]
    pub order_fill_timeout_seconds: u64,
    #[serde(default)]
    pub auto_trade_all: bool,
    /// Selected scoreboard event ids the user wants tracked regardless of
    /// auto-discovery (§4.10 recovery step 2).
    #[serde(default)]
    pub selected_event_ids: Vec<String>,
    #[serde(default = "default_max_tracked_games")]
    pub max_tracked_games: usize,
}

fn default_max_slippage_pct() -> Decimal {
    dec!(0.02)
}

fn default_order_fill_timeout_seconds() -> u64 {
    60
}

fn default_max_tracked_games() -> usize {
    100
}

/// Per-sport configuration layer (§6.2 `sport_configs`); fields not set
/// here fall back to the built-in default in [`EffectiveConfig::defaults`].
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: u8,
    pub daily_loss_cap: Decimal,
    pub exposure_cap: Decimal,
    #[serde(default)]
    pub auto_trade: Option<bool>,
    #[serde(default)]
    pub entry_threshold_drop_pct: Option<Decimal>,
    #[serde(default)]
    pub absolute_entry_price: Option<Decimal>,
    #[serde(default)]
    pub min_time_remaining_seconds: Option<u64>,
    #[serde(default)]
    pub latest_entry_cutoff_seconds: Option<u64>,
    #[serde(default)]
    pub latest_exit_cutoff_seconds: Option<u64>,
    #[serde(default)]
    pub allowed_entry_segments: Option<Vec<String>>,
    #[serde(default)]
    pub take_profit_pct: Option<Decimal>,
    #[serde(default)]
    pub stop_loss_pct: Option<Decimal>,
    #[serde(default)]
    pub default_position_size: Option<u64>,
    #[serde(default)]
    pub max_positions_per_game: Option<u32>,
    #[serde(default)]
    pub use_kelly_sizing: Option<bool>,
    #[serde(default)]
    pub kelly_fraction: Option<Decimal>,
    #[serde(default)]
    pub min_entry_confidence_score: Option<f64>,
    #[serde(default)]
    pub min_pregame_probability: Option<Decimal>,
    #[serde(default)]
    pub min_position_size_usdc: Option<Decimal>,
    #[serde(default)]
    pub max_position_size_usdc: Option<Decimal>,
}

fn default_true() -> bool {
    true
}

/// Per-market override (§6.2 `market_configs`); every field optional, layered
/// on top of the sport config.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MarketOverride {
    #[serde(default)]
    pub is_enabled: Option<bool>,
    #[serde(default)]
    pub auto_trade: Option<bool>,
    #[serde(default)]
    pub entry_threshold_drop_pct: Option<Decimal>,
    #[serde(default)]
    pub absolute_entry_price: Option<Decimal>,
    #[serde(default)]
    pub min_time_remaining_seconds: Option<u64>,
    #[serde(default)]
    pub allowed_entry_segments: Option<Vec<String>>,
    #[serde(default)]
    pub take_profit_pct: Option<Decimal>,
    #[serde(default)]
    pub stop_loss_pct: Option<Decimal>,
    #[serde(default)]
    pub default_position_size: Option<u64>,
    #[serde(default)]
    pub use_kelly_sizing: Option<bool>,
    #[serde(default)]
    pub kelly_fraction: Option<Decimal>,
    #[serde(default)]
    pub min_entry_confidence_score: Option<f64>,
    #[serde(default)]
    pub min_position_size_usdc: Option<Decimal>,
    #[serde(default)]
    pub max_position_size_usdc: Option<Decimal>,
}

/// A runtime override applied on top of market/sport config but below
/// nothing — the most specific layer, set e.g. by an operator command.
/// Not persisted; lives only for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverride {
    pub auto_trade: Option<bool>,
    pub entry_threshold_drop_pct: Option<Decimal>,
    pub use_kelly_sizing: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            log_dir: None,
        }
    }
}

/// Built-in defaults, the bottom layer of the `EffectiveConfig` stack.
fn builtin_defaults() -> EffectiveConfig {
    EffectiveConfig {
        is_enabled: true,
        auto_trade: false,
        entry_threshold_drop_pct: dec!(0.15),
        absolute_entry_price: dec!(0.30),
        min_time_remaining_seconds: 120,
        latest_entry_cutoff_seconds: 60,
        latest_exit_cutoff_seconds: 30,
        allowed_entry_segments: HashSet::new(),
        take_profit_pct: dec!(0.20),
        stop_loss_pct: dec!(0.15),
        default_position_size: 50,
        max_positions_per_game: 1,
        use_kelly_sizing: false,
        kelly_fraction: dec!(0.25),
        min_entry_confidence_score: 0.6,
        min_pregame_probability: None,
        min_position_size_usdc: dec!(1),
        max_position_size_usdc: dec!(1000),
    }
}

impl AppConfig {
    /// Build the `EffectiveConfig` for one market evaluation: default <
    /// sport < market override < runtime override (§3, §9). Computed fresh
    /// every call rather than cached, so it is never stale.
    pub fn effective_config(
        &self,
        sport: &str,
        condition_id: &str,
        runtime: Option<&RuntimeOverride>,
    ) -> EffectiveConfig {
        let mut cfg = builtin_defaults();

        if let Some(sport_cfg) = self.sports.get(sport) {
            cfg.is_enabled = sport_cfg.enabled;
            if let Some(v) = sport_cfg.auto_trade {
                cfg.auto_trade = v;
            }
            if let Some(v) = sport_cfg.entry_threshold_drop_pct {
                cfg.entry_threshold_drop_pct = v;
            }
            if let Some(v) = sport_cfg.absolute_entry_price {
                cfg.absolute_entry_price = v;
            }
            if let Some(v) = sport_cfg.min_time_remaining_seconds {
                cfg.min_time_remaining_seconds = v;
            }
            if let Some(v) = sport_cfg.latest_entry_cutoff_seconds {
                cfg.latest_entry_cutoff_seconds = v;
            }
            if let Some(v) = sport_cfg.latest_exit_cutoff_seconds {
                cfg.latest_exit_cutoff_seconds = v;
            }
            if let Some(ref v) = sport_cfg.allowed_entry_segments {
                cfg.allowed_entry_segments = v.iter().cloned().collect();
            }
            if let Some(v) = sport_cfg.take_profit_pct {
                cfg.take_profit_pct = v;
            }
            if let Some(v) = sport_cfg.stop_loss_pct {
                cfg.stop_loss_pct = v;
            }
            if let Some(v) = sport_cfg.default_position_size {
                cfg.default_position_size = v;
            }
            if let Some(v) = sport_cfg.max_positions_per_game {
                cfg.max_positions_per_game = v;
            }
            if let Some(v) = sport_cfg.use_kelly_sizing {
                cfg.use_kelly_sizing = v;
            }
            if let Some(v) = sport_cfg.kelly_fraction {
                cfg.kelly_fraction = v;
            }
            if let Some(v) = sport_cfg.min_entry_confidence_score {
                cfg.min_entry_confidence_score = v;
            }
            if sport_cfg.min_pregame_probability.is_some() {
                cfg.min_pregame_probability = sport_cfg.min_pregame_probability;
            }
            if let Some(v) = sport_cfg.min_position_size_usdc {
                cfg.min_position_size_usdc = v;
            }
            if let Some(v) = sport_cfg.max_position_size_usdc {
                cfg.max_position_size_usdc = v;
            }
        }

        if let Some(market) = self.market_overrides.get(condition_id) {
            if let Some(v) = market.is_enabled {
                cfg.is_enabled = v;
            }
            if let Some(v) = market.auto_trade {
                cfg.auto_trade = v;
            }
            if let Some(v) = market.entry_threshold_drop_pct {
                cfg.entry_threshold_drop_pct = v;
            }
            if let Some(v) = market.absolute_entry_price {
                cfg.absolute_entry_price = v;
            }
            if let Some(v) = market.min_time_remaining_seconds {
                cfg.min_time_remaining_seconds = v;
            }
            if let Some(ref v) = market.allowed_entry_segments {
                cfg.allowed_entry_segments = v.iter().cloned().collect();
            }
            if let Some(v) = market.take_profit_pct {
                cfg.take_profit_pct = v;
            }
            if let Some(v) = market.stop_loss_pct {
                cfg.stop_loss_pct = v;
            }
            if let Some(v) = market.default_position_size {
                cfg.default_position_size = v;
            }
            if let Some(v) = market.use_kelly_sizing {
                cfg.use_kelly_sizing = v;
            }
            if let Some(v) = market.kelly_fraction {
                cfg.kelly_fraction = v;
            }
            if let Some(v) = market.min_entry_confidence_score {
                cfg.min_entry_confidence_score = v;
            }
            if let Some(v) = market.min_position_size_usdc {
                cfg.min_position_size_usdc = v;
            }
            if let Some(v) = market.max_position_size_usdc {
                cfg.max_position_size_usdc = v;
            }
        }

        if let Some(runtime) = runtime {
            if let Some(v) = runtime.auto_trade {
                cfg.auto_trade = v;
            }
            if let Some(v) = runtime.entry_threshold_drop_pct {
                cfg.entry_threshold_drop_pct = v;
            }
            if let Some(v) = runtime.use_kelly_sizing {
                cfg.use_kelly_sizing = v;
            }
        }

        cfg
    }

    /// Load configuration from files and environment: `config` + TOML +
    /// `PLOY_*` env layering.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_path = config_dir.as_ref();

        let mut builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .set_default("exchange.kind", "kalshi")?
            .set_default("dry_run", true)?;

        if config_path.is_file() {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::from(config_path.join("default.toml")).required(false))
                .add_source(
                    File::from(config_path.join(
                        std::env::var("PLOY_ENV").unwrap_or_else(|_| "development".to_string()),
                    ))
                    .required(false),
                );
        }

        builder = builder.add_source(
            Environment::with_prefix("PLOY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("global.selected_event_ids")
                .try_parsing(true),
        );

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool(&["PLOY_DRY_RUN", "DRY_RUN"]) {
            self.dry_run = v;
        }
        if let Some(v) = env_string(&["PLOY_EXCHANGE__API_KEY", "KALSHI_API_KEY"]) {
            self.exchange.api_key = Some(v);
        }
        if let Some(v) = env_string(&["PLOY_EXCHANGE__API_SECRET", "KALSHI_API_SECRET"]) {
            self.exchange.api_secret = Some(v);
        }
        if let Some(v) = env_string(&["PLOY_DATABASE__URL", "DATABASE_URL"]) {
            self.database.url = v;
        }
        if let Some(v) = env_string(&["PLOY_DATABASE__MAX_CONNECTIONS"]).and_then(|raw| raw.parse::<u32>().ok()) {
            self.database.max_connections = v;
        }
        if let Some(v) = env_u16(&["PLOY_HEALTH_PORT"]) {
            self.health_port = Some(v);
        }
    }
}

fn env_string(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(v) = std::env::var(key) {
            return Some(v);
        }
    }
    None
}

fn env_u16(keys: &[&str]) -> Option<u16> {
    env_string(keys).and_then(|v| v.parse::<u16>().ok())
}

fn env_bool(keys: &[&str]) -> Option<bool> {
    env_string(keys).and_then(|v| parse_bool_like(&v))
}

fn parse_bool_like(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            user_id: "u1".into(),
            exchange: ExchangeConfig {
                kind: "kalshi".into(),
                base_url: None,
                api_key: None,
                api_secret: None,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/trader".into(),
                max_connections: 5,
            },
            scoreboard: ScoreboardConfig::default(),
            global: GlobalSettings {
                bot_enabled: true,
                max_daily_loss_usdc: dec!(500),
                max_portfolio_exposure_usdc: dec!(2000),
                max_slippage_pct: dec!(0.02),
                order_fill_timeout_seconds: 60,
                auto_trade_all: false,
                selected_event_ids: vec![],
                max_tracked_games: 100,
            },
            sports: HashMap::new(),
            market_overrides: HashMap::new(),
            dry_run: true,
            logging: LoggingConfig::default(),
            health_port: None,
        }
    }

    #[test]
    fn effective_config_falls_back_to_builtin_defaults_with_no_layers() {
        let app = base_config();
        let eff = app.effective_config("nba", "C1", None);
        assert_eq!(eff.entry_threshold_drop_pct, dec!(0.15));
        assert!(!eff.auto_trade);
    }

    #[test]
    fn sport_config_overrides_builtin_default() {
        let mut app = base_config();
        app.sports.insert(
            "nba".into(),
            SportConfig {
                enabled: true,
                daily_loss_cap: dec!(200),
                exposure_cap: dec!(1000),
                entry_threshold_drop_pct: Some(dec!(0.10)),
                auto_trade: Some(true),
                ..Default::default()
            },
        );
        let eff = app.effective_config("nba", "C1", None);
        assert_eq!(eff.entry_threshold_drop_pct, dec!(0.10));
        assert!(eff.auto_trade);
    }

    #[test]
    fn market_override_wins_over_sport_config() {
        let mut app = base_config();
        app.sports.insert(
            "nba".into(),
            SportConfig {
                enabled: true,
                daily_loss_cap: dec!(200),
                exposure_cap: dec!(1000),
                entry_threshold_drop_pct: Some(dec!(0.10)),
                ..Default::default()
            },
        );
        app.market_overrides.insert(
            "C1".into(),
            MarketOverride {
                entry_threshold_drop_pct: Some(dec!(0.05)),
                ..Default::default()
            },
        );
        let eff = app.effective_config("nba", "C1", None);
        assert_eq!(eff.entry_threshold_drop_pct, dec!(0.05));
    }

    #[test]
    fn runtime_override_wins_over_everything() {
        let mut app = base_config();
        app.market_overrides.insert(
            "C1".into(),
            MarketOverride {
                entry_threshold_drop_pct: Some(dec!(0.05)),
                ..Default::default()
            },
        );
        let runtime = RuntimeOverride {
            entry_threshold_drop_pct: Some(dec!(0.01)),
            ..Default::default()
        };
        let eff = app.effective_config("nba", "C1", Some(&runtime));
        assert_eq!(eff.entry_threshold_drop_pct, dec!(0.01));
    }

    #[test]
    fn parse_bool_like_accepts_common_spellings() {
        assert_eq!(parse_bool_like("yes"), Some(true));
        assert_eq!(parse_bool_like("off"), Some(false));
        assert_eq!(parse_bool_like("maybe"), None);
    }
}
