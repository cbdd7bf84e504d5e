use crate::monitor::error::{MonitorError, MonitorResult};
use crate::monitor::retry::RetryPolicy;
use crate::types::type_tag::{normalize_type, parse_struct_tag};
use crate::types::{
    FunctionTarget, MonitorConfig, PayloadShape, RaffleSettings, SortOrder, StoreKind,
    TelegramSettings, VenueConfig, VenueSelector,
};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use url::Url;

/// Largest page the node serves for a single query
const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
struct RawConfig {
    monitor: RawMonitorConfig,
    retry: Option<RawRetryConfig>,
    store: Option<RawStoreConfig>,
    telegram: Option<RawTelegramConfig>,
    raffle: Option<RawRaffleConfig>,
    logging: Option<LoggingConfig>,
    #[serde(default)]
    venues: Vec<RawVenueConfig>,
}

#[derive(Debug, Deserialize)]
struct RawMonitorConfig {
    rpc_endpoint: Option<String>,
    tracked_token: Option<String>,
    token_symbol: Option<String>,
    token_decimals: Option<u32>,
    max_pages: Option<usize>,
    page_size: Option<usize>,
    order: Option<SortOrder>,
    backfill: Option<bool>,
    poll_interval_secs: Option<u64>,
    concurrent_venues: Option<bool>,
    tx_cache_capacity: Option<usize>,
    explorer_tx_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRetryConfig {
    base_delay_ms: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawStoreConfig {
    kind: Option<StoreKind>,
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawTelegramConfig {
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct RawRaffleConfig {
    enabled: Option<bool>,
    prize: Option<Decimal>,
    duration_hours: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawFilterKind {
    #[default]
    Event,
    Module,
    MoveFunction,
}

#[derive(Debug, Deserialize)]
struct RawVenueConfig {
    name: String,
    event_type: Option<String>,
    #[serde(default)]
    filter: RawFilterKind,
    payload: Option<PayloadShape>,
    function: Option<FunctionTarget>,
}

/// Load configuration from a TOML file, with `WATCHER__SECTION__KEY`
/// environment variables taking precedence
pub fn load_config<P: AsRef<Path>>(path: P) -> MonitorResult<MonitorConfig> {
    info!("Loading configuration from {:?}", path.as_ref());

    let config = Config::builder()
        .add_source(File::from(path.as_ref()))
        .add_source(
            Environment::with_prefix("WATCHER")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| MonitorError::ConfigError(format!("Failed to load config: {}", e)))?;

    let monitor_config = from_config(config)?;

    info!("Configuration loaded successfully");
    info!("Tracked token: {}", monitor_config.tracked_token);
    info!("RPC endpoint: {}", monitor_config.rpc_endpoint);
    info!("Venues: {}", monitor_config.venues.len());

    Ok(monitor_config)
}

fn from_config(config: Config) -> MonitorResult<MonitorConfig> {
    let raw: RawConfig = config
        .try_deserialize()
        .map_err(|e| MonitorError::ConfigError(format!("Failed to parse config: {}", e)))?;
    validate(raw)
}

fn validate(raw: RawConfig) -> MonitorResult<MonitorConfig> {
    let defaults = MonitorConfig::default();
    let monitor = raw.monitor;

    let tracked_token = monitor
        .tracked_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| MonitorError::ConfigError("monitor.tracked_token is required".to_string()))?;
    if parse_struct_tag(&normalize_type(&tracked_token)).is_none() {
        return Err(MonitorError::ConfigError(format!(
            "Invalid tracked token type (expected 0x<address>::module::Name): {}",
            tracked_token
        )));
    }

    let rpc_endpoint = monitor.rpc_endpoint.unwrap_or(defaults.rpc_endpoint);
    validate_http_url("monitor.rpc_endpoint", &rpc_endpoint)?;

    let explorer_tx_url = monitor.explorer_tx_url.unwrap_or(defaults.explorer_tx_url);
    validate_http_url("monitor.explorer_tx_url", &explorer_tx_url)?;

    let max_pages = monitor.max_pages.unwrap_or(defaults.max_pages);
    if max_pages == 0 {
        return Err(MonitorError::ConfigError(
            "monitor.max_pages must be at least 1".to_string(),
        ));
    }

    let page_size = monitor.page_size.unwrap_or(defaults.page_size);
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(MonitorError::ConfigError(format!(
            "monitor.page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let token_decimals = monitor.token_decimals.unwrap_or(defaults.token_decimals);
    if token_decimals > 28 {
        return Err(MonitorError::ConfigError(
            "monitor.token_decimals must be at most 28".to_string(),
        ));
    }

    let retry = match raw.retry {
        Some(r) => RetryPolicy::new(
            Duration::from_millis(r.base_delay_ms.unwrap_or(200)),
            r.max_retries.unwrap_or(defaults.retry.max_retries),
        ),
        None => defaults.retry,
    };

    let (store_kind, store_path) = match raw.store {
        Some(s) => (
            s.kind.unwrap_or(defaults.store_kind),
            s.path.unwrap_or(defaults.store_path),
        ),
        None => (defaults.store_kind, defaults.store_path),
    };

    let telegram = match raw.telegram {
        Some(t) if t.bot_token.trim().is_empty() || t.chat_id.trim().is_empty() => {
            return Err(MonitorError::ConfigError(
                "telegram.bot_token and telegram.chat_id must both be set".to_string(),
            ));
        }
        Some(t) => Some(TelegramSettings {
            bot_token: t.bot_token,
            chat_id: t.chat_id,
        }),
        None => None,
    };

    let raffle = match raw.raffle {
        Some(r) if r.enabled.unwrap_or(false) => {
            let duration_hours = r.duration_hours.unwrap_or(24);
            if duration_hours == 0 {
                return Err(MonitorError::ConfigError(
                    "raffle.duration_hours must be at least 1".to_string(),
                ));
            }
            Some(RaffleSettings {
                prize: r.prize.unwrap_or_default(),
                duration_hours,
            })
        }
        _ => None,
    };

    let venues = validate_venues(raw.venues)?;
    if venues.is_empty() {
        return Err(MonitorError::ConfigError(
            "At least one [[venues]] entry is required".to_string(),
        ));
    }

    Ok(MonitorConfig {
        rpc_endpoint,
        tracked_token,
        token_symbol: monitor.token_symbol.unwrap_or(defaults.token_symbol),
        token_decimals,
        max_pages,
        page_size,
        order: monitor.order.unwrap_or_default(),
        backfill: monitor.backfill.unwrap_or(defaults.backfill),
        poll_interval_secs: monitor.poll_interval_secs.unwrap_or(defaults.poll_interval_secs),
        concurrent_venues: monitor.concurrent_venues.unwrap_or(defaults.concurrent_venues),
        tx_cache_capacity: monitor.tx_cache_capacity.unwrap_or(defaults.tx_cache_capacity),
        explorer_tx_url,
        request_timeout_secs: monitor
            .request_timeout_secs
            .unwrap_or(defaults.request_timeout_secs),
        retry,
        store_kind,
        store_path,
        telegram,
        raffle,
        log_level: raw
            .logging
            .and_then(|l| l.level)
            .unwrap_or(defaults.log_level),
        venues,
    })
}

fn validate_http_url(field: &str, value: &str) -> MonitorResult<()> {
    let url = Url::parse(value)
        .map_err(|e| MonitorError::ConfigError(format!("Invalid {} {:?}: {}", field, value, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(MonitorError::ConfigError(format!(
            "{} must use http or https, got {}",
            field, other
        ))),
    }
}

/// Structural checks only. Unparseable event types are left for the watcher
/// build so one bad venue does not stop the rest.
fn validate_venues(raw: Vec<RawVenueConfig>) -> MonitorResult<Vec<VenueConfig>> {
    let mut names = HashSet::new();
    let mut venues = Vec::with_capacity(raw.len());

    for venue in raw {
        let name = venue.name.trim().to_string();
        if name.is_empty() {
            return Err(MonitorError::ConfigError(
                "Venue name must not be empty".to_string(),
            ));
        }
        if !names.insert(name.clone()) {
            return Err(MonitorError::ConfigError(format!(
                "Duplicate venue name: {}",
                name
            )));
        }

        let selector = match venue.filter {
            RawFilterKind::Event | RawFilterKind::Module => {
                let event_type = venue.event_type.ok_or_else(|| {
                    MonitorError::ConfigError(format!("Venue {} needs event_type", name))
                })?;
                if venue.filter == RawFilterKind::Event {
                    VenueSelector::EventType(event_type)
                } else {
                    VenueSelector::Module(event_type)
                }
            }
            RawFilterKind::MoveFunction => {
                let function = venue.function.ok_or_else(|| {
                    MonitorError::ConfigError(format!(
                        "Venue {} uses filter = \"move_function\" but has no function",
                        name
                    ))
                })?;
                VenueSelector::MoveFunction(function)
            }
        };

        venues.push(VenueConfig {
            name,
            selector,
            payload: venue.payload,
        });
    }

    Ok(venues)
}

/// Create a default configuration file. An existing file is only replaced
/// when `overwrite` is set.
pub fn create_default_config<P: AsRef<Path>>(path: P, overwrite: bool) -> MonitorResult<()> {
    let path = path.as_ref();
    let mut options = std::fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options.open(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => {
            MonitorError::ConfigError(format!("Config file {:?} already exists", path))
        }
        _ => MonitorError::ConfigError(format!("Failed to write config file: {}", e)),
    })?;
    file.write_all(DEFAULT_CONFIG.as_bytes())
        .map_err(|e| MonitorError::ConfigError(format!("Failed to write config file: {}", e)))?;

    info!("Created default config file at {:?}", path);
    Ok(())
}

const DEFAULT_CONFIG: &str = r#"[monitor]
# Sui full node JSON-RPC endpoint
rpc_endpoint = "https://fullnode.mainnet.sui.io:443"

# Fully qualified coin type of the token to watch buys of.
# Must match the spelling the node uses in balance changes.
tracked_token = "0xdeb831e796f16f8257681c0d5d4108fa94333060300b2459133a96631bf470b8::suitrump::SUITRUMP"
token_symbol = "SUITRUMP"
token_decimals = 6

# Pages per venue per pass (module and function venues get 5x this)
max_pages = 3
page_size = 50

# "ascending" moves the persisted cursor forward in time
order = "ascending"

# A venue without a stored cursor starts at its newest item. Set to true
# to read its whole history instead (every past buy is notified).
backfill = false

# Seconds to wait after a pass finishes before starting the next one
poll_interval_secs = 15
concurrent_venues = true
tx_cache_capacity = 500
explorer_tx_url = "https://suiscan.xyz/mainnet/tx/"
request_timeout_secs = 20

[retry]
# Rate-limited calls wait base_delay_ms * 2^attempt
base_delay_ms = 200
max_retries = 5

[store]
# "file" keeps cursors and seen keys across restarts, "memory" does not
kind = "file"
path = "watcher_state.json"

# [telegram]
# bot_token = "123456:ABC..."
# chat_id = "-100123456789"

[raffle]
# Started when the watcher launches; every notified buy earns tickets
enabled = false
prize = "50"
duration_hours = 24

[logging]
# Logging level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"

# Venues. filter = "event" (default) | "module" | "move_function".
# Generic or malformed event types fall back to their module.
#
# An event is only considered when its type is a generic Swap* type naming
# the tracked token, or when the venue's `payload` adapter finds the token
# on one of its legs. Venues below marked "type only" have a plain event
# type and no adapter: their events are marked seen without a transaction
# fetch and never notify, but still cost up to max_pages queries per pass.
# Give them a `payload` shape or drop them to save the query budget.

# type only
[[venues]]
name = "cetus-clmm"
event_type = "0x1eabed72c53feb3805120a081dc15963c204dc8d091542592abaf7a35689b2fb::pool::SwapEvent"

[[venues]]
name = "cetus-router-swap"
event_type = "0x33ec64e9bb369bf045ddc198c81adbf2acab424da37465d95296ee02045d2b17::router::SwapEvent"
payload = "router"

[[venues]]
name = "cetus-router-confirm"
event_type = "0x33ec64e9bb369bf045ddc198c81adbf2acab424da37465d95296ee02045d2b17::router::ConfirmSwapEvent"
payload = "router"

# type only
[[venues]]
name = "asset-router"
event_type = "0x3492c874c1e3b3e2984e8c41b589e642d4d0a5d6459e5a9cfc2d52fd7c89c267::events::AssetSwap"

# type only
[[venues]]
name = "cetus-lbp"
event_type = "0x5a5c1d10e4782dbbdec3eb8327ede04bd078b294b97cfdba447b11b846b383ac::lb_pair::SwapEvent"

# type only
[[venues]]
name = "pool-25929e7f"
event_type = "0x25929e7f29e0a30eb4e692952ba1b5b65a3a4d65ab5f2a32e1ba3edcb587f26d::pool::Swap"

[[venues]]
name = "turbos-swap"
event_type = "0xb24b6789e088b876afabca733bed2299fbc9e2d6369be4d1acfa17d8145454d9::swap::Swap_Event<0x2::sui::SUI, 0xdeb831e796f16f8257681c0d5d4108fa94333060300b2459133a96631bf470b8::suitrump::SUITRUMP>"

[[venues]]
name = "suidex-pair-swap"
event_type = "0xbfac5e1c6bf6ef29b12f7723857695fd2f4da9a11a7d88162c15e9124c243a4a::pair::Swap<0x2::sui::SUI, 0xdeb831e796f16f8257681c0d5d4108fa94333060300b2459133a96631bf470b8::suitrump::SUITRUMP>"

[[venues]]
name = "suidex-router-hop"
filter = "move_function"
function = { package = "0xbfac5e1c6bf6ef29b12f7723857695fd2f4da9a11a7d88162c15e9124c243a4a", module = "router", function = "swap_exact_token0_to_mid_then_mid_to_token1" }

[[venues]]
name = "aftermath-swap-v2"
event_type = "0xc4049b2d1cc0f6e017fda8260e4377cecd236bd7f56a54fee120816e72e2e0dd::events::SwapEventV2"
payload = "aftermath"

[[venues]]
name = "aftermath-swap-done"
event_type = "0xd675e6d727bb2d63087cc12008bb91e399dc7570100f72051993ec10c0428f4a::events::SwapCompletedEventV2"
payload = "aftermath"

# type only
[[venues]]
name = "trade-swap"
event_type = "0x70285592c97965e811e0c6f98dccc3a9c2b4ad854b3594faab9597ada267b860::trade::SwapEvent"

# type only
[[venues]]
name = "trade-repay-flash"
event_type = "0x70285592c97965e811e0c6f98dccc3a9c2b4ad854b3594faab9597ada267b860::trade::RepayFlashSwapEvent"

# type only
[[venues]]
name = "pool-91bfbc38"
event_type = "0x91bfbc386a41afcfd9b2533058d7e915a1d3829089cc268ff4333d54d6339ca1::pool::SwapEvent"

# type only
[[venues]]
name = "pool-e74104c6"
event_type = "0xe74104c66dd9f16b3096db2cc00300e556aa92edc871be4bc052b5dfb80db239::pool::SwapEvent"

# type only
[[venues]]
name = "pool-4a35d3df"
event_type = "0x4a35d3dfef55ed3631b7158544c6322a23bc434fe4fca1234cb680ce0505f82d::pool::SwapEvent"

[[venues]]
name = "settle-17c0b1f7"
event_type = "0x17c0b1f7a6ad73f51268f16b8c06c049eecc2f28a270cdd29c06e3d2dea23302::settle::Swap"
payload = "settle"

[[venues]]
name = "bluemove"
event_type = "0x764b8132a94d35abc9dfd91b23a0757b2a717d5ecb04c03098794aa2a508db91::bluemove::BlueMoveSwapEvent"
payload = "bluemove"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> MonitorResult<MonitorConfig> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| MonitorError::ConfigError(e.to_string()))?;
        from_config(config)
    }

    const MINIMAL: &str = r#"
[monitor]
tracked_token = "0x2::sui::SUI"

[[venues]]
name = "cetus"
event_type = "0x1eabed72c53feb3805120a081dc15963c204dc8d091542592abaf7a35689b2fb::pool::SwapEvent"
"#;

    #[test]
    fn test_default_config_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        create_default_config(&path, false).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.venues.len(), 18);
        assert_eq!(config.store_kind, StoreKind::File);
        assert_eq!(config.order, SortOrder::Ascending);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.telegram.is_none());

        let hop = config
            .venues
            .iter()
            .find(|v| v.name == "suidex-router-hop")
            .unwrap();
        assert!(matches!(hop.selector, VenueSelector::MoveFunction(ref f) if f.module == "router"));

        let router = config
            .venues
            .iter()
            .find(|v| v.name == "cetus-router-swap")
            .unwrap();
        assert_eq!(router.payload, Some(PayloadShape::Router));
    }

    #[test]
    fn test_default_type_only_venues_are_annotated() {
        let config = parse(DEFAULT_CONFIG).unwrap();
        let mut plain = 0;
        for venue in &config.venues {
            let VenueSelector::EventType(ref event_type) = venue.selector else {
                continue;
            };
            let marker = format!("# type only\n[[venues]]\nname = \"{}\"", venue.name);
            let is_plain = !event_type.contains('<') && venue.payload.is_none();
            assert_eq!(DEFAULT_CONFIG.contains(&marker), is_plain, "{}", venue.name);
            plain += usize::from(is_plain);
        }
        assert_eq!(plain, 9);
    }

    #[test]
    fn test_default_config_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# edited by hand\n").unwrap();

        let result = create_default_config(&path, false);
        assert!(matches!(result, Err(MonitorError::ConfigError(ref m)) if m.contains("already exists")));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited by hand\n");

        create_default_config(&path, true).unwrap();
        assert!(load_config(&path).is_ok());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.store_kind, StoreKind::Memory);
        assert_eq!(config.log_level, "info");
        assert!(!config.backfill);
        assert!(config.raffle.is_none());
    }

    #[test]
    fn test_missing_or_malformed_tracked_token() {
        let missing = MINIMAL.replace("tracked_token = \"0x2::sui::SUI\"", "");
        assert!(matches!(parse(&missing), Err(MonitorError::ConfigError(_))));

        let malformed = MINIMAL.replace("0x2::sui::SUI", "SUITRUMP");
        assert!(matches!(parse(&malformed), Err(MonitorError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let toml = MINIMAL.replace(
            "[monitor]",
            "[monitor]\nrpc_endpoint = \"wss://fullnode.mainnet.sui.io\"",
        );
        assert!(matches!(parse(&toml), Err(MonitorError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_duplicate_venues() {
        let toml = format!(
            "{}\n[[venues]]\nname = \"cetus\"\nevent_type = \"0x1::a::B\"\n",
            MINIMAL
        );
        assert!(matches!(parse(&toml), Err(MonitorError::ConfigError(_))));
    }

    #[test]
    fn test_function_venue_needs_function() {
        let toml = format!("{}\n[[venues]]\nname = \"hop\"\nfilter = \"move_function\"\n", MINIMAL);
        assert!(matches!(parse(&toml), Err(MonitorError::ConfigError(_))));
    }

    #[test]
    fn test_raffle_settings() {
        let toml = format!("{}\n[raffle]\nenabled = true\nprize = \"12.5\"\n", MINIMAL);
        let config = parse(&toml).unwrap();
        assert_eq!(
            config.raffle,
            Some(RaffleSettings {
                prize: Decimal::new(125, 1),
                duration_hours: 24,
            })
        );
    }

    #[test]
    fn test_malformed_event_type_is_left_to_watcher() {
        let toml = format!("{}\n[[venues]]\nname = \"odd\"\nevent_type = \"SwapEvent\"\n", MINIMAL);
        let config = parse(&toml).unwrap();
        assert_eq!(config.venues.len(), 2);
    }
}
