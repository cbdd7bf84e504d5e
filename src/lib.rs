pub mod types;
pub mod monitor;
pub mod config;
pub mod detection;
pub mod watcher;
pub mod raffle;

pub use types::{BuyNotification, Cursor, MonitorConfig, VenueConfig};
pub use monitor::{
    CursorStore, FanoutSink, JsonFileStore, LogSink, MemoryStore, MonitorError, MonitorResult,
    NotificationSink, RpcGateway, SuiRpcClient, TelegramSink, TransactionCache,
};
pub use config::{load_config, create_default_config};
pub use detection::{EventClassifier, types::BuyVerdict};
pub use watcher::{VenueWatcher, WatcherOrchestrator};
pub use raffle::{RaffleBook, RaffleSink};
