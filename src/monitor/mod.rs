pub mod cache;
pub mod error;
pub mod retry;
pub mod rpc;
pub mod sink;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::TransactionCache;
pub use error::{MonitorError, MonitorResult};
pub use retry::RetryPolicy;
pub use rpc::{LedgerRpc, RpcGateway, SuiRpcClient};
pub use sink::{FanoutSink, LogSink, NotificationSink, TelegramSink};
pub use store::{CursorStore, JsonFileStore, MemoryStore};
