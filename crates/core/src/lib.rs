pub mod adapter;
pub mod broadcaster;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod model;
pub mod repository;

pub use adapter::{ExchangeAdapter, OpenPosition, OrderBook, OrderResult, OrderStatus, VenueLimits};
pub use broadcaster::{Broadcaster, ChannelBroadcaster, NullBroadcaster, StatsSnapshot};
pub use config::EngineConfig;
pub use config_loader::ConfigLoader;
pub use error::{EngineError, Result};
pub use model::{
    ExchangeAccount, ExchangeError, Leg, LegSide, PairConfig, PairRuntime, PairState, PairStatus,
    PendingConfig, Ticker,
};
pub use repository::{
    BlacklistRepository, ExchangeAccountRepository, NotificationRepository, PairRepository,
    SettingsRepository, TradeRepository,
};
