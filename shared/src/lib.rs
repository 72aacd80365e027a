pub mod candles;
pub mod config;
pub mod database;
pub mod error;
pub mod market;
pub mod timeframe;

pub use candles::{batch_candles, candles_from_trades, fill_gaps};
pub use config::{Config, EmptyResponsePolicy};
pub use database::{get_pool, DbPool};
pub use error::ImportError;
pub use market::{CandleType, ExchangeCandle, ExchangeTrade, TradeSide};
pub use timeframe::{chunk_date_range, load_limit, ms_to_utc, DateRangeChunk, Timeframe};
