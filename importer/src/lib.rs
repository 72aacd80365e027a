//! Market-data importer: persists gap-free, multi-timeframe candle series
//! from exchange OHLCV history and raw trade ticks.
//!
//! - [`importer`] — the resumable import state machine and chunk planner
//! - [`connector`] — the exchange data interface and the bundled Binance
//!   public-data implementation
//! - [`repositories`] — candle and snapshot persistence over sqlx
//! - [`services`] — the bounded-concurrency worker pipeline and the
//!   scheduling/progress surface

pub mod connector;
pub mod importer;
pub mod repositories;
pub mod services;
pub mod state;

pub use state::AppState;
