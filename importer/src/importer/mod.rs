pub mod chunks;
pub mod state;

pub use state::{
    CandlesChunk, CandlesSubState, CurrentState, ImportType, Importer, ImporterParams, Status,
    TradesChunk, TradesSubState,
};
