//! Courier engine: HTTP transport, API commands and the dispatch runner.
mod api;
mod commands;
mod config;
mod endpoint;
mod engine;
mod transport;
mod types;

pub use api::{ApiCommand, ApiError, ApiQuery, Envelope, JsonBuffer, API_CONTENT_TYPE};
pub use commands::{
    AddressHistory, AddressInfoQuery, AddressUnspent, Broadcast, CoinRates, CoinsInfo, Mempool,
    RecommendedFee, UndoTransaction, ValidateAddress, ValidationCallback, VersionCheck,
    BROADCAST_REJECTED_CODE, HISTORY_PAGE_LIMIT, MEMPOOL_MAX_ROUNDS,
};
pub use config::{EngineConfig, DEFAULT_API_BASE, DEFAULT_FEE_HOST, DEFAULT_RATES_HOST};
pub use endpoint::compose_url;
pub use engine::{EngineHandle, EngineRequest, EngineSender};
pub use transport::{ChannelEventSink, EventSink, ReqwestTransport, Transport, TransportFailure};
pub use types::{
    AddressInfo, AddressRef, ApiEvent, ChannelResultSink, CoinRate, CoinStatus, EngineEvent,
    FeeEstimate, ResultSink, ServerInfo, TxInputOutput, TxRecord, UnspentOutput,
};
