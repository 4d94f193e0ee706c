//! The API command catalogue.
mod address;
mod broadcast;
mod coins;
mod fee;
mod mempool;
mod rates;
mod undo;
mod validate;
mod version;

pub use address::{AddressHistory, AddressInfoQuery, AddressUnspent, HISTORY_PAGE_LIMIT};
pub use broadcast::{Broadcast, BROADCAST_REJECTED_CODE};
pub use coins::CoinsInfo;
pub use fee::RecommendedFee;
pub use mempool::{Mempool, MEMPOOL_MAX_ROUNDS};
pub use rates::CoinRates;
pub use undo::UndoTransaction;
pub use validate::{ValidateAddress, ValidationCallback};
pub use version::VersionCheck;
