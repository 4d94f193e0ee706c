use std::fmt;
use std::sync::mpsc;

use courier_core::{CommandId, CommandOutcome, Health};
use serde::Deserialize;
use serde_json::Value;

use crate::ApiError;

/// An address on a given coin's chain, as the indexing API names them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressRef {
    pub coin: String,
    pub address: String,
}

impl AddressRef {
    pub fn new(coin: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            coin: coin.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for AddressRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.coin, self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: i64,
    pub version_human: String,
    pub coins: Vec<CoinStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinStatus {
    pub coin: String,
    pub height: u64,
    pub status: i64,
    pub offset: Option<String>,
    pub daemon_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressInfo {
    #[serde(rename = "type")]
    pub address_type: String,
    pub address: String,
    pub number_of_transactions: u64,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TxInputOutput {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, rename = "type")]
    pub address_type: Option<String>,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub id: String,
    /// Absent for mempool transactions.
    pub height: Option<u64>,
    pub time: i64,
    pub amount: i64,
    pub fee: i64,
    pub coinbase: bool,
    pub inputs: Vec<TxInputOutput>,
    pub outputs: Vec<TxInputOutput>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TxBody {
    #[serde(default)]
    height: Option<u64>,
    #[serde(default)]
    time: i64,
    amount: i64,
    #[serde(default)]
    fee: i64,
    #[serde(default)]
    coinbase: i64,
    #[serde(default)]
    input: Vec<TxInputOutput>,
    #[serde(default)]
    output: Vec<TxInputOutput>,
}

impl TxRecord {
    pub(crate) fn from_body(id: String, body: TxBody) -> Self {
        Self {
            id,
            height: body.height,
            time: body.time,
            amount: body.amount,
            fee: body.fee,
            coinbase: body.coinbase != 0,
            inputs: body.input,
            outputs: body.output,
        }
    }

    /// Decodes a `tx_list` object keyed by transaction id, newest first as
    /// the server sent it.
    pub(crate) fn from_list(list: &Value) -> Result<Vec<Self>, ApiError> {
        let entries = list
            .as_object()
            .ok_or_else(|| ApiError::Content("tx_list is not an object".to_string()))?;
        entries
            .iter()
            .map(|(id, body)| Ok(Self::from_body(id.clone(), TxBody::deserialize(body)?)))
            .collect()
    }

    pub fn touches(&self, address: &str) -> bool {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .any(|io| io.address.as_deref() == Some(address))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnspentOutput {
    pub tx: String,
    pub index: u32,
    pub amount: i64,
    #[serde(default)]
    pub height: Option<u64>,
}

/// Expected confirmation time for a fee rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub minutes: u32,
    pub satoshi_per_byte: u64,
}

/// Exchange rate of one coin against a fiat currency.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinRate {
    pub coin: String,
    pub currency: String,
    pub rate: f64,
}

/// Results produced by API commands.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiEvent {
    ServerInfo(ServerInfo),
    CoinsInfo(Vec<CoinStatus>),
    AddressInfo {
        address: AddressRef,
        info: AddressInfo,
    },
    HistoryPage {
        address: AddressRef,
        transactions: Vec<TxRecord>,
        first_offset: Option<String>,
        last_offset: Option<String>,
    },
    HistoryComplete {
        address: AddressRef,
        tx_count: usize,
    },
    Unspent {
        address: AddressRef,
        outputs: Vec<UnspentOutput>,
    },
    Mempool {
        coin: String,
        hash: Option<String>,
        transactions: Vec<TxRecord>,
    },
    BroadcastAccepted {
        coin: String,
        tx_id: String,
    },
    BroadcastRejected {
        coin: String,
        tx_id: String,
        detail: String,
    },
    RecommendedFees(Vec<FeeEstimate>),
    CoinRates(Vec<CoinRate>),
    UndoApplied {
        coin: String,
        count: u32,
    },
}

pub trait ResultSink: Send + Sync {
    fn emit(&self, event: ApiEvent);
}

pub struct ChannelResultSink {
    tx: mpsc::Sender<ApiEvent>,
}

impl ChannelResultSink {
    pub fn new(tx: mpsc::Sender<ApiEvent>) -> Self {
        Self { tx }
    }
}

impl ResultSink for ChannelResultSink {
    fn emit(&self, event: ApiEvent) {
        let _ = self.tx.send(event);
    }
}

/// Notifications from the runner to the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Health(Health),
    CommandFinished {
        command: CommandId,
        kind: &'static str,
        outcome: CommandOutcome,
    },
    Stopped,
}
