use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use courier_core::{FollowUp, LoadingLevel, Priority, Request};
use courier_logging::{net_debug, net_trace};
use serde_json::Value;

use crate::api::{field, offset_field, ApiCommand, ApiQuery};
use crate::{AddressInfo, AddressRef, ApiError, ApiEvent, ResultSink, TxRecord, UnspentOutput};

/// Transactions the server returns per history page unless asked for fewer.
pub const HISTORY_PAGE_LIMIT: usize = 50;

fn address_request(address: &AddressRef) -> Request {
    Request::get("coins")
        .path_arg(address.coin.as_str())
        .path_arg(address.address.as_str())
}

fn check_address(address: &AddressRef, table: &Value) -> Result<(), ApiError> {
    match table.get("address").and_then(Value::as_str) {
        Some(got) if got == address.address => Ok(()),
        got => Err(ApiError::Content(format!(
            "reply for address {got:?}, asked for {}",
            address.address
        ))),
    }
}

/// Balance, transaction count and type of one address.
pub struct AddressInfoQuery {
    address: AddressRef,
    known_tx_count: Option<u64>,
    results: Arc<dyn ResultSink>,
}

impl AddressInfoQuery {
    pub fn new(address: AddressRef, results: Arc<dyn ResultSink>) -> Self {
        Self {
            address,
            known_tx_count: None,
            results,
        }
    }

    /// Follows up with an [`AddressHistory`] when the server knows more
    /// transactions than `known`.
    pub fn sync_history(mut self, known: u64) -> Self {
        self.known_tx_count = Some(known);
        self
    }
}

impl fmt::Debug for AddressInfoQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressInfo[{}]", self.address)
    }
}

impl ApiQuery for AddressInfoQuery {
    fn request(&self) -> Request {
        address_request(&self.address)
    }

    fn required_level(&self) -> LoadingLevel {
        LoadingLevel::Addresses
    }

    fn data_type(&self) -> Option<&'static str> {
        Some("address")
    }

    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError> {
        check_address(&self.address, &data)?;
        let info: AddressInfo = serde_json::from_value(data)?;

        let follow_up = match self.known_tx_count {
            Some(known) if info.number_of_transactions > known => {
                net_debug!(
                    "{} more transactions to download for {}",
                    info.number_of_transactions - known,
                    self.address
                );
                Some(ApiCommand::boxed(AddressHistory::new(
                    self.address.clone(),
                    Arc::clone(&self.results),
                )))
            }
            _ => None,
        };

        self.results.emit(ApiEvent::AddressInfo {
            address: self.address.clone(),
            info,
        });
        Ok(follow_up)
    }
}

/// Offset the server reads as "the oldest block".
const BASE_OFFSET: &str = "base";
/// Offset the server reads as "the newest block".
const BEST_OFFSET: &str = "best";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// From the best block down to what the wallet already has.
    Forward,
    /// From where an earlier load stopped down to the base block.
    Backward,
}

/// Pages through an address's history, newest first.
///
/// The forward pass loads everything newer than the stored `first_offset`.
/// When a stored `last_offset` shows an earlier load stopped short of the
/// base block, a backward pass then continues from there. Each page is
/// emitted as it arrives; the next page is queued as a follow-up.
pub struct AddressHistory {
    address: AddressRef,
    pass: Pass,
    first_offset: String,
    last_offset: String,
    /// Newest offset an earlier load reached; bounds the forward pass.
    known_first: Option<String>,
    /// Where an earlier load stopped; starts the backward pass.
    known_last: Option<String>,
    limit: Option<usize>,
    tx_count: usize,
    priority: Priority,
    dropped: Option<Arc<AtomicBool>>,
    results: Arc<dyn ResultSink>,
}

fn stored_offset(offset: Option<String>) -> Option<String> {
    offset.filter(|offset| !matches!(offset.as_str(), BEST_OFFSET | BASE_OFFSET | "None"))
}

impl AddressHistory {
    /// Loads the whole history, starting from the best block.
    pub fn new(address: AddressRef, results: Arc<dyn ResultSink>) -> Self {
        Self {
            address,
            pass: Pass::Forward,
            first_offset: BEST_OFFSET.to_string(),
            last_offset: BASE_OFFSET.to_string(),
            known_first: None,
            known_last: None,
            limit: None,
            tx_count: 0,
            priority: Priority::Normal,
            dropped: None,
            results,
        }
    }

    /// Continues from the offsets recorded by earlier loads: only the
    /// transactions newer than `first_offset` and, if `last_offset` is set,
    /// those older than `last_offset` are requested.
    pub fn resume(mut self, first_offset: Option<String>, last_offset: Option<String>) -> Self {
        self.known_first = stored_offset(first_offset);
        self.known_last = stored_offset(last_offset);
        self.pass = Pass::Forward;
        self.first_offset = BEST_OFFSET.to_string();
        self.last_offset = self.forward_bound();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested by the user; the first page jumps the queue.
    pub fn on_demand(mut self) -> Self {
        self.priority = Priority::High;
        self
    }

    /// Skips the command, and any follow-up, once `dropped` is set.
    pub fn cancel_when(mut self, dropped: Arc<AtomicBool>) -> Self {
        self.dropped = Some(dropped);
        self
    }

    fn forward_bound(&self) -> String {
        self.known_first
            .clone()
            .unwrap_or_else(|| BASE_OFFSET.to_string())
    }

    fn page(&self, pass: Pass, first_offset: String) -> Self {
        let last_offset = match pass {
            Pass::Forward => self.forward_bound(),
            Pass::Backward => BASE_OFFSET.to_string(),
        };
        Self {
            address: self.address.clone(),
            pass,
            first_offset,
            last_offset,
            known_first: self.known_first.clone(),
            known_last: self.known_last.clone(),
            limit: self.limit,
            tx_count: self.tx_count,
            priority: Priority::Normal,
            dropped: self.dropped.clone(),
            results: Arc::clone(&self.results),
        }
    }

    fn next(&self, last_offset: Option<String>) -> Option<Self> {
        if self.limit.is_some_and(|limit| self.tx_count >= limit) {
            return None;
        }
        match (self.pass, last_offset) {
            (pass, Some(offset)) => Some(self.page(pass, offset)),
            (Pass::Forward, None) => self
                .known_last
                .clone()
                .map(|resume_at| self.page(Pass::Backward, resume_at)),
            (Pass::Backward, None) => None,
        }
    }
}

impl fmt::Debug for AddressHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AddressHistory[{} {:?} first={} last={}]",
            self.address, self.pass, self.first_offset, self.last_offset
        )
    }
}

impl ApiQuery for AddressHistory {
    fn request(&self) -> Request {
        let mut request = address_request(&self.address)
            .path_arg("history")
            .query_arg("first_offset", &self.first_offset);
        if let Some(limit) = self.limit {
            let remaining = limit.saturating_sub(self.tx_count);
            if remaining < HISTORY_PAGE_LIMIT {
                request = request.query_arg("limit", remaining);
            }
        }
        request.query_arg("last_offset", &self.last_offset)
    }

    fn required_level(&self) -> LoadingLevel {
        LoadingLevel::Addresses
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn skip(&self) -> bool {
        self.dropped
            .as_ref()
            .is_some_and(|dropped| dropped.load(Ordering::Relaxed))
    }

    fn data_type(&self) -> Option<&'static str> {
        Some("history")
    }

    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError> {
        check_address(&self.address, &data)?;
        let transactions = TxRecord::from_list(field(&data, "tx_list")?)?;
        self.tx_count += transactions.len();
        let last_offset = offset_field(&data, "last_offset");
        net_trace!(
            "{:?}: {} transactions, {} so far",
            self,
            transactions.len(),
            self.tx_count
        );

        self.results.emit(ApiEvent::HistoryPage {
            address: self.address.clone(),
            transactions,
            first_offset: offset_field(&data, "first_offset"),
            last_offset: last_offset.clone(),
        });

        match self.next(last_offset) {
            Some(next) => {
                net_debug!("next {:?} history request for {}", next.pass, self.address);
                Ok(Some(ApiCommand::boxed(next)))
            }
            None => {
                self.results.emit(ApiEvent::HistoryComplete {
                    address: self.address.clone(),
                    tx_count: self.tx_count,
                });
                Ok(None)
            }
        }
    }
}

/// Collects every unspent output of an address across pages and emits them
/// once the last page arrived.
pub struct AddressUnspent {
    address: AddressRef,
    first_offset: Option<String>,
    unspent: Vec<UnspentOutput>,
    calls: u32,
    results: Arc<dyn ResultSink>,
}

impl AddressUnspent {
    pub fn new(address: AddressRef, results: Arc<dyn ResultSink>) -> Self {
        Self {
            address,
            first_offset: None,
            unspent: Vec::new(),
            calls: 0,
            results,
        }
    }
}

impl fmt::Debug for AddressUnspent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AddressUnspent[{} first={:?} calls={}]",
            self.address, self.first_offset, self.calls
        )
    }
}

impl ApiQuery for AddressUnspent {
    fn request(&self) -> Request {
        let request = address_request(&self.address).path_arg("unspent");
        match &self.first_offset {
            Some(first) => request.query_arg("first_offset", first),
            None => request,
        }
    }

    fn required_level(&self) -> LoadingLevel {
        LoadingLevel::Addresses
    }

    fn data_type(&self) -> Option<&'static str> {
        Some("unspent")
    }

    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError> {
        check_address(&self.address, &data)?;
        let page: Vec<UnspentOutput> = serde_json::from_value(field(&data, "tx_list")?.clone())?;
        net_trace!("{:?}: {} outputs in answer", self, page.len());
        self.unspent.extend(page);

        if let Some(offset) = offset_field(&data, "last_offset") {
            return Ok(Some(ApiCommand::boxed(Self {
                address: self.address.clone(),
                first_offset: Some(offset),
                unspent: std::mem::take(&mut self.unspent),
                calls: self.calls + 1,
                results: Arc::clone(&self.results),
            })));
        }

        let outputs: Vec<UnspentOutput> = std::mem::take(&mut self.unspent)
            .into_iter()
            .filter(|output| output.amount > 0)
            .collect();
        net_debug!(
            "{}: {} unspent outputs from {} calls",
            self.address,
            outputs.len(),
            self.calls + 1
        );
        self.results.emit(ApiEvent::Unspent {
            address: self.address.clone(),
            outputs,
        });
        Ok(None)
    }
}
