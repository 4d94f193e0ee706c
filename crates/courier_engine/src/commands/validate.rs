use std::fmt;

use courier_core::{CommandError, FollowUp, Priority, Request};
use courier_logging::net_debug;
use serde_json::Value;

use crate::api::ApiQuery;
use crate::{AddressRef, ApiError};

pub type ValidationCallback = Box<dyn FnOnce(bool) + Send>;

/// Asks the server whether an address is valid for its coin.
///
/// The callback is answered exactly once: `true` only when the server
/// echoed the address back, `false` for server errors and failures.
pub struct ValidateAddress {
    address: AddressRef,
    callback: Option<ValidationCallback>,
}

impl ValidateAddress {
    pub fn new(address: AddressRef, callback: impl FnOnce(bool) + Send + 'static) -> Self {
        Self {
            address,
            callback: Some(Box::new(callback)),
        }
    }

    fn answer(&mut self, valid: bool) {
        if let Some(callback) = self.callback.take() {
            net_debug!("address {} valid: {valid}", self.address);
            callback(valid);
        }
    }
}

impl fmt::Debug for ValidateAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidateAddress[{}]", self.address)
    }
}

impl ApiQuery for ValidateAddress {
    fn request(&self) -> Request {
        Request::get("coins")
            .path_arg(self.address.coin.as_str())
            .path_arg(self.address.address.as_str())
    }

    fn priority(&self) -> Priority {
        Priority::High
    }

    fn data_type(&self) -> Option<&'static str> {
        Some("address")
    }

    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError> {
        let echoed = data.get("address").and_then(Value::as_str);
        self.answer(echoed == Some(self.address.address.as_str()));
        Ok(None)
    }

    fn on_server_error(&mut self, _code: i64, _detail: &str) -> Result<(), ApiError> {
        self.answer(false);
        Ok(())
    }

    fn on_failure(&mut self, _error: &CommandError) {
        self.answer(false);
    }
}
