use std::fmt;

use courier_core::{Body, Command, CommandError, FollowUp, LoadingLevel, Priority, Request};
use courier_logging::{net_error, net_trace, net_warn};
use serde_json::{json, Value};

pub const API_CONTENT_TYPE: &str = "application/vnd.api+json";

const DEFAULT_BODY_LIMIT: usize = 8 * 1024 * 1024;
const SLOW_TIMEFRAME_NS: u64 = 1_000_000_000;
const LOGGED_HEAD_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("empty reply")]
    EmptyReply,
    #[error("malformed JSON: {0}")]
    Json(String),
    #[error("reply for action {got:?}, expected {expected:?}")]
    WrongAction { expected: String, got: String },
    #[error("unexpected content: {0}")]
    Content(String),
    #[error("server error {code}: {detail}")]
    Server { code: i64, detail: String },
    #[error("unknown server error code {0}")]
    UnknownErrorCode(i64),
    #[error("reply larger than {limit} bytes")]
    TooLarge { limit: usize },
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub(crate) fn missing(field: &str) -> Self {
        ApiError::Content(format!("missing field {field:?}"))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Content(err.to_string())
    }
}

impl From<ApiError> for CommandError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Server { code, detail } => CommandError::Server { code, detail },
            ApiError::UnknownErrorCode(code) => CommandError::UnknownErrorCode(code),
            other => CommandError::Response(other.to_string()),
        }
    }
}

/// Collects a streamed reply body up to a size limit.
#[derive(Debug, Clone)]
pub struct JsonBuffer {
    bytes: Vec<u8>,
    limit: usize,
    overflowed: bool,
}

impl Default for JsonBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BODY_LIMIT)
    }
}

impl JsonBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            overflowed: false,
        }
    }

    /// Appends a chunk. Returns `false` once the limit is exceeded.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if self.overflowed || self.bytes.len() + chunk.len() > self.limit {
            self.overflowed = true;
            return false;
        }
        self.bytes.extend_from_slice(chunk);
        true
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn parse(&self) -> Result<Value, ApiError> {
        if self.overflowed {
            return Err(ApiError::TooLarge { limit: self.limit });
        }
        if self.bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::EmptyReply);
        }
        serde_json::from_slice(&self.bytes).map_err(|err| ApiError::Json(err.to_string()))
    }

    /// Start of the body, lossily decoded, for log lines.
    pub fn head(&self, max: usize) -> String {
        let end = self.bytes.len().min(max);
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }
}

/// How a reply body is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `{"data": {"type", "attributes"}, "meta"}` or `{"errors": [...]}`.
    JsonApi,
    /// Plain JSON from a third-party host.
    Raw,
}

/// A command whose reply is a JSON document.
///
/// [`ApiCommand`] adapts a query to the dispatcher's [`Command`] contract:
/// it buffers the body, unwraps the envelope and routes server errors.
pub trait ApiQuery: Send + fmt::Debug + 'static {
    fn request(&self) -> Request;

    fn required_level(&self) -> LoadingLevel {
        LoadingLevel::None
    }

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    fn unique(&self) -> bool {
        false
    }

    fn skip(&self) -> bool {
        false
    }

    fn envelope(&self) -> Envelope {
        Envelope::JsonApi
    }

    /// Expected `data.type`; `None` accepts any.
    fn data_type(&self) -> Option<&'static str> {
        None
    }

    /// Lets a query answer statuses that carry no document, such as `304`.
    fn on_status(&mut self, _status: u16) -> Option<Result<FollowUp, ApiError>> {
        None
    }

    /// Receives `data.attributes`, or the whole document for [`Envelope::Raw`].
    fn on_data(&mut self, data: Value) -> Result<FollowUp, ApiError>;

    /// Called for each entry of an `errors` array. `Ok` marks it handled.
    fn on_server_error(&mut self, code: i64, detail: &str) -> Result<(), ApiError> {
        Err(ApiError::Server {
            code,
            detail: detail.to_string(),
        })
    }

    fn on_failure(&mut self, _error: &CommandError) {}
}

pub struct ApiCommand<Q> {
    query: Q,
    body: JsonBuffer,
}

impl<Q: ApiQuery> ApiCommand<Q> {
    pub fn new(query: Q) -> Self {
        Self {
            query,
            body: JsonBuffer::default(),
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body = JsonBuffer::new(limit);
        self
    }

    pub fn boxed(query: Q) -> Box<dyn Command> {
        Box::new(Self::new(query))
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    fn process(&mut self, document: Value) -> Result<FollowUp, ApiError> {
        match self.query.envelope() {
            Envelope::Raw => self.query.on_data(document),
            Envelope::JsonApi => self.process_envelope(document),
        }
    }

    fn process_envelope(&mut self, mut document: Value) -> Result<FollowUp, ApiError> {
        if let Some(errors) = document.get("errors").and_then(Value::as_array) {
            for error in errors {
                let code = error_code(error)?;
                let detail = match error.get("detail") {
                    Some(Value::String(detail)) => detail.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                net_warn!("{:?}: server error {code}: {detail}", self.query);
                self.query.on_server_error(code, &detail)?;
            }
            return Ok(None);
        }

        if let Some(timeframe) = document.pointer("/meta/timeframe").and_then(Value::as_u64) {
            if timeframe > SLOW_TIMEFRAME_NS {
                net_warn!("{:?}: server took {timeframe} ns to answer", self.query);
            }
        }

        let data = document
            .get_mut("data")
            .ok_or_else(|| ApiError::missing("data"))?;
        if let Some(expected) = self.query.data_type() {
            let got = data.get("type").and_then(Value::as_str).unwrap_or_default();
            if got != expected {
                return Err(ApiError::WrongAction {
                    expected: expected.to_string(),
                    got: got.to_string(),
                });
            }
        }
        let attributes = data
            .get_mut("attributes")
            .map(Value::take)
            .ok_or_else(|| ApiError::missing("attributes"))?;
        self.query.on_data(attributes)
    }
}

impl<Q: ApiQuery> fmt::Debug for ApiCommand<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.query, f)
    }
}

impl<Q: ApiQuery> Command for ApiCommand<Q> {
    fn request(&self) -> Request {
        self.query.request()
    }

    fn required_level(&self) -> LoadingLevel {
        self.query.required_level()
    }

    fn priority(&self) -> Priority {
        self.query.priority()
    }

    fn unique(&self) -> bool {
        self.query.unique()
    }

    fn skip(&self) -> bool {
        self.query.skip()
    }

    fn kind(&self) -> &'static str {
        std::any::type_name::<Q>()
    }

    fn on_response_data(&mut self, chunk: &[u8]) -> bool {
        if self.body.push(chunk) {
            return true;
        }
        net_error!(
            "{:?}: reply exceeds {} bytes, dropping it",
            self.query,
            self.body.limit
        );
        false
    }

    fn on_response_finished(&mut self, status: u16) -> Result<FollowUp, CommandError> {
        if let Some(result) = self.query.on_status(status) {
            return result.map_err(CommandError::from);
        }
        net_trace!("{:?}: {} bytes with status {status}", self.query, self.body.len());
        let result = self.body.parse().and_then(|document| self.process(document));
        if let Err(err) = &result {
            net_error!("processing answer error: {err}");
            net_error!(
                "full answer (first {LOGGED_HEAD_LEN} symbols): {}",
                self.body.head(LOGGED_HEAD_LEN)
            );
        }
        result.map_err(CommandError::from)
    }

    fn on_error(&mut self, error: &CommandError) {
        self.query.on_failure(error);
    }
}

fn error_code(error: &Value) -> Result<i64, ApiError> {
    match error.get("code") {
        Some(Value::Number(code)) => code
            .as_i64()
            .ok_or_else(|| ApiError::Content(format!("error code {code} out of range"))),
        Some(Value::String(code)) => code
            .trim()
            .parse()
            .map_err(|_| ApiError::Content(format!("error code {code:?} is not a number"))),
        _ => Err(ApiError::missing("code")),
    }
}

/// Body of a JSON:API POST request.
pub(crate) fn post_body(data_type: &str, attributes: Value) -> Body {
    let document = json!({
        "data": {
            "type": data_type,
            "attributes": attributes,
        }
    });
    Body {
        content_type: API_CONTENT_TYPE.to_string(),
        bytes: document.to_string().into_bytes(),
    }
}

/// Field accessors for attribute tables.
pub(crate) fn field<'a>(table: &'a Value, name: &str) -> Result<&'a Value, ApiError> {
    table.get(name).ok_or_else(|| ApiError::missing(name))
}

pub(crate) fn str_field(table: &Value, name: &str) -> Result<String, ApiError> {
    field(table, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ApiError::Content(format!("{name:?} is not a string")))
}

pub(crate) fn int_field(table: &Value, name: &str) -> Result<i64, ApiError> {
    field(table, name)?
        .as_i64()
        .ok_or_else(|| ApiError::Content(format!("{name:?} is not an integer")))
}

/// Offsets are opaque to the client; the server sends strings or numbers.
pub(crate) fn offset_field(table: &Value, name: &str) -> Option<String> {
    match table.get(name)? {
        Value::Null => None,
        Value::String(offset) => Some(offset.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_reports_overflow_once_limit_is_crossed() {
        let mut buffer = JsonBuffer::new(8);
        assert!(buffer.push(b"{\"a\":"));
        assert!(!buffer.push(b"1234}"));
        assert!(!buffer.push(b""));
        assert_eq!(buffer.parse(), Err(ApiError::TooLarge { limit: 8 }));
    }

    #[test]
    fn blank_body_is_an_empty_reply() {
        let mut buffer = JsonBuffer::default();
        buffer.push(b"  \n");
        assert_eq!(buffer.parse(), Err(ApiError::EmptyReply));
    }

    #[test]
    fn error_codes_accept_numbers_and_strings() {
        assert_eq!(error_code(&json!({"code": 2003})), Ok(2003));
        assert_eq!(error_code(&json!({"code": "2003"})), Ok(2003));
        assert!(error_code(&json!({"detail": "x"})).is_err());
    }

    #[test]
    fn server_errors_keep_their_code() {
        let err: CommandError = ApiError::UnknownErrorCode(7).into();
        assert_eq!(err, CommandError::UnknownErrorCode(7));
        let err: CommandError = ApiError::EmptyReply.into();
        assert_eq!(err, CommandError::Response("empty reply".to_string()));
    }
}
