use std::fmt;

use crate::LoadingLevel;

/// Queue band of a command. `High` always preempts, `Low` always yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// Where a request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    /// The blockchain-indexing API; its answers drive the connectivity signal.
    Api,
    /// A third-party service addressed by its base URL.
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Transport-neutral description of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: HttpMethod,
    pub host: Host,
    pub action: String,
    pub path_args: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Body>,
}

impl Request {
    pub fn get(action: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            host: Host::Api,
            action: action.into(),
            path_args: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(action: impl Into<String>, body: Body) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get(action)
        }
    }

    pub fn path_arg(mut self, arg: impl Into<String>) -> Self {
        self.path_args.push(arg.into());
        self
    }

    pub fn query_arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn on_host(mut self, base_url: impl Into<String>) -> Self {
        self.host = Host::External(base_url.into());
        self
    }

    pub fn is_external(&self) -> bool {
        matches!(self.host, Host::External(_))
    }
}

/// A command a finished exchange wants queued next.
pub type FollowUp = Option<Box<dyn Command>>;

/// One logical API call together with the interpretation of its answer.
///
/// The dispatcher calls `on_response_data` for each received chunk, then
/// `on_response_finished` once a status arrived. `on_error` receives every
/// failure: the error `on_response_finished` returned, a transport failure
/// or an abort.
pub trait Command: Send + fmt::Debug {
    fn request(&self) -> Request;

    fn required_level(&self) -> LoadingLevel {
        LoadingLevel::None
    }

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    /// At most one pending instance of this command's kind may be queued.
    fn unique(&self) -> bool {
        false
    }

    /// Checked right before dispatch; a skipped command is dropped.
    fn skip(&self) -> bool {
        false
    }

    /// Identity used for uniqueness checks. Defaults to the concrete type.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns `false` to end the exchange early.
    fn on_response_data(&mut self, chunk: &[u8]) -> bool;

    fn on_response_finished(&mut self, status: u16) -> Result<FollowUp, CommandError>;

    /// Called once when the command ends in `CommandOutcome::Failed`.
    fn on_error(&mut self, _error: &CommandError) {}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("exchange aborted")]
    Aborted,
    #[error("invalid response: {0}")]
    Response(String),
    #[error("server error {code}: {detail}")]
    Server { code: i64, detail: String },
    #[error("unknown server error code {0}")]
    UnknownErrorCode(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    InFlight,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The response was handed to the command.
    Completed,
    /// The command ended the exchange from `on_response_data`.
    Stopped,
    /// The server answered with an unhealthy status and the finish policy
    /// withheld the response from the command.
    Unanswered { status: u16 },
    /// Dropped from the queue because it asked to be skipped.
    Skipped,
    Failed(CommandError),
}

impl CommandOutcome {
    pub fn state(&self) -> CommandState {
        match self {
            CommandOutcome::Failed(_) => CommandState::Failed,
            _ => CommandState::Completed,
        }
    }
}
