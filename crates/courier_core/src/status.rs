/// Status assumed when an exchange ends before any status line arrived.
pub const MISSING_STATUS: u16 = 501;

/// Connectivity signal derived from an exchange with the indexing API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy { status: u16, message: String },
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy)
    }
}

/// 404 and 500 are tolerated: the server is reachable and answering.
pub fn is_ok_status(status: u16) -> bool {
    status < 400 || status == 404 || status == 500
}

pub fn classify_status(status: u16, message: impl Into<String>) -> Health {
    if is_ok_status(status) {
        Health::Healthy
    } else {
        Health::Unhealthy {
            status,
            message: message.into(),
        }
    }
}
