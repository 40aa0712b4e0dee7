use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the ledger reads, the store and the purchase flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The object (registry, pool, ...) does not exist on the ledger.
    NotFound { what: &'static str, id: String },
    /// The object exists but its content is not the expected Move struct,
    /// or one of its fields has a shape we do not understand.
    InvalidType { id: String, detail: String },
    /// Transport, timeout or JSON-RPC level failure.
    Network(String),
    /// A required identifier is missing or still a placeholder.
    Configuration(String),
    /// The user asked for something that cannot be submitted.
    UserInput(String),
    /// Signing or on-chain execution of a transaction failed.
    TransactionFailure(String),
    /// The pool we hold is not the one the registry points at.
    PoolOutOfSync { expected: String, actual: String },
    /// Discovery exhausted every network without finding a live pool.
    NoActivePool,
}

impl Error {
    pub(crate) fn invalid(id: impl fmt::Display, detail: impl Into<String>) -> Self {
        Error::InvalidType {
            id: id.to_string(),
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound { what, id } => write!(f, "{what} not found: {id}"),
            Error::InvalidType { id, detail } => {
                write!(f, "invalid object data for {id}: {detail}")
            }
            Error::Network(msg) => write!(f, "network error: {msg}"),
            Error::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Error::UserInput(msg) => write!(f, "{msg}"),
            Error::TransactionFailure(msg) => write!(f, "Transaction failed: {msg}"),
            Error::PoolOutOfSync { expected, actual } => write!(
                f,
                "Pool data out of sync (registry points at {expected}, loaded {actual})"
            ),
            Error::NoActivePool => write!(f, "No active pool found on any network"),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Network(format!("request timed out: {err}"))
        } else {
            Error::Network(err.to_string())
        }
    }
}
