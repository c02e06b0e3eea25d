/// Broad classification used to decide how an error should be handled,
/// per the taxonomy in the error-handling design: configuration errors
/// are fatal at startup, transient I/O is logged and retried by the
/// surrounding policy, protocol errors fail only the one connection, and
/// policy errors route to a fallback instead of surfacing to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Transient,
    Protocol,
    Policy,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("duplicate tag: {0}")]
    DuplicateTag(String),

    #[error("unknown balancer: {0}")]
    UnknownBalancer(String),

    #[error("unknown outbound: {0}")]
    UnknownOutbound(String),

    #[error("unsupported domain match type: {0}")]
    UnsupportedDomainType(String),

    #[error("invalid regex in rule: {0}")]
    InvalidRegex(#[from] regex_error::RegexError),

    #[error("port allocation exhausted for pool of size {0}")]
    PortAllocationExhausted(usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dial failed: {0}")]
    DialFailed(String),

    #[error("read timed out")]
    ReadTimeout,

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("authentication failed for user {0:?}")]
    AuthenticationFailed(Option<String>),

    #[error("malformed request header: {0}")]
    MalformedHeader(String),

    #[error("replayed session id: {0}")]
    ReplayedSession(u64),

    #[error("no matching rule")]
    NoClue,

    #[error("balancer {0} returned no candidate and has no fallback")]
    BalancerEmpty(String),

    #[error("outbound {0} is dead: {1}")]
    OutboundDead(String, String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn severity(&self) -> Severity {
        use Error::*;
        match self {
            DuplicateTag(_)
            | UnknownBalancer(_)
            | UnsupportedDomainType(_)
            | InvalidRegex(_)
            | PortAllocationExhausted(_) => Severity::Fatal,

            Io(_) | DialFailed(_) | ReadTimeout | WriteFailed(_) => Severity::Transient,

            AuthenticationFailed(_) | MalformedHeader(_) | ReplayedSession(_) => {
                Severity::Protocol
            }

            NoClue | BalancerEmpty(_) | OutboundDead(_, _) | UnknownOutbound(_) => {
                Severity::Policy
            }

            Other(_) => Severity::Transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A tiny indirection so `Error` can carry a regex-compile-error-shaped
/// cause without making this crate depend on `regex` directly.
pub mod regex_error {
    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    pub struct RegexError(pub String);

    impl RegexError {
        pub fn new(msg: impl std::fmt::Display) -> Self {
            RegexError(msg.to_string())
        }
    }
}
