//! RPC error classification.
//!
//! Node error messages are not standardized, so the few decisions the client
//! makes on a failed request are driven by matching known wordings.

use alloy::transports::RpcError;

/// Classified RPC failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// Execution reverted during `eth_call` or gas estimation
    ExecutionReverted,

    /// Transaction already in the node's pool; the submission succeeded earlier
    AlreadyKnown,

    /// Connection level failure; the request may be repeated
    NetworkError,

    Unknown,
}

impl RpcErrorKind {
    /// Whether repeating the same read request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcErrorKind::NetworkError)
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, RpcErrorKind::ExecutionReverted)
    }
}

/// Classify an RPC error by its message.
pub fn classify_rpc_error<E: std::fmt::Display>(error: &RpcError<E>) -> RpcErrorKind {
    classify_message(&error.to_string())
}

/// Classify a raw node error message.
pub fn classify_message(message: &str) -> RpcErrorKind {
    let error_str = message.to_lowercase();

    if error_str.contains("execution reverted")
        || error_str.contains("revert")
        || error_str.contains("vm exception")
    {
        return RpcErrorKind::ExecutionReverted;
    }

    if error_str.contains("already known")
        || error_str.contains("already imported")
        || error_str.contains("transaction already exists")
        || error_str.contains("known transaction")
    {
        return RpcErrorKind::AlreadyKnown;
    }

    if error_str.contains("connection")
        || error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("network")
        || error_str.contains("transport")
        || error_str.contains("eof")
        || error_str.contains("broken pipe")
    {
        return RpcErrorKind::NetworkError;
    }

    RpcErrorKind::Unknown
}
