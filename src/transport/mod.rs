//! Remote procedure call transport
//!
//! The subtitle client only needs one primitive from the network: call a
//! named remote method with positional arguments and get back a single
//! loosely-typed payload. This module defines that primitive as a trait,
//! classifies its failures into transient and permanent ones, and provides
//! a retrying wrapper plus an XML-RPC over HTTP implementation.
mod codec;
mod retry;
mod xmlrpc;

pub use retry::{RetryPolicy, RetryingTransport};
pub use xmlrpc::XmlRpcTransport;

use crate::value::Value;
use thiserror::Error;

/// Errors that can occur while executing a remote call
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established or was reset
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered with a non-success HTTP status
    #[error("HTTP {status}")]
    Http { status: u16 },

    /// The server rejected the call itself (e.g. unknown method)
    #[error("Remote fault {code}: {message}")]
    Fault { code: i64, message: String },

    /// The request could not be encoded or the response could not be parsed
    #[error("Invalid RPC message: {0}")]
    Codec(String),

    /// Every attempt failed with a transient error
    #[error("Giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: Box<TransportError>,
    },
}

impl TransportError {
    /// Whether retrying the same call may succeed
    ///
    /// Connection problems, timeouts, server-side HTTP errors and throttling
    /// are transient. Faults, codec problems and client-side HTTP errors are
    /// not: sending the same request again yields the same answer.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connection(_) | TransportError::Timeout(_) => true,
            TransportError::Http { status } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransportError::Fault { .. }
            | TransportError::Codec(_)
            | TransportError::RetriesExhausted { .. } => false,
        }
    }
}

/// Trait for transports that can execute remote method calls
///
/// Implementors turn a method name and positional arguments into a request,
/// deliver it, and hand back the raw response payload. They never look at
/// the protocol status embedded in the payload.
pub trait RpcTransport {
    /// Executes a remote method call
    ///
    /// # Arguments
    ///
    /// * `method` - The remote method name (e.g. `LogIn`)
    /// * `params` - Positional arguments in call order
    ///
    /// # Returns
    ///
    /// The response payload, or a TransportError
    fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError>;
}

impl<T: RpcTransport + ?Sized> RpcTransport for &T {
    fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
        (**self).call(method, params)
    }
}

impl<T: RpcTransport + ?Sized> RpcTransport for Box<T> {
    fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
        (**self).call(method, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Connection("reset".to_string()).is_transient());
        assert!(TransportError::Timeout("30s".to_string()).is_transient());
        assert!(TransportError::Http { status: 503 }.is_transient());
        assert!(TransportError::Http { status: 429 }.is_transient());
        assert!(TransportError::Http { status: 408 }.is_transient());

        assert!(!TransportError::Http { status: 404 }.is_transient());
        assert!(!TransportError::Codec("bad xml".to_string()).is_transient());
        assert!(
            !TransportError::Fault {
                code: 1,
                message: "unknown method".to_string()
            }
            .is_transient()
        );
    }
}
