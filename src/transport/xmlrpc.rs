/// XML-RPC over HTTP transport implementation.
use super::codec::{decode_response, encode_call};
use super::{RpcTransport, TransportError};
use crate::value::Value;
use std::time::Duration;

/// Transport that POSTs XML-RPC method calls to a single endpoint.
///
/// This is the plain single-attempt transport; wrap it in a
/// [`RetryingTransport`](super::RetryingTransport) to survive transient
/// network trouble.
#[derive(Debug)]
pub struct XmlRpcTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl XmlRpcTransport {
    /// Creates a transport for the given endpoint URL.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - URL of the XML-RPC endpoint
    /// * `user_agent` - Value for the HTTP `User-Agent` header
    /// * `timeout` - Upper bound for a single request, including reading the body
    pub fn new(
        endpoint: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Returns the endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Maps a reqwest error onto the transient/permanent classification
fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if let Some(status) = error.status() {
        TransportError::Http {
            status: status.as_u16(),
        }
    } else if error.is_connect() || error.is_request() || error.is_body() {
        TransportError::Connection(error.to_string())
    } else {
        TransportError::Codec(error.to_string())
    }
}

impl RpcTransport for XmlRpcTransport {
    fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
        log::debug!("Calling {} on {}", method, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "text/xml")
            .body(encode_call(method, params))
            .send()
            .map_err(classify)?;

        if !response.status().is_success() {
            return Err(TransportError::Http {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().map_err(classify)?;
        decode_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_endpoint_is_transient() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let transport = XmlRpcTransport::new(
            "http://127.0.0.1:9/xml-rpc",
            "TestAgent",
            Duration::from_secs(2),
        )
        .unwrap();

        let error = transport.call("ServerInfo", &[]).unwrap_err();
        assert!(error.is_transient(), "unexpected error: {:?}", error);
    }
}
