//! SubtitleSleuth - Find subtitles for your video files
//!
//! This library provides a client for OpenSubtitles-compatible XML-RPC
//! subtitle services: session handling, subtitle and movie search, subtitle
//! download, and the content fingerprint used to identify a video file
//! without uploading it.

mod client;
mod config;
mod fingerprint;
mod response;
mod transport;
mod value;

// Re-export error types
pub use client::ClientError;
pub use config::ConfigError;
pub use fingerprint::FingerprintError;
pub use response::DecodeError;
pub use transport::TransportError;

pub use client::{Session, SubtitleClient};
pub use config::{ClientConfig, DEFAULT_SERVER_URL, DEFAULT_USER_AGENT, default_config_path};
pub use fingerprint::{Fingerprint, compute_fingerprint};
pub use response::{
    FromRecord, INTERNAL_CATALOG_ID_START, LoginToken, MovieInfo, Record, ServerInfo,
    SubtitleFileContent, SubtitleInfo, check_status, decode_list, decode_server_info,
    decode_single,
};
pub use transport::{RetryPolicy, RetryingTransport, RpcTransport, XmlRpcTransport};
pub use value::{Struct, Value};
