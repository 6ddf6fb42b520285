//! Subtitle service session client
//!
//! This module provides the public operations of the subtitle service
//! (login, logout, keep-alive, subtitle search, download, movie lookup) on
//! top of an [`RpcTransport`]. The client owns the session token: it is
//! obtained by `login`, handed explicitly to every session-bearing remote
//! call, and dropped again by a successful `logout`.
//!
//! State transitions take `&mut self`, so the borrow checker rules out a
//! logout racing a search on the same instance. Share a client across
//! threads only behind a `Mutex`.

use crate::config::ClientConfig;
use crate::fingerprint::{FingerprintError, compute_fingerprint};
use crate::response::{
    DecodeError, LoginToken, MovieInfo, ServerInfo, SubtitleFileContent, SubtitleInfo,
    check_status, decode_list, decode_server_info, decode_single,
};
use crate::transport::{RetryingTransport, RpcTransport, TransportError, XmlRpcTransport};
use crate::value::{Struct, Value};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Username and password used for anonymous logins
const ANONYMOUS: &str = "";

/// Errors that can occur during client operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// `login` was called while a session is active
    #[error("Already logged in, log out first")]
    AlreadyLoggedIn,

    /// A session-bearing operation was called without an active session
    #[error("Not logged in")]
    NotLoggedIn,

    /// The remote call failed at the transport level
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The service rejected the request; carries its status text verbatim
    #[error("Request rejected by server: {0}")]
    Protocol(String),

    /// The response lacked or garbled an expected field
    #[error("Malformed response: {0}")]
    MalformedResponse(DecodeError),

    /// A local video file could not be fingerprinted
    #[error("Fingerprinting failed: {0}")]
    Io(#[from] FingerprintError),
}

impl ClientError {
    /// Whether the error is a session-lifecycle precondition violation
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, ClientError::AlreadyLoggedIn | ClientError::NotLoggedIn)
    }
}

impl From<DecodeError> for ClientError {
    fn from(error: DecodeError) -> Self {
        match error {
            DecodeError::Status(status) => ClientError::Protocol(status),
            other => ClientError::MalformedResponse(other),
        }
    }
}

/// An authenticated session with the subtitle service
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
}

impl Session {
    /// The opaque token issued by the service
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Client for the subtitle service
///
/// # Examples
///
/// ```no_run
/// use subtitle_sleuth::{ClientConfig, SubtitleClient};
/// use std::path::Path;
///
/// let config = ClientConfig::default();
/// let mut client = SubtitleClient::connect(&config).unwrap();
///
/// client.login_anonymous("en", &config.user_agent).unwrap();
/// let subtitles = client
///     .search_subtitles("eng", Some(Path::new("movie.mkv")), None, None)
///     .unwrap();
/// for subtitle in &subtitles {
///     println!("{} ({})", subtitle.file_name, subtitle.language);
/// }
/// client.logout().unwrap();
/// ```
#[derive(Debug)]
pub struct SubtitleClient<T = RetryingTransport<XmlRpcTransport>> {
    /// Transport executing the remote calls
    transport: T,
    /// The active session, if logged in
    session: Option<Session>,
}

impl SubtitleClient {
    /// Creates a client talking XML-RPC to the configured server
    ///
    /// Transient network failures are retried according to the configured
    /// retry policy. No remote call is made until the first operation.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = XmlRpcTransport::new(
            &config.server_url,
            &config.user_agent,
            Duration::from_secs(config.timeout_secs),
        )?;

        Ok(Self::with_transport(RetryingTransport::new(
            transport,
            config.retry,
        )))
    }
}

impl<T: RpcTransport> SubtitleClient<T> {
    /// Creates a logged-out client on top of the given transport
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            session: None,
        }
    }

    /// Returns the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether a session is active
    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the active session, if any
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Retrieves metadata about the server
    ///
    /// Needs no session. The response carries no status, so a payload that
    /// is not a struct yields `Ok(None)` instead of an error.
    pub fn server_info(&self) -> Result<Option<ServerInfo>, ClientError> {
        let payload = self.transport.call("ServerInfo", &[])?;
        Ok(decode_server_info(&payload))
    }

    /// Logs in anonymously
    ///
    /// Same as [`login`](Self::login) with empty username and password.
    pub fn login_anonymous(&mut self, language: &str, user_agent: &str) -> Result<(), ClientError> {
        self.login(ANONYMOUS, ANONYMOUS, language, user_agent)
    }

    /// Logs in and starts a session
    ///
    /// # Arguments
    ///
    /// * `username` - Account name, empty for anonymous access
    /// * `password` - Account password, empty for anonymous access
    /// * `language` - ISO 639 two-letter code for server messages
    /// * `user_agent` - Client identifier registered with the service
    ///
    /// # Errors
    ///
    /// `AlreadyLoggedIn` if a session is active (no remote call is made),
    /// `Protocol` if the service rejects the credentials or user agent.
    pub fn login(
        &mut self,
        username: &str,
        password: &str,
        language: &str,
        user_agent: &str,
    ) -> Result<(), ClientError> {
        if self.session.is_some() {
            return Err(ClientError::AlreadyLoggedIn);
        }

        let params = [
            Value::from(username),
            Value::from(password),
            Value::from(language),
            Value::from(user_agent),
        ];
        let payload = self.transport.call("LogIn", &params)?;
        let login: LoginToken = decode_single(&payload)?;

        log::info!(
            "Logged in as {}",
            if username.is_empty() { "anonymous" } else { username }
        );
        self.session = Some(Session { token: login.token });
        Ok(())
    }

    /// Ends the session
    ///
    /// The session is cleared only once the service acknowledged the logout.
    /// On a transport or protocol failure it stays active, so the call can
    /// be repeated.
    pub fn logout(&mut self) -> Result<(), ClientError> {
        let session = self.require_session()?;

        let payload = self
            .transport
            .call("LogOut", &[Value::from(session.token())])?;
        check_status(&payload)?;

        log::info!("Logged out");
        self.session = None;
        Ok(())
    }

    /// Keeps the session alive
    ///
    /// Sessions expire after 15 minutes without requests; call this
    /// periodically while idle.
    pub fn keep_alive(&self) -> Result<(), ClientError> {
        let session = self.require_session()?;
        no_operation(&self.transport, session.token())
    }

    /// Searches subtitles, optionally identifying the video by a local file
    ///
    /// With a file, its fingerprint and size are computed and sent as the
    /// `moviehash` and `moviebytesize` criteria. Without one, both are
    /// omitted.
    pub fn search_subtitles(
        &self,
        language: &str,
        file: Option<&Path>,
        imdb_id: Option<&str>,
        query: Option<&str>,
    ) -> Result<Vec<SubtitleInfo>, ClientError> {
        self.require_session()?;

        match file {
            Some(path) => {
                let fingerprint = compute_fingerprint(path)?;
                self.search_subtitles_by_hash(
                    language,
                    fingerprint.size,
                    Some(&fingerprint.hex()),
                    imdb_id,
                    query,
                )
            }
            None => self.search_subtitles_by_hash(language, 0, None, imdb_id, query),
        }
    }

    /// Searches subtitles by explicit fingerprint, IMDb id and/or free text
    ///
    /// Only non-empty criteria are sent: a zero `file_size` and `None` or
    /// empty strings are left out of the request entirely, since the service
    /// treats an empty criterion differently from an absent one.
    pub fn search_subtitles_by_hash(
        &self,
        language: &str,
        file_size: u64,
        file_hash: Option<&str>,
        imdb_id: Option<&str>,
        query: Option<&str>,
    ) -> Result<Vec<SubtitleInfo>, ClientError> {
        let session = self.require_session()?;
        let criteria = search_criteria(language, file_size, file_hash, imdb_id, query);
        search_subtitles(&self.transport, session.token(), criteria)
    }

    /// Downloads a single subtitle file
    pub fn download_subtitles(
        &self,
        subtitle_file_id: u64,
    ) -> Result<Vec<SubtitleFileContent>, ClientError> {
        self.download_subtitles_batch(&[subtitle_file_id])
    }

    /// Downloads several subtitle files in one request
    ///
    /// Files are returned in the order the service sends them.
    pub fn download_subtitles_batch(
        &self,
        subtitle_file_ids: &[u64],
    ) -> Result<Vec<SubtitleFileContent>, ClientError> {
        let session = self.require_session()?;
        download_subtitles(&self.transport, session.token(), subtitle_file_ids)
    }

    /// Searches movies by title
    ///
    /// Results include entries from the service's own catalog (ids from
    /// 10,000,000 upwards); see [`MovieInfo::is_internal_catalog_entry`].
    pub fn search_movies_by_title(&self, query: &str) -> Result<Vec<MovieInfo>, ClientError> {
        let session = self.require_session()?;
        search_movies(&self.transport, session.token(), query)
    }

    fn require_session(&self) -> Result<&Session, ClientError> {
        self.session.as_ref().ok_or(ClientError::NotLoggedIn)
    }
}

fn no_operation<T: RpcTransport>(transport: &T, token: &str) -> Result<(), ClientError> {
    let payload = transport.call("NoOperation", &[Value::from(token)])?;
    check_status(&payload)?;
    Ok(())
}

fn search_subtitles<T: RpcTransport>(
    transport: &T,
    token: &str,
    criteria: Struct,
) -> Result<Vec<SubtitleInfo>, ClientError> {
    let params = [
        Value::from(token),
        Value::Array(vec![Value::Struct(criteria)]),
    ];
    let payload = transport.call("SearchSubtitles", &params)?;
    let subtitles = decode_list(&payload)?;
    log::debug!("Found {} subtitle(s)", subtitles.len());
    Ok(subtitles)
}

fn download_subtitles<T: RpcTransport>(
    transport: &T,
    token: &str,
    subtitle_file_ids: &[u64],
) -> Result<Vec<SubtitleFileContent>, ClientError> {
    // The service expects the ids as strings
    let ids = subtitle_file_ids
        .iter()
        .map(|id| Value::String(id.to_string()))
        .collect();
    let payload = transport.call("DownloadSubtitles", &[Value::from(token), Value::Array(ids)])?;
    Ok(decode_list(&payload)?)
}

fn search_movies<T: RpcTransport>(
    transport: &T,
    token: &str,
    query: &str,
) -> Result<Vec<MovieInfo>, ClientError> {
    let payload = transport.call("SearchMoviesOnIMDB", &[Value::from(token), Value::from(query)])?;
    Ok(decode_list(&payload)?)
}

/// Builds the criteria struct of a subtitle search
///
/// Empty strings, `None` and a zero size are omitted.
pub(crate) fn search_criteria(
    language: &str,
    file_size: u64,
    file_hash: Option<&str>,
    imdb_id: Option<&str>,
    query: Option<&str>,
) -> Struct {
    let mut criteria = Struct::new();

    let mut put = |key: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            criteria.insert(key.to_string(), Value::from(value));
        }
    };

    put("sublanguageid", Some(language));
    put("moviehash", file_hash);
    put("imdbid", imdb_id);
    put("query", query);

    if file_size > 0 {
        criteria.insert(
            "moviebytesize".to_string(),
            Value::String(file_size.to_string()),
        );
    }

    criteria
}
