//! Response decoding
//!
//! Responses from the subtitle service are loosely typed: a struct with a
//! `status` member, plus either scalar members or a `data` member holding a
//! sequence of structs. Decoding happens in two steps:
//!
//! 1. validate the status (anything but `200` is a protocol rejection),
//! 2. project the remaining members into a typed record via its
//!    [`FromRecord`] field table.
//!
//! Server info is the one response without a status member; it goes through
//! [`decode_server_info`], which is deliberately lenient.
mod types;

pub use types::{
    INTERNAL_CATALOG_ID_START, LoginToken, MovieInfo, ServerInfo, SubtitleFileContent, SubtitleInfo,
};

use crate::value::{Struct, Value};
use thiserror::Error;

/// Member holding the protocol status
const STATUS_FIELD: &str = "status";

/// Member holding the result sequence of list-shaped responses
const DATA_FIELD: &str = "data";

/// Errors that can occur while decoding a response payload
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The service rejected the call; carries the status text verbatim
    #[error("Request rejected by server: {0}")]
    Status(String),

    /// The payload (or one of its elements) is not a struct
    #[error("Expected a struct in {0}")]
    NotAStruct(&'static str),

    /// A required member is absent
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    /// A member is present but cannot be interpreted
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl DecodeError {
    /// Whether this error is a protocol-level rejection rather than a malformed payload
    pub fn is_rejection(&self) -> bool {
        matches!(self, DecodeError::Status(_))
    }
}

/// Read access to the members of a single payload struct
///
/// The accessors implement the coercion rules shared by all record types:
/// numeric-looking strings become numbers, and optional members fall back to
/// a default when absent.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    members: &'a Struct,
}

impl<'a> Record<'a> {
    /// Wraps a payload value, failing unless it is a struct
    pub fn new(value: &'a Value, context: &'static str) -> Result<Self, DecodeError> {
        value
            .as_struct()
            .map(|members| Self { members })
            .ok_or(DecodeError::NotAStruct(context))
    }

    /// Returns the raw member value
    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.members.get(field)
    }

    /// A required text member
    pub fn required_str(&self, field: &'static str) -> Result<String, DecodeError> {
        self.optional_str(field)?
            .ok_or(DecodeError::MissingField(field))
    }

    /// An optional text member
    pub fn optional_str(&self, field: &'static str) -> Result<Option<String>, DecodeError> {
        match self.members.get(field) {
            None | Some(Value::Nil) => Ok(None),
            Some(value) => value
                .coerce_string()
                .map(Some)
                .ok_or_else(|| invalid(field, "not text")),
        }
    }

    /// An optional text member, empty when absent
    pub fn str_or_default(&self, field: &'static str) -> Result<String, DecodeError> {
        Ok(self.optional_str(field)?.unwrap_or_default())
    }

    /// A required integer member
    pub fn required_u64(&self, field: &'static str) -> Result<u64, DecodeError> {
        self.optional_u64(field)?
            .ok_or(DecodeError::MissingField(field))
    }

    /// An optional integer member
    ///
    /// Empty strings count as absent; the service sends them for unset counters.
    pub fn optional_u64(&self, field: &'static str) -> Result<Option<u64>, DecodeError> {
        match self.members.get(field) {
            None | Some(Value::Nil) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(value) => value
                .coerce_i64()
                .and_then(|i| u64::try_from(i).ok())
                .map(Some)
                .ok_or_else(|| invalid(field, "not a non-negative integer")),
        }
    }

    /// An optional floating point member
    pub fn optional_f64(&self, field: &'static str) -> Result<Option<f64>, DecodeError> {
        match self.members.get(field) {
            None | Some(Value::Nil) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(value) => value
                .coerce_f64()
                .map(Some)
                .ok_or_else(|| invalid(field, "not a number")),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> DecodeError {
    DecodeError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

/// Trait for record types that can be projected out of a payload struct
///
/// Each implementor is a field table: it names the wire members it reads
/// and how absent optional members default.
pub trait FromRecord: Sized {
    /// Name used in error messages
    const CONTEXT: &'static str;

    /// Builds the record from the members of one struct
    fn from_record(record: &Record<'_>) -> Result<Self, DecodeError>;
}

/// Validates the protocol status of a payload
///
/// Succeeds only when the status starts with the code `200`. Any other
/// status is returned verbatim as [`DecodeError::Status`].
pub fn check_status(payload: &Value) -> Result<(), DecodeError> {
    let record = Record::new(payload, "response")?;
    let status = record.required_str(STATUS_FIELD)?;

    let code = status.split_whitespace().next().unwrap_or_default();
    if code == "200" {
        Ok(())
    } else {
        log::debug!("Server rejected request: {}", status);
        Err(DecodeError::Status(status))
    }
}

/// Decodes a status-bearing response into a single record
pub fn decode_single<T: FromRecord>(payload: &Value) -> Result<T, DecodeError> {
    check_status(payload)?;
    T::from_record(&Record::new(payload, T::CONTEXT)?)
}

/// Decodes a status-bearing response into a list of records
///
/// Elements keep the order the server sent them in. A `data` member of
/// `false` is how the service reports "no results" and yields an empty list.
pub fn decode_list<T: FromRecord>(payload: &Value) -> Result<Vec<T>, DecodeError> {
    check_status(payload)?;

    let data = payload
        .get(DATA_FIELD)
        .ok_or(DecodeError::MissingField(DATA_FIELD))?;

    match data {
        Value::Bool(false) | Value::Nil => Ok(Vec::new()),
        Value::Array(elements) => elements
            .iter()
            .map(|element| T::from_record(&Record::new(element, T::CONTEXT)?))
            .collect(),
        _ => Err(invalid(DATA_FIELD, "not a list")),
    }
}

/// Decodes a server info response
///
/// Server info carries no status member, so nothing is validated: a struct
/// payload is read leniently and anything else yields `None`.
pub fn decode_server_info(payload: &Value) -> Option<ServerInfo> {
    match payload.as_struct() {
        Some(members) => Some(ServerInfo::from_members(members)),
        None => {
            log::debug!("Ignoring malformed server info payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(members: Vec<(&str, Value)>) -> Value {
        Value::Struct(
            members
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn subtitle(id: &str, file_id: i64) -> Value {
        payload(vec![
            ("IDSubtitle", Value::from(id)),
            ("IDSubtitleFile", Value::Int(file_id)),
            ("SubLanguageID", Value::from("eng")),
        ])
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(&payload(vec![("status", Value::from("200 OK"))])).is_ok());

        match check_status(&payload(vec![("status", Value::from("401 Unauthorized"))])) {
            Err(DecodeError::Status(text)) => assert_eq!(text, "401 Unauthorized"),
            other => panic!("expected status error, got {:?}", other),
        }

        assert!(matches!(
            check_status(&payload(vec![])),
            Err(DecodeError::MissingField("status"))
        ));
        assert!(matches!(
            check_status(&Value::from("200 OK")),
            Err(DecodeError::NotAStruct(_))
        ));
    }

    #[test]
    fn test_failed_status_ignores_other_fields() {
        let response = payload(vec![
            ("status", Value::from("414 Unknown User Agent")),
            ("token", Value::from("would-be-token")),
            ("data", Value::Array(vec![subtitle("1", 1)])),
        ]);

        let login = decode_single::<LoginToken>(&response).unwrap_err();
        assert!(matches!(login, DecodeError::Status(ref s) if s == "414 Unknown User Agent"));

        let list = decode_list::<SubtitleInfo>(&response).unwrap_err();
        assert!(list.is_rejection());
    }

    #[test]
    fn test_decode_list_preserves_order() {
        let response = payload(vec![
            ("status", Value::from("200 OK")),
            (
                "data",
                Value::Array(vec![subtitle("30", 3), subtitle("10", 1), subtitle("20", 2)]),
            ),
        ]);

        let subtitles: Vec<SubtitleInfo> = decode_list(&response).unwrap();
        let ids: Vec<u64> = subtitles.iter().map(|s| s.id).collect();
        let file_ids: Vec<u64> = subtitles.iter().map(|s| s.subtitle_file_id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
        assert_eq!(file_ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_decode_list_empty_results() {
        let response = payload(vec![
            ("status", Value::from("200 OK")),
            ("data", Value::Bool(false)),
        ]);

        let subtitles: Vec<SubtitleInfo> = decode_list(&response).unwrap();
        assert!(subtitles.is_empty());
    }

    #[test]
    fn test_decode_list_missing_data() {
        let response = payload(vec![("status", Value::from("200 OK"))]);

        let error = decode_list::<MovieInfo>(&response).unwrap_err();
        assert!(matches!(error, DecodeError::MissingField("data")));
        assert!(!error.is_rejection());
    }

    #[test]
    fn test_decode_list_rejects_non_struct_element() {
        let response = payload(vec![
            ("status", Value::from("200 OK")),
            ("data", Value::Array(vec![Value::from("oops")])),
        ]);

        assert!(matches!(
            decode_list::<MovieInfo>(&response),
            Err(DecodeError::NotAStruct(_))
        ));
    }

    #[test]
    fn test_decode_login_token() {
        let response = payload(vec![
            ("status", Value::from("200 OK")),
            ("token", Value::from("abc123")),
            ("seconds", Value::Double(0.01)),
        ]);

        let token: LoginToken = decode_single(&response).unwrap();
        assert_eq!(token.token, "abc123");

        let missing = payload(vec![("status", Value::from("200 OK"))]);
        assert!(matches!(
            decode_single::<LoginToken>(&missing),
            Err(DecodeError::MissingField("token"))
        ));
    }

    #[test]
    fn test_record_coercion() {
        let value = payload(vec![
            ("count", Value::from("17")),
            ("empty", Value::from("")),
            ("rating", Value::from("7.5")),
            ("negative", Value::Int(-1)),
            ("list", Value::Array(vec![])),
        ]);
        let record = Record::new(&value, "test").unwrap();

        assert_eq!(record.required_u64("count").unwrap(), 17);
        assert_eq!(record.optional_u64("empty").unwrap(), None);
        assert_eq!(record.optional_u64("absent").unwrap(), None);
        assert_eq!(record.optional_f64("rating").unwrap(), Some(7.5));
        assert_eq!(record.required_str("count").unwrap(), "17");
        assert!(record.optional_u64("negative").is_err());
        assert!(record.optional_str("list").is_err());
        assert!(matches!(
            record.required_u64("absent"),
            Err(DecodeError::MissingField("absent"))
        ));
    }

    #[test]
    fn test_server_info_lenient() {
        assert!(decode_server_info(&Value::from("nonsense")).is_none());
        assert!(decode_server_info(&Value::Array(vec![])).is_none());

        let info = decode_server_info(&payload(vec![
            ("xmlrpc_version", Value::from("0.1")),
            ("application", Value::from("OpenSuber v0.2")),
            ("users_online_total", Value::Int(1234)),
            ("seconds", Value::Double(0.015)),
            ("movies_total", Value::from("not a number")),
        ]))
        .unwrap();

        assert_eq!(info.xmlrpc_version.as_deref(), Some("0.1"));
        assert_eq!(info.application.as_deref(), Some("OpenSuber v0.2"));
        assert_eq!(info.users_online_total, Some(1234));
        assert_eq!(info.movies_total, None);
        assert_eq!(info.seconds, Some(0.015));
        assert_eq!(info.contact, None);
    }
}
