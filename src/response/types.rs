/// Typed records produced by the response decoders.
///
/// Each `FromRecord` implementation is the field table for one record type:
/// it maps the service's wire member names onto the record's fields.
use super::{DecodeError, FromRecord, Record};
use crate::value::{Struct, Value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;

/// Movie ids at or above this value are entries the service added to its own
/// catalog rather than mirrored from IMDb.
pub const INTERNAL_CATALOG_ID_START: u64 = 10_000_000;

/// Session token issued by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginToken {
    /// The opaque token string
    pub token: String,
}

impl FromRecord for LoginToken {
    const CONTEXT: &'static str = "login response";

    fn from_record(record: &Record<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            token: record.required_str("token")?,
        })
    }
}

/// Snapshot of the remote server's metadata.
///
/// Every field is optional: this response has no status member and is read
/// leniently, so members that are missing or unreadable are left empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    /// XML-RPC interface version
    pub xmlrpc_version: Option<String>,
    /// Canonical XML-RPC endpoint URL
    pub xmlrpc_url: Option<String>,
    /// Server application name and version
    pub application: Option<String>,
    /// Contact address of the operators
    pub contact: Option<String>,
    /// Website URL
    pub website_url: Option<String>,
    /// Users currently online
    pub users_online_total: Option<u64>,
    /// Users currently logged in
    pub users_loggedin: Option<u64>,
    /// Highest number of simultaneous users
    pub users_max_alltime: Option<u64>,
    /// Total subtitle downloads
    pub subs_downloads: Option<u64>,
    /// Total subtitle files
    pub subs_subtitle_files: Option<u64>,
    /// Total movies in the catalog
    pub movies_total: Option<u64>,
    /// Last update timestamp per language code
    pub last_update_strings: BTreeMap<String, String>,
    /// Server processing time of the request in seconds
    pub seconds: Option<f64>,
}

impl ServerInfo {
    pub(super) fn from_members(members: &Struct) -> Self {
        let text = |field: &str| members.get(field).and_then(Value::coerce_string);
        let count = |field: &str| {
            members
                .get(field)
                .and_then(Value::coerce_i64)
                .and_then(|i| u64::try_from(i).ok())
        };

        let last_update_strings: BTreeMap<String, String> = members
            .get("last_update_strings")
            .and_then(Value::as_struct)
            .map(|updates| {
                updates
                    .iter()
                    .filter_map(|(lang, stamp)| Some((lang.clone(), stamp.coerce_string()?)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            xmlrpc_version: text("xmlrpc_version"),
            xmlrpc_url: text("xmlrpc_url"),
            application: text("application"),
            contact: text("contact"),
            website_url: text("website_url"),
            users_online_total: count("users_online_total"),
            users_loggedin: count("users_loggedin"),
            users_max_alltime: count("users_max_alltime"),
            subs_downloads: count("subs_downloads"),
            subs_subtitle_files: count("subs_subtitle_files"),
            movies_total: count("movies_total"),
            last_update_strings,
            seconds: members.get("seconds").and_then(Value::coerce_f64),
        }
    }
}

/// A movie found by title search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieInfo {
    /// IMDb id (without the `tt` prefix), or an internal catalog id
    pub id: u64,
    /// Movie title as listed by the service
    pub title: String,
    /// Release year, if known
    pub year: Option<u16>,
}

impl MovieInfo {
    /// Whether the entry was added to the service's own catalog
    pub fn is_internal_catalog_entry(&self) -> bool {
        self.id >= INTERNAL_CATALOG_ID_START
    }
}

impl FromRecord for MovieInfo {
    const CONTEXT: &'static str = "movie result";

    fn from_record(record: &Record<'_>) -> Result<Self, DecodeError> {
        let title = record.required_str("title")?;
        let year = match record.optional_u64("year")? {
            Some(year) => u16::try_from(year).ok(),
            None => year_from_title(&title),
        };

        Ok(Self {
            id: record.required_u64("id")?,
            title,
            year,
        })
    }
}

/// Extracts a trailing `(YYYY)` from a title like `Heat (1995)`
fn year_from_title(title: &str) -> Option<u16> {
    let inner = title.trim_end().strip_suffix(')')?;
    let (_, candidate) = inner.rsplit_once('(')?;
    if candidate.len() == 4 && candidate.chars().all(|c| c.is_ascii_digit()) {
        candidate.parse().ok()
    } else {
        None
    }
}

/// A subtitle found by search.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleInfo {
    /// Subtitle id
    pub id: u64,
    /// Id of the subtitle file, used for downloading
    pub subtitle_file_id: u64,
    /// Subtitle language code
    pub language: String,
    /// Original file name
    pub file_name: String,
    /// Subtitle format (e.g. `srt`)
    pub format: String,
    /// Number of downloads
    pub downloads: u64,
    /// Link to the subtitle's info page
    pub info_link: String,
    /// Direct download link
    pub download_link: String,
    /// Zip archive download link
    pub zip_download_link: String,
    /// Which search criterion matched (e.g. `moviehash`, `imdbid`)
    pub matched_by: String,
    /// User rating
    pub rating: f32,
    /// Number of discs the subtitle spans
    pub disc_count: u32,
    /// Name of the movie the subtitle belongs to
    pub movie_name: String,
}

impl FromRecord for SubtitleInfo {
    const CONTEXT: &'static str = "subtitle result";

    fn from_record(record: &Record<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            id: record.required_u64("IDSubtitle")?,
            subtitle_file_id: record.required_u64("IDSubtitleFile")?,
            language: record.str_or_default("SubLanguageID")?,
            file_name: record.str_or_default("SubFileName")?,
            format: record.str_or_default("SubFormat")?,
            downloads: record.optional_u64("SubDownloadsCnt")?.unwrap_or_default(),
            info_link: record.str_or_default("SubtitlesLink")?,
            download_link: record.str_or_default("SubDownloadLink")?,
            zip_download_link: record.str_or_default("ZipDownloadLink")?,
            matched_by: record.str_or_default("MatchedBy")?,
            rating: record.optional_f64("SubRating")?.unwrap_or_default() as f32,
            disc_count: record
                .optional_u64("SubSumCD")?
                .map(|cds| u32::try_from(cds).unwrap_or(u32::MAX))
                .unwrap_or_default(),
            movie_name: record.str_or_default("MovieName")?,
        })
    }
}

/// A downloaded subtitle file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleFileContent {
    /// Id of the subtitle file
    pub subtitle_file_id: u64,
    /// Decoded file content
    pub content: Vec<u8>,
}

impl FromRecord for SubtitleFileContent {
    const CONTEXT: &'static str = "download result";

    fn from_record(record: &Record<'_>) -> Result<Self, DecodeError> {
        let subtitle_file_id = record.required_u64("idsubtitlefile")?;

        let encoded = match record.get("data") {
            None | Some(Value::Nil) => return Err(DecodeError::MissingField("data")),
            Some(Value::Base64(bytes)) => bytes.clone(),
            Some(Value::String(text)) => {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD.decode(compact).map_err(|e| DecodeError::InvalidField {
                    field: "data",
                    reason: format!("invalid base64: {}", e),
                })?
            }
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    field: "data",
                    reason: "not text".to_string(),
                });
            }
        };

        Ok(Self {
            subtitle_file_id,
            content: gunzip(encoded)?,
        })
    }
}

/// Decompresses gzip data, passing anything else through unchanged
fn gunzip(bytes: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
    const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes);
    }

    let mut content = Vec::new();
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut content)
        .map_err(|e| DecodeError::InvalidField {
            field: "data",
            reason: format!("invalid gzip stream: {}", e),
        })?;
    Ok(content)
}
