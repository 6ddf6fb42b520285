use clap::{Parser, Subcommand};
use humansize::{DECIMAL, format_size};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use subtitle_sleuth::{
    ClientConfig, ClientError, ConfigError, FingerprintError, MovieInfo, RpcTransport,
    SubtitleClient, SubtitleFileContent, SubtitleInfo, compute_fingerprint,
};
use thiserror::Error;

/// Leading bytes inspected when guessing whether a file is a video
const SNIFF_LEN: u64 = 8 * 1024;

/// Errors reported by the command line tool
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error("Not a file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error("Cannot create {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    #[error("Cannot write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },
}

/// Find and download subtitles for your video files
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a JSON config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// XML-RPC endpoint of the subtitle service
    #[arg(long, global = true)]
    server: Option<String>,

    /// User agent registered with the subtitle service
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Account name (anonymous login if omitted)
    #[arg(long, global = true, requires = "password")]
    username: Option<String>,

    /// Account password
    #[arg(long, global = true, requires = "username")]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show information about the subtitle server
    Info,

    /// Print the fingerprint of a video file
    Hash {
        /// The video file to fingerprint
        file: PathBuf,
    },

    /// Search subtitles by video file, IMDb id and/or title
    Search {
        /// Subtitle language (ISO 639-2, e.g. "eng"; comma-separated for several)
        #[arg(long, default_value = "eng")]
        lang: String,

        /// Identify the movie by this local video file
        #[arg(long)]
        file: Option<PathBuf>,

        /// IMDb id without the "tt" prefix
        #[arg(long)]
        imdb: Option<String>,

        /// Free-text query (movie or episode title)
        #[arg(long)]
        query: Option<String>,
    },

    /// Search movies by title
    Movies {
        /// The title to look for
        title: String,
    },

    /// Download a subtitle file by its subtitle file id
    Download {
        /// Subtitle file id as shown by `search`
        id: u64,

        /// Directory to write the subtitle file to
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
}

/// Loads the config file and applies command line overrides
fn resolve_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::load_default()?,
    };

    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }
    if let Some(user_agent) = &cli.user_agent {
        config.user_agent = user_agent.clone();
    }

    Ok(config)
}

fn print_subtitles(subtitles: &[SubtitleInfo]) {
    if subtitles.is_empty() {
        println!("No subtitles found.");
        return;
    }

    for (index, subtitle) in subtitles.iter().enumerate() {
        println!("Subtitle #{}", index + 1);
        println!("  File id:   {}", subtitle.subtitle_file_id);
        println!("  Name:      {}", subtitle.file_name);
        println!("  Movie:     {}", subtitle.movie_name);
        println!(
            "  Language:  {} ({}, {} CD)",
            subtitle.language, subtitle.format, subtitle.disc_count
        );
        println!(
            "  Rating:    {:.1} ({} downloads, matched by {})",
            subtitle.rating, subtitle.downloads, subtitle.matched_by
        );
        println!("  Link:      {}", subtitle.info_link);
        println!();
    }

    println!("Found {} subtitle(s)!", subtitles.len());
}

fn print_movies(movies: &[MovieInfo]) {
    if movies.is_empty() {
        println!("No movies found.");
        return;
    }

    for movie in movies {
        match movie.year {
            Some(year) => println!("  {}  {} [{}]", movie_reference(movie), movie.title, year),
            None => println!("  {}  {}", movie_reference(movie), movie.title),
        }
    }
}

/// IMDb style `tt` reference, or the bare id for the service's own catalog
fn movie_reference(movie: &MovieInfo) -> String {
    if movie.is_internal_catalog_entry() {
        format!("{} [catalog]", movie.id)
    } else {
        format!("tt{:07}", movie.id)
    }
}

fn print_fingerprint(file: &Path) -> Result<(), CliError> {
    if !file.is_file() {
        return Err(CliError::NotAFile {
            path: file.to_path_buf(),
        });
    }

    let fingerprint = compute_fingerprint(file)?;

    let sniffed = File::open(file).and_then(|handle| {
        let mut head = Vec::new();
        handle.take(SNIFF_LEN).read_to_end(&mut head)?;
        Ok(head)
    });
    if !matches!(sniffed, Ok(head) if infer::is_video(&head)) {
        eprintln!(
            "Warning: {} does not look like a video file, the fingerprint is unlikely to match anything",
            file.display()
        );
    }

    println!("File: {}", file.display());
    println!("Size: {} ({} bytes)", format_size(fingerprint.size, DECIMAL), fingerprint.size);
    println!("Hash: {}", fingerprint.hex());
    Ok(())
}

fn write_downloads(client: &SubtitleClient, id: u64, output: &Path) -> Result<(), CliError> {
    let files = client.download_subtitles(id)?;
    if files.is_empty() {
        println!("Nothing to download for subtitle file {}.", id);
        return Ok(());
    }

    save_subtitles(&files, output)
}

/// Writes each subtitle file as `<file id>.srt` into `output`
fn save_subtitles(files: &[SubtitleFileContent], output: &Path) -> Result<(), CliError> {
    fs::create_dir_all(output).map_err(|e| CliError::CreateDirFailed {
        path: output.to_path_buf(),
        source: e,
    })?;

    for file in files {
        let path = output.join(format!("{}.srt", file.subtitle_file_id));
        fs::write(&path, &file.content).map_err(|e| CliError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;
        println!(
            "Saved {} ({})",
            path.display(),
            format_size(file.content.len() as u64, DECIMAL)
        );
    }

    Ok(())
}

/// Runs a command that needs a session, logging out afterwards
fn with_session<F>(cli: &Cli, config: &ClientConfig, command: F) -> Result<(), CliError>
where
    F: FnOnce(&SubtitleClient) -> Result<(), CliError>,
{
    let mut client = SubtitleClient::connect(config)?;

    match (&cli.username, &cli.password) {
        (Some(username), Some(password)) => {
            client.login(username, password, &config.language, &config.user_agent)?
        }
        _ => client.login_anonymous(&config.language, &config.user_agent)?,
    }

    run_logged_in(&mut client, command)
}

/// Runs `command` and logs out, whether or not the command succeeded
fn run_logged_in<T, F>(client: &mut SubtitleClient<T>, command: F) -> Result<(), CliError>
where
    T: RpcTransport,
    F: FnOnce(&SubtitleClient<T>) -> Result<(), CliError>,
{
    let result = command(client);

    if let Err(e) = client.logout() {
        log::warn!("Logout failed: {}", e);
    }

    result
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = resolve_config(cli)?;

    match &cli.command {
        Command::Info => {
            let client = SubtitleClient::connect(&config)?;
            match client.server_info()? {
                Some(info) => {
                    println!("Server:   {}", config.server_url);
                    println!("Application: {}", info.application.as_deref().unwrap_or("unknown"));
                    println!("Version:  {}", info.xmlrpc_version.as_deref().unwrap_or("unknown"));
                    if let Some(online) = info.users_online_total {
                        println!("Online:   {} user(s)", online);
                    }
                    if let Some(subtitles) = info.subs_subtitle_files {
                        println!("Subtitles: {}", subtitles);
                    }
                }
                None => println!("Server did not return any information."),
            }
            Ok(())
        }
        Command::Hash { file } => print_fingerprint(file),
        Command::Search {
            lang,
            file,
            imdb,
            query,
        } => with_session(cli, &config, |client| {
            let subtitles =
                client.search_subtitles(lang, file.as_deref(), imdb.as_deref(), query.as_deref())?;
            print_subtitles(&subtitles);
            Ok(())
        }),
        Command::Movies { title } => with_session(cli, &config, |client| {
            print_movies(&client.search_movies_by_title(title)?);
            Ok(())
        }),
        Command::Download { id, output } => {
            with_session(cli, &config, |client| write_downloads(client, *id, output))
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("\nError: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use subtitle_sleuth::{Struct, TransportError, Value};

    /// Answers every call with a `200 OK` status and records the method names
    #[derive(Default)]
    struct AcceptingTransport {
        methods: RefCell<Vec<String>>,
    }

    impl RpcTransport for AcceptingTransport {
        fn call(&self, method: &str, _params: &[Value]) -> Result<Value, TransportError> {
            self.methods.borrow_mut().push(method.to_string());

            let mut members = Struct::new();
            members.insert("status".to_string(), Value::from("200 OK"));
            if method == "LogIn" {
                members.insert("token".to_string(), Value::from("tok"));
            }
            Ok(Value::Struct(members))
        }
    }

    fn subtitle_file(id: u64, content: &str) -> SubtitleFileContent {
        SubtitleFileContent {
            subtitle_file_id: id,
            content: content.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_failed_save_still_logs_out() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let output = blocker.join("subs");

        let transport = AcceptingTransport::default();
        let mut client = SubtitleClient::with_transport(&transport);
        client.login_anonymous("en", "TestAgent").unwrap();

        let result = run_logged_in(&mut client, |_| {
            save_subtitles(&[subtitle_file(7, "1\n")], &output)
        });

        assert!(matches!(result, Err(CliError::CreateDirFailed { .. })));
        assert_eq!(*transport.methods.borrow(), vec!["LogIn", "LogOut"]);
        assert!(!client.is_logged_in());
    }

    #[test]
    fn test_save_subtitles_names_files_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("subs");

        save_subtitles(&[subtitle_file(11, "one"), subtitle_file(12, "two")], &output).unwrap();

        assert_eq!(fs::read_to_string(output.join("11.srt")).unwrap(), "one");
        assert_eq!(fs::read_to_string(output.join("12.srt")).unwrap(), "two");
    }

    #[test]
    fn test_movie_reference() {
        let imdb = MovieInfo {
            id: 133093,
            title: "The Matrix".to_string(),
            year: Some(1999),
        };
        let catalog = MovieInfo {
            id: 10_000_042,
            title: "Home Video".to_string(),
            year: None,
        };

        assert_eq!(movie_reference(&imdb), "tt0133093");
        assert_eq!(movie_reference(&catalog), "10000042 [catalog]");
    }
}
