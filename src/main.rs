use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spyn_match::acrcloud::AcrCloudClient;
use spyn_match::catalog::{Base44Catalog, JsonCatalog, TrackCatalog, DEFAULT_CANDIDATE_LIMIT};
use spyn_match::config::{AcrCloudConfig, Base44Config};
use spyn_match::history::{user_id_from_authorization, HistoryStore};
use spyn_match::models::MatchingStats;
use spyn_match::offline::{process_session, OfflineSession};
use spyn_match::progress::{create_spinner, format_duration, set_log_only};
use spyn_match::recognize::Reconciler;
use spyn_match::scoring::{ScoringWeights, ACCEPTANCE_THRESHOLD};
use spyn_match::selector::select_best_match_with;

#[derive(Parser)]
#[command(name = "spyn-match")]
#[command(about = "Identify DJ-set audio and reconcile it with the Spynners track catalog")]
struct Cli {
    /// Hide progress bars and log periodic progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    /// Rayon worker threads (0 = one per core)
    #[arg(long, global = true, default_value = "0")]
    workers: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Match a title/artist pair against the catalog
    Match(MatchArgs),
    /// Identify an audio file and reconcile the hit
    Recognize(RecognizeArgs),
    /// Process an offline session export
    Offline(OfflineArgs),
    /// Show stored recognitions for a user
    History(HistoryArgs),
}

/// Catalog source: a local JSON export, or Base44 when no file is given
#[derive(Args)]
struct CatalogArgs {
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[command(flatten)]
    base44: Base44Config,
}

impl CatalogArgs {
    fn open(&self) -> Result<Box<dyn TrackCatalog>> {
        match &self.catalog {
            Some(path) => {
                let catalog = JsonCatalog::from_file(path)
                    .with_context(|| format!("Failed to load catalog {:?}", path))?;
                Ok(Box::new(catalog))
            }
            None => {
                let catalog = Base44Catalog::new(self.base44.clone())
                    .context("Failed to configure Base44 catalog")?;
                Ok(Box::new(catalog))
            }
        }
    }
}

#[derive(Args)]
struct MatchArgs {
    title: String,

    #[arg(default_value = "")]
    artist: String,

    /// Acceptance threshold for the best candidate
    #[arg(long, default_value_t = ACCEPTANCE_THRESHOLD)]
    threshold: f64,

    #[arg(long, default_value_t = DEFAULT_CANDIDATE_LIMIT)]
    limit: usize,

    #[command(flatten)]
    catalog: CatalogArgs,
}

#[derive(Args)]
struct RecognizeArgs {
    audio: PathBuf,

    #[command(flatten)]
    catalog: CatalogArgs,

    #[command(flatten)]
    acrcloud: AcrCloudConfig,

    /// Store the result under the user in this bearer token
    #[arg(long, env = "SPYN_AUTHORIZATION", hide_env_values = true)]
    authorization: Option<String>,

    #[arg(long, default_value = "spyn-history.sqlite3")]
    history_db: PathBuf,
}

#[derive(Args)]
struct OfflineArgs {
    session: PathBuf,

    #[command(flatten)]
    catalog: CatalogArgs,

    #[command(flatten)]
    acrcloud: AcrCloudConfig,

    #[arg(long, default_value = "spyn-history.sqlite3")]
    history_db: PathBuf,

    /// Write matching stats as JSON
    #[arg(long)]
    stats: Option<PathBuf>,
}

#[derive(Args)]
struct HistoryArgs {
    user_id: String,

    #[arg(long, default_value = "20")]
    limit: usize,

    #[arg(long, default_value = "spyn-history.sqlite3")]
    history_db: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_match(args: MatchArgs) -> Result<()> {
    let catalog = args.catalog.open()?;

    let spinner = create_spinner("Fetching catalog tracks");
    let candidates = catalog
        .list_tracks(args.limit, None)
        .context("Failed to list catalog tracks")?;
    spinner.finish_with_message(format!("Fetched {} tracks", candidates.len()));

    let result = select_best_match_with(
        &ScoringWeights::DEFAULT,
        args.threshold,
        &args.title,
        &args.artist,
        &candidates,
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_recognize(args: RecognizeArgs) -> Result<()> {
    let catalog = args.catalog.open()?;
    let recognizer = AcrCloudClient::new(args.acrcloud).context("Failed to configure ACRCloud")?;
    let audio = std::fs::read(&args.audio)
        .with_context(|| format!("Failed to read audio file {:?}", args.audio))?;

    let reconciler = Reconciler::new(catalog.as_ref());
    let Some(result) = reconciler
        .recognize_audio(&recognizer, audio)
        .context("Recognition request failed")?
    else {
        println!("{}", serde_json::json!({"success": false, "message": "Could not identify the track"}));
        return Ok(());
    };

    if let Some(user_id) = args.authorization.as_deref().and_then(user_id_from_authorization) {
        let store = open_history(&args.history_db)?;
        store
            .record_recognition(&user_id, &result)
            .context("Failed to save recognition history")?;
        info!(user_id = %user_id, "recognition saved to history");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_offline(args: OfflineArgs) -> Result<()> {
    let start = Instant::now();
    let data = std::fs::read_to_string(&args.session)
        .with_context(|| format!("Failed to read session file {:?}", args.session))?;
    let session = OfflineSession::from_json(&data).context("Invalid session file")?;
    if session.session_id.is_empty() {
        bail!("Session file has an empty sessionId");
    }

    let catalog = args.catalog.open()?;
    let recognizer = AcrCloudClient::new(args.acrcloud).context("Failed to configure ACRCloud")?;

    let (report, stats) = process_session(&session, &recognizer, catalog.as_ref());
    stats.log_phase("offline");

    let store = open_history(&args.history_db)?;
    store
        .record_session(&report)
        .context("Failed to save offline session")?;

    if let Some(path) = &args.stats {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats {:?}", path))?;
    }

    print_summary(&stats, start);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_history(args: HistoryArgs) -> Result<()> {
    let store = open_history(&args.history_db)?;
    let entries = store.recent(&args.user_id, args.limit)?;
    if entries.is_empty() {
        println!("No recognitions stored for '{}'.", args.user_id);
        return Ok(());
    }
    for entry in entries {
        let r = &entry.result;
        println!(
            "[{}] {} - {}{}",
            entry.timestamp,
            r.artist,
            r.title,
            r.spynners_track_id
                .as_deref()
                .map(|id| format!(" (spynners: {})", id))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn open_history(path: &Path) -> Result<HistoryStore> {
    HistoryStore::open(path).with_context(|| format!("Failed to open history database {:?}", path))
}

fn print_summary(stats: &MatchingStats, start: Instant) {
    eprintln!("\n{:=<60}", "");
    eprintln!("Session processed in {}", format_duration(start.elapsed()));
    eprintln!("  Recordings:     {}", stats.recordings);
    eprintln!("  Recognized:     {}", stats.recognized);
    eprintln!("  Not recognized: {}", stats.not_recognized);
    eprintln!("  Errors:         {}", stats.errors);
    eprintln!(
        "  Linked:         {} ({:.1}%)",
        stats.linked(),
        stats.match_rate()
    );
    eprintln!("{:=<60}", "");
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    set_log_only(cli.log_only);

    if cli.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    match cli.command {
        Command::Match(args) => run_match(args),
        Command::Recognize(args) => run_recognize(args),
        Command::Offline(args) => run_offline(args),
        Command::History(args) => run_history(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_recognize_and_offline_parse() {
        let cli = Cli::try_parse_from([
            "spyn-match",
            "recognize",
            "a.wav",
            "--acrcloud-timeout",
            "12",
            "--base44-timeout",
            "4",
        ])
        .unwrap();
        match cli.command {
            Command::Recognize(args) => {
                assert_eq!(args.acrcloud.timeout_secs, 12);
                assert_eq!(args.catalog.base44.timeout_secs, 4);
            }
            _ => panic!("expected recognize"),
        }

        let cli = Cli::try_parse_from(["spyn-match", "--log-only", "offline", "session.json"]).unwrap();
        assert!(cli.log_only);
        assert!(matches!(cli.command, Command::Offline(_)));
    }

    #[test]
    fn test_match_defaults() {
        let cli = Cli::try_parse_from(["spyn-match", "match", "Midnight Drive", "--catalog", "c.json"]).unwrap();
        match cli.command {
            Command::Match(args) => {
                assert_eq!(args.artist, "");
                assert_eq!(args.threshold, ACCEPTANCE_THRESHOLD);
                assert_eq!(args.limit, DEFAULT_CANDIDATE_LIMIT);
                assert_eq!(args.catalog.catalog, Some(PathBuf::from("c.json")));
            }
            _ => panic!("expected match"),
        }
    }
}
