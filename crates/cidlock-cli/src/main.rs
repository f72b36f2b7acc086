//! cidlock: encrypted, content-addressed file envelopes
//!
//! Commands:
//!   upload <file>              - encrypt + upload, save the envelope record
//!   download <cid-or-record>   - fetch + decrypt to a local file
//!   view <cid-or-record>       - fetch + decrypt to stdout
//!   publish <cid-or-record>    - write a shareable record with the plain CID
//!   delete <cid-or-record>     - remove one uploaded envelope from the backend
//!   status                     - backend health and session source
//!   config show                - display current configuration

mod signature;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use cidlock_core::config::{expand_tilde, CidlockConfig};
use cidlock_crypto::RetrievalMode;
use cidlock_storage::{open_backend, EnvelopeBackend};
use cidlock_transfer::engine;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cidlock",
    version,
    about = "Client-side encrypted, content-addressed file storage",
    long_about = "cidlock: encrypt files under your wallet signature, store them by CID, \
                  and fetch them back"
)]
struct Cli {
    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "CIDLOCK_CONFIG",
        default_value = "~/.config/cidlock/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [logging] level
    #[arg(long, env = "CIDLOCK_LOG")]
    log: Option<String>,

    /// Log format; overrides [logging] format
    #[arg(long, env = "CIDLOCK_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file and upload its envelope
    Upload {
        /// Local file
        file: PathBuf,
        /// MIME type recorded in the encrypted metadata
        #[arg(long, short = 't')]
        content_type: Option<String>,
        /// Where to save the envelope record (default: <file>.cidlock.json)
        #[arg(long, short = 'r')]
        record: Option<PathBuf>,
    },

    /// Fetch and decrypt a file
    Download {
        /// Storage CID, or path to a saved envelope record
        target: String,
        /// Destination file or directory (default: current dir + recorded name)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// Which identifier to trust: original (wrapped) or public (plain)
        #[arg(long, short = 'm', default_value = "original")]
        mode: RetrievalMode,
    },

    /// Fetch and decrypt a file to stdout
    View {
        /// Storage CID, or path to a saved envelope record
        target: String,
        #[arg(long, short = 'm', default_value = "original")]
        mode: RetrievalMode,
    },

    /// Produce a shareable record carrying the plaintext CID
    Publish {
        /// Storage CID, or path to a saved envelope record
        target: String,
        /// Where to save the public record (default: <cid>.public.json)
        #[arg(long, short = 'r')]
        record: Option<PathBuf>,
    },

    /// Remove one of your uploads from the backend
    ///
    /// The ciphertext stays while other uploads of the same content exist.
    Delete {
        /// Storage CID, or path to the envelope record saved at upload
        target: String,
    },

    /// Show backend health and where the signature comes from
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = CidlockConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);
    debug!(config = %config_path.display(), "cidlock starting");

    match cli.command {
        Commands::Upload {
            file,
            content_type,
            record,
        } => cmd_upload(&config, &file, content_type.as_deref(), record.as_deref()).await,
        Commands::Download { target, out, mode } => {
            cmd_download(&config, &target, out.as_deref(), mode).await
        }
        Commands::View { target, mode } => cmd_view(&config, &target, mode).await,
        Commands::Publish { target, record } => {
            cmd_publish(&config, &target, record.as_deref()).await
        }
        Commands::Delete { target } => cmd_delete(&config, &target).await,
        Commands::Status => cmd_status(&config, &config_path).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

/// Logs go to stderr; stdout carries `view` output.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn backend(config: &CidlockConfig) -> Result<Box<dyn EnvelopeBackend>> {
    open_backend(config).with_context(|| format!("opening {:?} backend", config.backend.kind))
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// `<file>.cidlock.json` next to the uploaded file
fn default_record_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".cidlock.json");
    PathBuf::from(name)
}

// ── `cidlock upload` ──────────────────────────────────────────────────────────

async fn cmd_upload(
    config: &CidlockConfig,
    file: &Path,
    content_type: Option<&str>,
    record_path: Option<&Path>,
) -> Result<()> {
    let session = signature::open_session(&config.session)?;
    let backend = backend(config)?;

    let pb = make_spinner("upload");
    let pb_clone = pb.clone();
    let progress: engine::ProgressFn = Box::new(move |_, _, msg| {
        pb_clone.set_message(msg.to_string());
    });

    let result = engine::upload_file(backend.as_ref(), &session, file, content_type, Some(&progress))
        .await;
    pb.finish_and_clear();
    let result = result.with_context(|| format!("uploading {}", file.display()))?;

    let record_path = record_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_record_path(file));
    engine::save_record(&result.record, &record_path)
        .await
        .with_context(|| format!("saving record: {}", record_path.display()))?;

    println!("uploaded:   {}", file.display());
    println!("  cid:        {}", result.key);
    println!("  bytes:      {}", result.bytes);
    println!("  encryption: {:.2?}", result.encryption_time);
    println!("  record:     {}", record_path.display());
    if result.deduplicated {
        println!("  (ciphertext already stored; not re-sent)");
    }
    Ok(())
}

// ── `cidlock download` / `cidlock view` ───────────────────────────────────────

async fn cmd_download(
    config: &CidlockConfig,
    target: &str,
    out: Option<&Path>,
    mode: RetrievalMode,
) -> Result<()> {
    let session = signature::open_session(&config.session)?;
    let backend = backend(config)?;
    let record = engine::resolve_record(backend.as_ref(), &session, target).await?;

    let dest = out.unwrap_or_else(|| Path::new("."));
    let pb = make_spinner("download");
    pb.set_message(record.cid_of_encrypted_buffer_str.clone());
    let result = engine::download_file(backend.as_ref(), &session, &record, dest, mode).await;
    pb.finish_and_clear();
    let result = result?;

    println!("downloaded: {}", result.local_path.display());
    println!("  cid:   {}", result.key);
    println!("  bytes: {}", result.bytes);
    println!("  type:  {}", result.metadata.mime_type);
    Ok(())
}

async fn cmd_view(config: &CidlockConfig, target: &str, mode: RetrievalMode) -> Result<()> {
    let session = signature::open_session(&config.session)?;
    let backend = backend(config)?;
    let record = engine::resolve_record(backend.as_ref(), &session, target).await?;

    let file = engine::fetch_file(backend.as_ref(), &session, &record, mode).await?;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(&file.bytes)
        .await
        .context("writing to stdout")?;
    stdout.flush().await.context("flushing stdout")?;
    Ok(())
}

// ── `cidlock publish` ─────────────────────────────────────────────────────────

async fn cmd_publish(config: &CidlockConfig, target: &str, record_path: Option<&Path>) -> Result<()> {
    let session = signature::open_session(&config.session)?;
    let backend = backend(config)?;
    let record = engine::resolve_record(backend.as_ref(), &session, target).await?;

    let public = engine::publish(&session, &record).await?;

    let record_path = record_path.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(format!("{}.public.json", public.cid_of_encrypted_buffer_str))
    });
    engine::save_record(&public, &record_path)
        .await
        .with_context(|| format!("saving public record: {}", record_path.display()))?;

    println!("published:  {}", public.cid_of_encrypted_buffer_str);
    if let Some(cid) = &public.cid_original_str {
        println!("  plain cid: {cid}");
    }
    println!("  record:    {}", record_path.display());
    Ok(())
}

// ── `cidlock delete` ──────────────────────────────────────────────────────────

async fn cmd_delete(config: &CidlockConfig, target: &str) -> Result<()> {
    let session = signature::open_session(&config.session)?;
    let backend = backend(config)?;
    let record = engine::resolve_record(backend.as_ref(), &session, target).await?;

    engine::delete_file(backend.as_ref(), &record).await?;
    println!("deleted: {}", record.cid_of_encrypted_buffer_str);
    if let Some(id) = &record.id {
        println!("  record: {id}");
    }
    Ok(())
}

// ── `cidlock status` ──────────────────────────────────────────────────────────

async fn cmd_status(config: &CidlockConfig, config_path: &Path) -> Result<()> {
    println!("cidlock {}", env!("CARGO_PKG_VERSION"));
    println!("  config:    {}", config_path.display());
    println!("  backend:   {:?}", config.backend.kind);

    let signature_set = std::env::var(&config.session.signature_env)
        .map(|v| !v.is_empty())
        .unwrap_or(false);
    let env = &config.session.signature_env;
    if signature_set {
        println!("  signature: from ${env}");
    } else {
        println!("  signature: prompt (set ${env} to skip)");
    }

    let backend = backend(config)?;
    match backend.health().await {
        Ok(()) => {
            println!("  storage:   ok ({})", backend.name());
            Ok(())
        }
        Err(e) => {
            println!("  storage:   UNREACHABLE ({e})");
            Err(e).context("backend health check failed")
        }
    }
}

// ── `cidlock config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &CidlockConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
