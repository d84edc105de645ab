use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use relay_core::types::{AppConfig, Config, LifecycleState, Record, RecordId, SavedConfig};
use relay_core::{Command, CommandOutcome, RelayCore, Submission};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "Local administration of a relay store", long_about = None)]
struct Cli {
    /// Data directory (defaults to $RELAY_DATA_DIR or ~/.relay)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show capacity usage and record counts
    Stats,
    /// List messages, newest first
    List {
        /// List clips instead of messages
        #[arg(long)]
        clips: bool,
    },
    /// Store a text message
    AddText { text: String },
    /// Store a clip
    AddClip { text: String },
    /// Upload a file as a file message
    Upload {
        path: PathBuf,
        /// Name to store the file under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Write a file message's contents to a path
    Export {
        id: String,
        /// Destination (defaults to the stored file name in the current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a message by id
    Delete { id: String },
    /// Mark a message as recently used
    Touch { id: String },
    /// Delete expired messages
    Sweep,
    /// Rebuild the capacity ledger from the stored records
    Recount,
    /// Run a maintenance command, e.g. `delete-5-files` or `zip-all-files`
    Exec { command: String },
    /// Write config.toml with default values if it doesn't exist
    InitConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("RELAY_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let base_path = cli.data_dir.unwrap_or_else(default_data_dir);

    match cli.command {
        Commands::InitConfig => init_config(&base_path),
        command => run(&open_core(base_path)?, command, SystemTime::now()),
    }
}

fn run(core: &RelayCore, command: Commands, now: SystemTime) -> Result<()> {
    match command {
        Commands::Stats => {
            let usage = core.usage()?;
            println!(
                "used {} of {} bytes ({} available)",
                usage.used,
                usage.capacity,
                usage.available()
            );
            println!(
                "{} messages, {} files, {} clips, {} grey",
                core.message_count()?,
                core.all_files()?.len(),
                core.clip_count()?,
                core.find_grey(now)?.len()
            );
            println!("last issued id {}", core.current_id()?);
        }
        Commands::List { clips } => {
            let mut records = if clips {
                core.all_clips()?
            } else {
                core.all_messages()?
            };
            records.reverse();
            for record in &records {
                print_record(core, record, now);
            }
        }
        Commands::AddText { text } => report_submission(&core.submit_text(&text, now)?),
        Commands::AddClip { text } => report_submission(&core.submit_clip(&text, now)?),
        Commands::Upload { path, name } => {
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .context("path has no usable file name")?,
            };
            let bytes =
                std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let outcome = core.upload_file(&name, &bytes, now)?;
            report_submission(&outcome.submission);
            if !outcome.swept.is_empty() {
                println!("swept {} expired messages", outcome.swept.len());
            }
        }
        Commands::Export { id, out } => {
            let id = parse_id(&id)?;
            let record = core.get(&id)?.with_context(|| format!("no message {id}"))?;
            let bytes = core.read_file(&id)?;
            let out = match out {
                Some(out) => out,
                None => Path::new(record.file_name())
                    .file_name()
                    .map(PathBuf::from)
                    .context("stored file name is not a usable path")?,
            };
            std::fs::write(&out, &bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), out.display());
        }
        Commands::Delete { id } => {
            let record = core.delete(&parse_id(&id)?)?;
            println!("deleted {}", record.id());
        }
        Commands::Touch { id } => {
            let record = core.touch(&parse_id(&id)?, now)?;
            print_record(core, &record, now);
        }
        Commands::Sweep => {
            let removed = core.sweep(now)?;
            println!("swept {} expired messages", removed.len());
        }
        Commands::Recount => {
            let total = core.recount()?;
            println!("ledger total is {total} bytes");
        }
        Commands::Exec { command } => {
            let command: Command = command.parse()?;
            match core.execute(command, now)? {
                CommandOutcome::Zipped(record) => {
                    println!("created {} ({} bytes)", record.file_name(), record.file_size());
                }
                CommandOutcome::Deleted(ids) => println!("deleted {} messages", ids.len()),
            }
        }
        Commands::InitConfig => init_config(core.data_dir())?,
    }

    Ok(())
}

/// Uses `RELAY_DATA_DIR` if set, otherwise `~/.relay`.
fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RELAY_DATA_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".relay"),
        None => PathBuf::from(".relay"),
    }
}

fn load_saved_config(base_path: &Path) -> Result<SavedConfig> {
    let path = AppConfig::path(base_path);
    let app = AppConfig::load(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    let errors = app.validate();
    if errors.is_empty() {
        return Ok(SavedConfig::from(&app));
    }
    for error in &errors {
        warn!(path = %path.display(), "{error}, using default");
    }
    Ok(SavedConfig::from(&app.with_defaults_for_invalid()))
}

fn open_core(base_path: PathBuf) -> Result<RelayCore> {
    let saved = load_saved_config(&base_path)?;
    let core = RelayCore::open(Config { base_path, saved })
        .context("failed to open relay store")?;
    Ok(core)
}

fn init_config(base_path: &Path) -> Result<()> {
    let path = AppConfig::path(base_path);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    std::fs::create_dir_all(base_path)?;
    AppConfig::default().save(&path)?;
    info!(path = %path.display(), "wrote default config");
    Ok(())
}

fn parse_id(id: &str) -> Result<RecordId> {
    RecordId::try_new(id.to_string()).with_context(|| format!("invalid id {id:?}"))
}

fn report_submission(submission: &Submission) {
    match submission {
        Submission::Stored { record, evicted } => {
            println!("stored {}", record.id());
            if !evicted.is_empty() {
                println!("evicted {} old clips", evicted.len());
            }
        }
        Submission::Refreshed(record) => println!("refreshed {}", record.id()),
    }
}

fn print_record(core: &RelayCore, record: &Record, now: SystemTime) {
    let state = match core.lifecycle_state(record, now) {
        LifecycleState::Fresh => "",
        LifecycleState::Grey => " [grey]",
        LifecycleState::Expired => " [expired]",
    };
    if record.is_file() {
        println!(
            "{}  {}  {} ({} bytes){state}",
            record.id(),
            record.updated_at_iso(),
            record.file_name(),
            record.file_size()
        );
    } else {
        let preview: String = record.text_content().chars().take(60).collect();
        println!("{}  {}  {preview}{state}", record.id(), record.updated_at_iso());
    }
}
