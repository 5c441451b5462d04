use agent_logstore::engine::DEFAULT_FILE_NAME;
use agent_logstore::{sdk, EventType, LogReader, LogWriter, Meta, QueryFilter, Unlocker};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Reads and edits the encrypted agent log", long_about = None)]
struct Cli {
    #[arg(short = 'f', long, env = "AGENTLOG_PATH", default_value = DEFAULT_FILE_NAME)]
    path: String,

    /// Password used to unlock the log before running the command. May be
    /// omitted when talking to a daemon that is already unlocked.
    #[arg(short, long, env = "AGENTLOG_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Unlock (creating the log on first use) and print every record.
    Unlock,
    /// Print records, optionally filtered.
    List {
        /// email_summary, resume_tailor, other, or All
        #[arg(short = 't', long = "type")]
        event_type: Option<String>,
        /// Inclusive lower date bound, YYYY-MM-DD
        #[arg(short, long)]
        start: Option<String>,
        /// Inclusive upper date bound, YYYY-MM-DD
        #[arg(short, long)]
        end: Option<String>,
    },
    /// Append a record.
    Append {
        event_type: EventType,
        preview: String,
        /// JSON object of metadata
        #[arg(short, long)]
        meta: Option<String>,
    },
    /// Delete a record by id. Unknown ids are ignored.
    Delete { id: u64 },
    /// Lock the daemon's session.
    Lock,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log = sdk::new(&cli.path).await?;

    let unlocked = match (&cli.command, &cli.password) {
        (Commands::Lock, _) => None,
        (_, Some(password)) => Some(log.unlock(password).await?),
        (Commands::Unlock, None) => anyhow::bail!("--password (or AGENTLOG_PASSWORD) is required to unlock"),
        (_, None) => None,
    };

    let records = match cli.command {
        Commands::Unlock => unlocked.unwrap_or_default(),
        Commands::List { event_type, start, end } => {
            let filter = QueryFilter::parse(event_type.as_deref(), start.as_deref(), end.as_deref())?;
            log.list(&filter).await?
        }
        Commands::Append { event_type, preview, meta } => {
            let meta: Meta = match meta {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Meta::new(),
            };
            log.append(event_type, meta, &preview).await?
        }
        Commands::Delete { id } => log.delete(id).await?,
        Commands::Lock => {
            log.lock().await?;
            println!("OK");
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
