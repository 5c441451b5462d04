use std::sync::Arc;
use agent_logstore::engine::{EncryptedStore, LocalLog, DEFAULT_FILE_NAME};
use agent_logstore::server::Router;
use agent_logstore::Unlocker;
use clap::Parser;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serves the encrypted agent log over TCP", long_about = None)]
struct Args {
    /// Encrypted log file.
    #[arg(short = 'f', long, env = "AGENTLOG_PATH", default_value = DEFAULT_FILE_NAME)]
    path: String,

    #[arg(short, long, env = "AGENTLOG_PORT", default_value = "7002")]
    port: String,

    /// Address to bind. The protocol carries the password in clear text,
    /// so keep this on loopback.
    #[arg(short, long, env = "AGENTLOG_BIND", default_value = "127.0.0.1")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let log = Arc::new(LocalLog::new(EncryptedStore::new(&args.path)));
    let router = Router::new(log.clone());

    println!("Starting agent log daemon...");
    println!("Log file: {} ({})", args.path, if log.session().store().exists() { "existing" } else { "created on first unlock" });
    println!("Listening on {}:{} (TCP). The log stays locked until a client sends UNLOCK.", args.bind, args.port);

    tokio::select! {
        res = router.listen(&args.bind, &args.port) => {
            if let Err(e) = res {
                eprintln!("TCP Server failed: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            println!("\nShutdown signal received. Locking log...");
            log.lock().await?;
            println!("Locked. Exiting.");
        }
    }

    Ok(())
}
