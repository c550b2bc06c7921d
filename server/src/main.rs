use clap::Parser;
use log::{error, info};
use server::articles::ArticleLibrary;
use server::config::{GameConfig, DEFAULT_PORT};
use server::network::{BoxError, Server, ServerEvent};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds players have to vote each round
    #[arg(long, default_value = "30")]
    round_seconds: u32,

    /// Seconds between the second player joining and the first round
    #[arg(long, default_value = "3")]
    lobby_delay: u64,

    /// Seconds results stay on screen before the next round
    #[arg(long, default_value = "5")]
    results_delay: u64,

    /// Number of training rounds before play mode
    #[arg(short, long, default_value = "3")]
    training_rounds: u32,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// JSON file with `training` and `play` article lists
    #[arg(short, long)]
    articles: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let library = match &args.articles {
        Some(path) => ArticleLibrary::load(path)?,
        None => ArticleLibrary::builtin(),
    };

    let config = GameConfig {
        round_seconds: args.round_seconds,
        lobby_delay: Duration::from_secs(args.lobby_delay),
        results_delay: Duration::from_secs(args.results_delay),
        training_rounds: args.training_rounds,
        max_clients: args.max_clients,
        ..GameConfig::default()
    };
    info!("Starting quiz server with {:?}", config);

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::bind(&address, config, library).await?;
    let handle = server.handle();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = handle.send(ServerEvent::Shutdown);
        }
    }

    Ok(())
}
