//! Scripted player for exercising a running server.
//!
//! Joins under the given name, votes a random tag (or the correct one with
//! `--cheat`) in every round and logs what the server broadcasts.

use clap::Parser;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use rand::seq::SliceRandom;
use shared::{ClientMessage, ServerMessage, Tag};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:3001")]
    server: String,

    /// Display name
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Milliseconds to wait before voting
    #[arg(short, long, default_value = "500")]
    think_ms: u64,

    /// Always vote for the correct tag
    #[arg(long)]
    cheat: bool,

    /// Leave after this many game overs (0 = stay forever)
    #[arg(long, default_value = "1")]
    games: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let (ws, _) = connect_async(args.server.as_str()).await?;
    info!("Connected to {}", args.server);
    let (mut tx, mut rx) = ws.split();

    let join = serde_json::to_string(&ClientMessage::Join {
        name: args.name.clone(),
    })?;
    tx.send(Message::text(join)).await?;

    let mut games_finished = 0;

    while let Some(frame) = rx.next().await {
        let frame = frame?;
        let Ok(text) = frame.to_text() else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unreadable server message: {}", e);
                continue;
            }
        };

        match message {
            ServerMessage::Joined { id, players, .. } => {
                println!("Joined as {} ({} players)", id, players.len());
            }
            ServerMessage::PlayerJoined { players } | ServerMessage::PlayerLeft { players } => {
                let names: Vec<&str> = players.iter().map(|p| p.name.as_str()).collect();
                println!("Players: {}", names.join(", "));
            }
            ServerMessage::ModeChange { message, .. } => println!("*** {}", message),
            ServerMessage::GameStart {
                article,
                round,
                game_mode,
                library_health,
                ..
            } => {
                println!(
                    "[{} round {}] {} ({}) health {}",
                    game_mode, round, article.title, article.url, library_health
                );

                let vote = if args.cheat {
                    article.correct_tag
                } else {
                    *Tag::ALL
                        .choose(&mut rand::thread_rng())
                        .unwrap_or(&Tag::Truth)
                };
                tokio::time::sleep(Duration::from_millis(args.think_ms)).await;

                let answer = serde_json::to_string(&ClientMessage::Answer { answer: vote })?;
                tx.send(Message::text(answer)).await?;
                println!("Voted {}", vote);
            }
            ServerMessage::TimeUpdate { time_left } => {
                if time_left % 10 == 0 {
                    println!("{}s left", time_left);
                }
            }
            ServerMessage::ShowResults {
                results,
                correct_tag,
                library_health,
                ..
            } => {
                for entry in &results {
                    println!("  {:<24} {}", entry.tag.as_str(), entry.count);
                }
                println!("Correct: {}, library health {}", correct_tag, library_health);
            }
            ServerMessage::GameOver { .. } => {
                println!("Game over, the library has fallen");
                games_finished += 1;
                if args.games > 0 && games_finished >= args.games {
                    break;
                }
            }
        }
    }

    let _ = tx.close().await;
    Ok(())
}
