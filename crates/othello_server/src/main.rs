//! Othello server - unified CLI.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use othello_rules::{BoardState, ParticipantId};
use othello_server::cli::{Cli, Command, PlayAction};
use othello_server::{GameId, RestClient, ServerConfig, SessionRegistry, SyncMessage, http};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            host,
            database_url,
            sync_mode,
        } => {
            let base = match config {
                Some(path) => ServerConfig::from_file(path)?,
                None => ServerConfig::default(),
            };
            let config = base
                .with_env()?
                .with_overrides(host, port, database_url, sync_mode);
            run_server(config).await
        }
        Command::Show {
            game,
            server_url,
            user,
        } => show(game, server_url, user).await,
        Command::Play {
            server_url,
            user,
            action,
        } => play(RestClient::new(server_url, user.map(ParticipantId::new)), action).await,
    }
}

/// Runs the HTTP server until Ctrl-C.
#[instrument(skip_all, fields(port = config.port(), mode = %config.sync_mode()))]
async fn run_server(config: ServerConfig) -> Result<()> {
    info!("Starting Othello server");
    let store = config.open_store().context("Failed to open store")?;
    let registry = Arc::new(SessionRegistry::new(store, config.sync_channel()));
    let listener = tokio::net::TcpListener::bind((config.host().as_str(), *config.port()))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host(), config.port()))?;
    http::serve(listener, registry).await?;
    Ok(())
}

async fn show(game: Option<i32>, server_url: String, user: Option<i32>) -> Result<()> {
    let Some(game) = game else {
        println!("{}", BoardState::initial(ParticipantId::new(user.unwrap_or(0))));
        return Ok(());
    };
    let client = RestClient::new(server_url, user.map(ParticipantId::new));
    let view = client.game(GameId::new(game)).await?;
    print_state(&view.state)?;
    if let Some(winner) = view.winner {
        println!("winner: {}", winner);
    }
    Ok(())
}

async fn play(client: RestClient, action: PlayAction) -> Result<()> {
    match action {
        PlayAction::Signup { name } => {
            let user = client.create_user(&name).await?;
            println!("user {} ({})", user.id, user.name);
        }
        PlayAction::Create => {
            let state = client.create_game().await?;
            println!("game {}", state.session_id);
            print_state(&state)?;
        }
        PlayAction::Join { game } => {
            let joined = client.join(GameId::new(game)).await?;
            println!("{:?}", joined.outcome);
            print_state(&joined.state)?;
        }
        PlayAction::Move {
            game,
            row,
            col,
            version,
        } => print_state(&client.play(GameId::new(game), row, col, version).await?)?,
        PlayAction::Rematch { game } => print_state(&client.rematch(GameId::new(game)).await?)?,
    }
    Ok(())
}

fn print_state(state: &SyncMessage) -> Result<()> {
    let board = state.board_state().context("Server sent an undecodable board")?;
    println!("game {} version {}", state.session_id, state.version);
    println!("{}", board);
    Ok(())
}
