//! Command-line interface for othello_server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::sync::SyncMode;

/// Othello - two-player game server with live state sync
#[derive(Parser, Debug)]
#[command(name = "othello_server")]
#[command(about = "Networked two-player Othello server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP and WebSocket server
    Serve {
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// SQLite path, or ":memory:"
        #[arg(long)]
        database_url: Option<String>,

        /// Propagation strategy
        #[arg(long, value_enum)]
        sync_mode: Option<SyncMode>,
    },

    /// Print a board from the server, or the starting board if no game is given
    Show {
        /// Game id
        #[arg(long)]
        game: Option<i32>,

        /// Server URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server_url: String,

        /// Acting user id
        #[arg(long)]
        user: Option<i32>,
    },

    /// Drive a running server
    Play {
        /// Server URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server_url: String,

        /// Acting user id
        #[arg(long)]
        user: Option<i32>,

        /// Action to perform
        #[command(subcommand)]
        action: PlayAction,
    },
}

/// Client actions against a running server
#[derive(Subcommand, Debug)]
pub enum PlayAction {
    /// Register a user
    Signup {
        /// Display name
        name: String,
    },
    /// Open a new game as host
    Create,
    /// Join a game as guest
    Join {
        /// Game id
        game: i32,
    },
    /// Place a piece
    Move {
        /// Game id
        game: i32,
        /// Row, 0 to 7
        row: i32,
        /// Column, 0 to 7
        col: i32,
        /// Expected version
        #[arg(long)]
        version: Option<u64>,
    },
    /// Restart a finished game with colors swapped
    Rematch {
        /// Game id
        game: i32,
    },
}
