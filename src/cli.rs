//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Declarative Matrix resource synchronizer.
#[derive(Debug, Parser)]
#[command(name = "mxsync", version, about)]
pub struct Cli {
    /// Connection configuration (TOML).
    #[arg(long, short = 'c', global = true, default_value = "mxsync.toml")]
    pub config: PathBuf,

    /// Load and report current state without mutating anything.
    #[arg(long, global = true)]
    pub check: bool,

    /// Pretty-print the JSON report.
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile a room.
    Room {
        /// Room manifest (TOML).
        #[arg(long, short = 'm')]
        manifest: PathBuf,
    },
    /// Reconcile a group (legacy community).
    Group {
        /// Group manifest (TOML).
        #[arg(long, short = 'm')]
        manifest: PathBuf,
    },
    /// Reconcile a space.
    Space {
        /// Space manifest (TOML).
        #[arg(long, short = 'm')]
        manifest: PathBuf,
    },
    /// Reconcile a user account.
    User {
        /// Account manifest (TOML).
        #[arg(long, short = 'm')]
        manifest: PathBuf,
    },
    /// Send a message to a room.
    Send {
        /// Room alias or id.
        #[arg(long)]
        room: String,
        /// Message body.
        #[arg(long)]
        message: String,
        /// Send as m.notice instead of m.text.
        #[arg(long)]
        notice: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_room_subcommand() {
        let cli = Cli::try_parse_from([
            "mxsync", "--config", "conn.toml", "--check", "room", "-m", "room.toml",
        ])
        .unwrap();
        assert!(cli.check);
        assert!(matches!(cli.command, Command::Room { .. }));
    }

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "mxsync", "send", "--room", "ops", "--message", "hello", "--notice",
        ])
        .unwrap();
        match cli.command {
            Command::Send { room, notice, .. } => {
                assert_eq!(room, "ops");
                assert!(notice);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
