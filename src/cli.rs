//! Command-line interface definition for chatline
//!
//! This module defines the CLI structure using clap's derive API,
//! providing the interactive chat and one-shot session and settings commands.

use clap::{Parser, Subcommand};

/// chatline - streaming chat client for OpenAI-compatible endpoints
///
/// Keeps multiple conversations, streams replies as they arrive and compacts
/// long histories into a running summary.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Path to the state database (overrides config and CHATLINE_STATE_DB)
    #[arg(long)]
    pub state: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for chatline
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive chat in the current session
    Chat,

    /// Manage sessions
    Sessions {
        /// Session subcommand
        #[command(subcommand)]
        command: SessionsCommand,
    },

    /// Show or change chat settings
    Config {
        /// Settings subcommand
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SessionsCommand {
    /// List sessions
    List,

    /// Create a new session and make it current
    New,

    /// Make the session at INDEX current
    Select {
        /// Position in the session list
        index: usize,
    },

    /// Remove the session at INDEX
    Remove {
        /// Position in the session list
        index: usize,
    },

    /// Write a session as Markdown
    Export {
        /// Destination file
        path: String,

        /// Position in the session list (defaults to the current session)
        #[arg(short, long)]
        index: Option<usize>,
    },
}

/// Settings subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Show chat settings
    Show,

    /// Restore default chat settings
    Reset,

    /// Change one chat setting
    Set {
        /// Setting name (history, threshold, send_bot_messages, submit_key,
        /// model, temperature, max_tokens, presence_penalty)
        field: String,

        /// New value
        value: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            state: None,
            verbose: false,
            command: Commands::Chat,
        }
    }
}
