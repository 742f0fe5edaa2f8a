//! Session listing and one-shot session commands

use std::path::Path;

use colored::Colorize;
use prettytable::{format, Table};

use crate::cli::SessionsCommand;
use crate::config::Config;
use crate::error::{ChatlineError, Result};
use crate::providers::Role;
use crate::storage::StateStorage;
use crate::store::{ChatStore, Session};

const TOPIC_WIDTH: usize = 40;

fn shorten(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Print the session list as a table, marking the current session
pub fn print_sessions_table(store: &ChatStore) {
    let sessions = store.sessions();
    let current = store.current_session_index();

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "".bold(),
        "Index".bold(),
        "Topic".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for (index, session) in sessions.iter().enumerate() {
        let marker = if index == current { "*" } else { "" };
        let updated = session
            .last_update
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();

        table.add_row(prettytable::row![
            marker.green(),
            index.to_string().cyan(),
            shorten(&session.topic, TOPIC_WIDTH),
            session.messages.len(),
            updated
        ]);
    }

    println!("\nSessions:");
    table.printstd();
    println!();
}

/// Print every message of a session
pub fn print_transcript(session: &Session) {
    println!("{}", format!("# {}", session.topic).bold());
    for message in &session.messages {
        let label = match message.role {
            Role::User => "you".green().bold(),
            Role::Assistant => "assistant".cyan().bold(),
            Role::System => "system".yellow().bold(),
        };
        if message.is_error {
            println!("{}: {}", label, message.content.red());
        } else {
            println!("{}: {}", label, message.content);
        }
    }
    println!();
}

/// Write a session as Markdown to `path`
///
/// # Errors
///
/// Returns error if the file cannot be written
pub fn export_session(session: &Session, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, session.export_markdown()).map_err(|e| {
        ChatlineError::Storage(format!("Failed to write {}: {}", path.display(), e))
    })?;
    tracing::info!("Exported session {} to {}", session.id, path.display());
    Ok(())
}

/// Handle session commands
///
/// # Errors
///
/// Returns error if the state cannot be loaded or saved, or an export fails
pub fn handle_sessions(config: &Config, command: SessionsCommand) -> Result<()> {
    let storage = StateStorage::from_config(&config.storage)?;
    let store = ChatStore::load(&storage)?;

    match command {
        SessionsCommand::List => {
            print_sessions_table(&store);
            return Ok(());
        }
        SessionsCommand::New => {
            store.new_session();
            println!("{}", "Created a new session.".green());
        }
        SessionsCommand::Select { index } => {
            store.select_session(index);
            let session = store.current_session();
            println!(
                "{}",
                format!(
                    "Current session is now {}: {}",
                    store.current_session_index(),
                    session.topic
                )
                .green()
            );
        }
        SessionsCommand::Remove { index } => {
            let removed = store.remove_session(index);
            println!("{}", format!("Removed session {}", removed).green());
        }
        SessionsCommand::Export { path, index } => {
            let session = match index {
                Some(index) => {
                    let sessions = store.sessions();
                    let index = index.min(sessions.len().saturating_sub(1));
                    sessions[index].clone()
                }
                None => store.current_session(),
            };
            export_session(&session, &path)?;
            println!("{}", format!("Exported \"{}\" to {}", session.topic, path).green());
            return Ok(());
        }
    }

    store.save(&storage)
}
