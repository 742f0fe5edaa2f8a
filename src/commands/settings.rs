//! Chat settings display and one-shot settings commands

use colored::Colorize;
use prettytable::{format, Table};

use crate::cli::ConfigCommand;
use crate::config::Config;
use crate::error::Result;
use crate::storage::StateStorage;
use crate::store::{ChatConfig, ChatStore, Session, ALL_MODELS, HISTORY_ALL};

/// Print the chat settings and the current session's statistics
pub fn print_config(config: &ChatConfig, session: Option<&Session>) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    let history = if config.history_message_count == HISTORY_ALL {
        "all".to_string()
    } else {
        config.history_message_count.to_string()
    };
    let models: Vec<String> = ALL_MODELS
        .iter()
        .map(|m| {
            if m.available {
                m.name.to_string()
            } else {
                format!("{} (unavailable)", m.name)
            }
        })
        .collect();

    table.add_row(prettytable::row!["Setting".bold(), "Value".bold()]);
    table.add_row(prettytable::row!["history", history]);
    table.add_row(prettytable::row![
        "threshold",
        config.compress_message_length_threshold
    ]);
    table.add_row(prettytable::row!["send_bot_messages", config.send_bot_messages]);
    table.add_row(prettytable::row!["submit_key", config.submit_key]);
    table.add_row(prettytable::row!["model", config.model_config.model.cyan()]);
    table.add_row(prettytable::row![
        "temperature",
        config.model_config.temperature
    ]);
    table.add_row(prettytable::row!["max_tokens", config.model_config.max_tokens]);
    table.add_row(prettytable::row![
        "presence_penalty",
        config.model_config.presence_penalty
    ]);

    println!("\nChat settings:");
    table.printstd();
    println!("Known models: {}", models.join(", "));

    if let Some(session) = session {
        println!(
            "\nSession \"{}\": {} messages, {} chars, {} words, ~{} tokens",
            session.topic,
            session.messages.len(),
            session.stat.char_count,
            session.stat.word_count,
            session.stat.token_count
        );
        if !session.memory_summary.is_empty() {
            println!("Memory: {}", session.memory_summary.dimmed());
        }
    }
    println!();
}

/// Apply `/set`-style input to the store
///
/// # Returns
///
/// Returns true if every requested change was accepted; false if the value
/// was out of range and the previous setting was kept
///
/// # Errors
///
/// Returns error for an unknown field or an unparsable value
pub fn apply_setting(store: &ChatStore, field: &str, value: &str) -> Result<bool> {
    let mut candidate = store.config();
    candidate.set_field(field, value)?;
    let requested = candidate.clone();
    let accepted = store.update_config(move |config| *config = candidate);
    Ok(accepted == requested)
}

/// Handle settings commands
///
/// # Errors
///
/// Returns error if the state cannot be loaded or saved, or the setting is invalid
pub fn handle_config(config: &Config, command: ConfigCommand) -> Result<()> {
    let storage = StateStorage::from_config(&config.storage)?;
    let store = ChatStore::load(&storage)?;

    match command {
        ConfigCommand::Show => {
            print_config(&store.config(), Some(&store.current_session()));
            return Ok(());
        }
        ConfigCommand::Reset => {
            store.reset_config();
            println!("{}", "Chat settings restored to defaults.".green());
        }
        ConfigCommand::Set { field, value } => {
            if apply_setting(&store, &field, &value)? {
                println!("{}", format!("{} set to {}", field, value).green());
            } else {
                println!(
                    "{}",
                    format!("{} is out of range for {}; keeping the previous value", value, field)
                        .yellow()
                );
            }
        }
    }

    store.save(&storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn config_for(dir: &tempfile::TempDir) -> Config {
        Config {
            storage: StorageConfig {
                path: Some(dir.path().join("state.db").to_string_lossy().to_string()),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_setting_accepts_valid_value() {
        let store = ChatStore::new();
        assert!(apply_setting(&store, "max_tokens", "1500").unwrap());
        assert_eq!(store.config().model_config.max_tokens, 1500);
    }

    #[test]
    fn test_apply_setting_keeps_previous_on_out_of_range() {
        let store = ChatStore::new();
        assert!(!apply_setting(&store, "temperature", "1.5").unwrap());
        assert_eq!(store.config().model_config.temperature, 1.0);
    }

    #[test]
    fn test_apply_setting_rejects_unknown_field() {
        let store = ChatStore::new();
        assert!(apply_setting(&store, "volume", "11").is_err());
    }

    #[test]
    fn test_set_and_reset_persist() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_for(&dir);

        handle_config(
            &config,
            ConfigCommand::Set {
                field: "history".to_string(),
                value: "12".to_string(),
            },
        )
        .unwrap();

        let storage = StateStorage::from_config(&config.storage).unwrap();
        let saved = storage.load_state().unwrap().unwrap();
        assert_eq!(saved.config.history_message_count, 12);
        drop(storage);

        handle_config(&config, ConfigCommand::Reset).unwrap();
        let storage = StateStorage::from_config(&config.storage).unwrap();
        let saved = storage.load_state().unwrap().unwrap();
        assert_eq!(saved.config, ChatConfig::default());
    }
}
