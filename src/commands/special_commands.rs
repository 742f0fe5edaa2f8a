//! Special commands parser for the interactive chat
//!
//! Lines starting with `/` manage sessions and settings instead of being sent
//! to the model. Command names are case-insensitive; arguments keep their
//! case (export paths, model names).

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new session and switch to it
    NewSession,

    /// List sessions
    ListSessions,

    /// Switch to the session at an index
    SelectSession(usize),

    /// Remove the session at an index
    RemoveSession(usize),

    /// Show chat settings and current session statistics
    ShowConfig,

    /// Change one chat setting
    Set { field: String, value: String },

    /// Restore default chat settings
    ResetConfig,

    /// Write the current session as Markdown
    Export(String),

    /// Delete every session and reset settings
    ClearAll,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send the line to the model
    None,
}

fn parse_index(command: &str, usage: &str, arg: &str) -> Result<usize, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        });
    }
    arg.parse::<usize>()
        .map_err(|_| CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        })
}

/// Parse a user input line into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognised `/` command,
/// `CommandError::MissingArgument` or `CommandError::UnsupportedArgument` for
/// bad arguments
///
/// # Examples
///
/// ```
/// use chatline::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::NewSession);
/// assert_eq!(parse_special_command("/select 2").unwrap(), SpecialCommand::SelectSession(2));
/// assert_eq!(parse_special_command("hello there").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/frobnicate").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') {
        return Ok(match lower.as_str() {
            "exit" | "quit" => SpecialCommand::Exit,
            _ => SpecialCommand::None,
        });
    }

    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match name.as_str() {
        "/new" => Ok(SpecialCommand::NewSession),
        "/sessions" | "/list" => Ok(SpecialCommand::ListSessions),
        "/select" => parse_index("/select", "/select <index>", rest).map(SpecialCommand::SelectSession),
        "/remove" => parse_index("/remove", "/remove <index>", rest).map(SpecialCommand::RemoveSession),
        "/config" => Ok(SpecialCommand::ShowConfig),
        "/set" => {
            let usage = "/set <field> <value>";
            match rest.split_once(char::is_whitespace) {
                Some((field, value)) if !value.trim().is_empty() => Ok(SpecialCommand::Set {
                    field: field.to_lowercase().replace('-', "_"),
                    value: value.trim().to_string(),
                }),
                _ => Err(CommandError::MissingArgument {
                    command: "/set".to_string(),
                    usage: usage.to_string(),
                }),
            }
        }
        "/reset-config" => Ok(SpecialCommand::ResetConfig),
        "/export" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/export".to_string(),
                    usage: "/export <path>".to_string(),
                })
            } else {
                Ok(SpecialCommand::Export(rest.to_string()))
            }
        }
        "/clear" => Ok(SpecialCommand::ClearAll),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print help for the special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

SESSIONS:
  /new              - Start a new session
  /sessions         - List sessions (current one marked)
  /select <index>   - Switch to a session
  /remove <index>   - Remove a session
  /export <path>    - Write the current session as Markdown

SETTINGS:
  /config           - Show chat settings and session statistics
  /set <field> <value>
                    - Change a setting. Fields: history, threshold,
                      send_bot_messages, submit_key, model, temperature,
                      max_tokens, presence_penalty
  /reset-config     - Restore default settings

OTHER:
  /clear            - Delete all sessions and reset settings
  /help             - Show this help message
  /exit, exit, quit - Leave the chat

While a reply is streaming, press Ctrl-C to cancel it.
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
        assert_eq!(parse_special_command("  what is /new?").unwrap(), SpecialCommand::None);
    }

    #[test]
    fn test_exit_aliases() {
        assert_eq!(parse_special_command("exit").unwrap(), SpecialCommand::Exit);
        assert_eq!(parse_special_command("QUIT").unwrap(), SpecialCommand::Exit);
        assert_eq!(parse_special_command("/exit").unwrap(), SpecialCommand::Exit);
    }

    #[test]
    fn test_session_commands() {
        assert_eq!(parse_special_command("/NEW").unwrap(), SpecialCommand::NewSession);
        assert_eq!(parse_special_command("/sessions").unwrap(), SpecialCommand::ListSessions);
        assert_eq!(parse_special_command("/select 3").unwrap(), SpecialCommand::SelectSession(3));
        assert_eq!(parse_special_command("/remove 0").unwrap(), SpecialCommand::RemoveSession(0));
    }

    #[test]
    fn test_index_arguments_are_validated() {
        assert!(matches!(
            parse_special_command("/select"),
            Err(CommandError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse_special_command("/remove two"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
        assert!(matches!(
            parse_special_command("/select -1"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
    }

    #[test]
    fn test_set_command() {
        assert_eq!(
            parse_special_command("/set max-tokens 1000").unwrap(),
            SpecialCommand::Set {
                field: "max_tokens".to_string(),
                value: "1000".to_string()
            }
        );
        assert!(parse_special_command("/set").is_err());
        assert!(parse_special_command("/set model").is_err());
    }

    #[test]
    fn test_export_keeps_path_case() {
        assert_eq!(
            parse_special_command("/export ~/Notes/Chat.md").unwrap(),
            SpecialCommand::Export("~/Notes/Chat.md".to_string())
        );
        assert!(parse_special_command("/export").is_err());
    }

    #[test]
    fn test_misc_commands() {
        assert_eq!(parse_special_command("/config").unwrap(), SpecialCommand::ShowConfig);
        assert_eq!(parse_special_command("/reset-config").unwrap(), SpecialCommand::ResetConfig);
        assert_eq!(parse_special_command("/clear").unwrap(), SpecialCommand::ClearAll);
        assert_eq!(parse_special_command("/?").unwrap(), SpecialCommand::Help);
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_special_command("/mode write").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("/mode write".to_string()));
        assert!(err.to_string().contains("/help"));
    }
}
