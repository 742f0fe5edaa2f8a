/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`: Interactive chat with streamed replies
- `sessions`: One-shot session management
- `settings`: One-shot chat settings management
*/

// Special commands parser for the interactive chat
pub mod special_commands;

// Session table, transcript and export helpers
pub mod sessions;

// Chat settings display and updates
pub mod settings;

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Loads the persisted state, wires the store and the completion transport
    //! into a [`ChatOrchestrator`] and runs a readline loop. Replies are
    //! rendered by following store snapshots while they stream; Ctrl-C during
    //! a reply cancels it.

    use std::io::Write;

    use colored::Colorize;
    use futures::StreamExt;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use tokio_stream::wrappers::WatchStream;

    use super::sessions::{export_session, print_sessions_table, print_transcript};
    use super::settings::{apply_setting, print_config};
    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::config::Config;
    use crate::error::Result;
    use crate::orchestrator::{ChatOrchestrator, ExchangeHandle, ExchangeOutcome};
    use crate::providers::create_transport;
    use crate::storage::StateStorage;
    use crate::store::{ChatStore, MessageId, SessionId};

    /// What the loop does after a special command
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LoopControl {
        /// Keep reading input
        Continue,
        /// Leave the chat
        Exit,
    }

    /// Start the interactive chat
    ///
    /// # Arguments
    ///
    /// * `config` - Application configuration (consumed)
    ///
    /// # Errors
    ///
    /// Returns error if the state database, transport or line editor cannot
    /// be initialized
    pub async fn run_chat(config: Config) -> Result<()> {
        tracing::info!("Starting interactive chat");

        let storage = StateStorage::from_config(&config.storage)?;
        tracing::debug!("Using state database at {}", storage.path().display());
        let store = ChatStore::load(&storage)?;
        let transport = create_transport(&config.provider)?;
        let orchestrator = ChatOrchestrator::new(store.clone(), transport);

        let mut rl = DefaultEditor::new()?;

        print_welcome_banner(&store);

        loop {
            let prompt = format!("[{}] > ", store.current_session().topic)
                .cyan()
                .to_string();
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    add_to_history(&mut rl, trimmed)?;

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}\n", e.to_string().red());
                            continue;
                        }
                    };

                    let control = match command {
                        SpecialCommand::None => {
                            match orchestrator.submit(trimmed) {
                                Ok(handle) => {
                                    render_reply(&orchestrator, handle).await;
                                }
                                Err(e) => eprintln!("{}\n", format!("Error: {}", e).red()),
                            }
                            LoopControl::Continue
                        }
                        SpecialCommand::ClearAll => {
                            let answer = rl
                                .readline("Delete all sessions and reset settings? [y/N] ")
                                .unwrap_or_default();
                            if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                                orchestrator.clear_all_data();
                                println!("{}\n", "All data cleared.".green());
                            } else {
                                println!("Cancelled.\n");
                            }
                            LoopControl::Continue
                        }
                        other => match handle_special_command(&orchestrator, other) {
                            Ok(control) => control,
                            Err(e) => {
                                eprintln!("{}\n", format!("Error: {}", e).red());
                                LoopControl::Continue
                            }
                        },
                    };

                    save_state(&store, &storage);
                    if control == LoopControl::Exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        orchestrator.shutdown();
        save_state(&store, &storage);
        println!("Goodbye!");
        Ok(())
    }

    /// Add a submitted line to the editor history; repeated lines are kept once
    fn add_to_history(rl: &mut DefaultEditor, line: &str) -> Result<()> {
        rl.add_history_entry(line)?;
        Ok(())
    }

    fn save_state(store: &ChatStore, storage: &StateStorage) {
        if let Err(e) = store.save(storage) {
            tracing::warn!("Failed to save state: {}", e);
            eprintln!("{}", format!("Warning: could not save state: {}", e).yellow());
        }
    }

    /// Execute a special command other than submitting input or clearing data
    ///
    /// # Errors
    ///
    /// Returns error if a setting is invalid or an export cannot be written
    pub fn handle_special_command(
        orchestrator: &ChatOrchestrator,
        command: SpecialCommand,
    ) -> Result<LoopControl> {
        let store = orchestrator.store();

        match command {
            SpecialCommand::NewSession => {
                store.new_session();
                println!("{}\n", "Started a new session.".green());
            }
            SpecialCommand::ListSessions => print_sessions_table(store),
            SpecialCommand::SelectSession(index) => {
                store.select_session(index);
                println!(
                    "{}\n",
                    format!("Switched to session {}", store.current_session_index()).green()
                );
                print_transcript(&store.current_session());
            }
            SpecialCommand::RemoveSession(index) => {
                let removed = orchestrator.remove_session(index);
                println!("{}\n", format!("Removed session {}", removed).green());
            }
            SpecialCommand::ShowConfig => {
                print_config(&store.config(), Some(&store.current_session()));
            }
            SpecialCommand::Set { field, value } => {
                if apply_setting(store, &field, &value)? {
                    println!("{}\n", format!("{} set to {}", field, value).green());
                } else {
                    println!(
                        "{}\n",
                        format!(
                            "{} is out of range for {}; keeping the previous value",
                            value, field
                        )
                        .yellow()
                    );
                }
            }
            SpecialCommand::ResetConfig => {
                store.reset_config();
                println!("{}\n", "Chat settings restored to defaults.".green());
            }
            SpecialCommand::Export(path) => {
                export_session(&store.current_session(), &path)?;
                println!("{}\n", format!("Exported to {}", path).green());
            }
            SpecialCommand::ClearAll => orchestrator.clear_all_data(),
            SpecialCommand::Help => print_help(),
            SpecialCommand::Exit => return Ok(LoopControl::Exit),
            SpecialCommand::None => {}
        }

        Ok(LoopControl::Continue)
    }

    /// Print the reply as it streams; Ctrl-C cancels it
    async fn render_reply(orchestrator: &ChatOrchestrator, handle: ExchangeHandle) -> ExchangeOutcome {
        let session_id = handle.session_id;
        let message_id = handle.message_id;
        let store = orchestrator.store();

        let mut snapshots = WatchStream::new(store.subscribe());
        let mut printed = 0usize;
        let wait = handle.wait();
        tokio::pin!(wait);

        let outcome = loop {
            tokio::select! {
                outcome = &mut wait => break outcome,
                _ = tokio::signal::ctrl_c() => {
                    orchestrator.cancel(session_id, message_id);
                }
                Some(state) = snapshots.next() => {
                    if let Some(content) = reply_content(&state.sessions, session_id, message_id) {
                        print_new_text(&content, &mut printed, false);
                    }
                }
            }
        };

        let final_content = store
            .session(session_id)
            .and_then(|s| s.message(message_id).map(|m| m.content.clone()));
        if let Some(content) = final_content {
            print_new_text(&content, &mut printed, outcome == ExchangeOutcome::Failed);
        }

        match outcome {
            ExchangeOutcome::Cancelled => println!("\n{}\n", "[cancelled]".yellow()),
            _ => println!("\n"),
        }
        outcome
    }

    fn reply_content(
        sessions: &[crate::store::Session],
        session_id: SessionId,
        message_id: MessageId,
    ) -> Option<String> {
        sessions
            .iter()
            .find(|s| s.id == session_id)
            .and_then(|s| s.message(message_id))
            .map(|m| m.content.clone())
    }

    fn print_new_text(content: &str, printed: &mut usize, as_error: bool) {
        if content.len() <= *printed || !content.is_char_boundary(*printed) {
            return;
        }
        let fresh = &content[*printed..];
        if as_error {
            print!("{}", fresh.red());
        } else {
            print!("{}", fresh);
        }
        let _ = std::io::stdout().flush();
        *printed = content.len();
    }

    /// Display welcome banner at the start of the interactive chat
    fn print_welcome_banner(store: &ChatStore) {
        let session = store.current_session();
        let config = store.config();

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║              chatline - streaming chat client                ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!(
            "Session: {} ({} messages)",
            session.topic.cyan(),
            session.messages.len()
        );
        println!("Model:   {}\n", config.model_config.model.cyan());
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::providers::fake::ScriptedTransport;
        use std::sync::Arc;

        fn orchestrator() -> ChatOrchestrator {
            ChatOrchestrator::new(ChatStore::new(), Arc::new(ScriptedTransport::new()))
        }

        #[test]
        fn test_add_to_history_records_lines() {
            use rustyline::history::History;

            let mut rl = DefaultEditor::new().unwrap();
            add_to_history(&mut rl, "first question").unwrap();
            add_to_history(&mut rl, "first question").unwrap();
            add_to_history(&mut rl, "/sessions").unwrap();
            assert_eq!(rl.history().len(), 2);
        }

        #[test]
        fn test_print_new_text_tracks_offset() {
            let mut printed = 0;
            print_new_text("he", &mut printed, false);
            assert_eq!(printed, 2);
            print_new_text("hello", &mut printed, false);
            assert_eq!(printed, 5);
            print_new_text("hello", &mut printed, false);
            assert_eq!(printed, 5);
        }

        #[test]
        fn test_session_commands_update_store() {
            let orchestrator = orchestrator();
            let store = orchestrator.store().clone();

            handle_special_command(&orchestrator, SpecialCommand::NewSession).unwrap();
            handle_special_command(&orchestrator, SpecialCommand::NewSession).unwrap();
            assert_eq!(store.sessions().len(), 3);

            handle_special_command(&orchestrator, SpecialCommand::SelectSession(2)).unwrap();
            assert_eq!(store.current_session_index(), 2);

            handle_special_command(&orchestrator, SpecialCommand::RemoveSession(2)).unwrap();
            assert_eq!(store.sessions().len(), 2);
            assert_eq!(store.current_session_index(), 1);
        }

        #[test]
        fn test_set_and_reset_commands() {
            let orchestrator = orchestrator();
            let store = orchestrator.store().clone();

            handle_special_command(
                &orchestrator,
                SpecialCommand::Set {
                    field: "presence_penalty".to_string(),
                    value: "1.5".to_string(),
                },
            )
            .unwrap();
            assert_eq!(store.config().model_config.presence_penalty, 1.5);

            assert!(handle_special_command(
                &orchestrator,
                SpecialCommand::Set {
                    field: "presence_penalty".to_string(),
                    value: "high".to_string(),
                },
            )
            .is_err());

            handle_special_command(&orchestrator, SpecialCommand::ResetConfig).unwrap();
            assert_eq!(store.config().model_config.presence_penalty, 0.0);
        }

        #[test]
        fn test_export_command_writes_file() {
            let orchestrator = orchestrator();
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().join("session.md");

            handle_special_command(
                &orchestrator,
                SpecialCommand::Export(path.to_string_lossy().to_string()),
            )
            .unwrap();
            assert!(std::fs::read_to_string(&path).unwrap().contains("How can I help you?"));
        }

        #[test]
        fn test_exit_command() {
            let orchestrator = orchestrator();
            assert_eq!(
                handle_special_command(&orchestrator, SpecialCommand::Exit).unwrap(),
                LoopControl::Exit
            );
            assert_eq!(
                handle_special_command(&orchestrator, SpecialCommand::Help).unwrap(),
                LoopControl::Continue
            );
        }
    }
}
