//! chatline - streaming chat client library
//!
//! This library keeps a set of chat sessions, streams assistant replies from an
//! OpenAI-compatible completion endpoint into them, and compacts long
//! histories into a running summary.
//!
//! # Architecture
//!
//! - `store`: Sessions, messages and chat settings behind a single shared state
//! - `orchestrator`: Submits user input, drives streamed replies and background
//!   topic and summary requests
//! - `registry`: Cancellation tokens for in-flight requests
//! - `decoder`: Server-sent event decoding of streamed completions
//! - `providers`: Completion transport abstraction and implementations
//! - `history` / `compaction`: Context window selection and summarization
//! - `storage`: Persistence of the store state
//! - `config`: Application configuration
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use chatline::{ChatOrchestrator, ChatStore, Config};
//! use chatline::providers::create_transport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let orchestrator = ChatOrchestrator::new(ChatStore::new(), create_transport(&config.provider)?);
//!     let handle = orchestrator.submit("Hello!")?;
//!     handle.wait().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod compaction;
pub mod config;
pub mod decoder;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChatlineError, Result};
pub use orchestrator::{ChatOrchestrator, ExchangeHandle, ExchangeOutcome};
pub use registry::{RequestRegistry, Slot};
pub use store::ChatStore;
