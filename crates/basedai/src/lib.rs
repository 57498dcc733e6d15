//! # basedai
//!
//! The tool-calling orchestration loop.
//!
//! A [`Core`] sends the conversation and the registry's tool schemas to a
//! language model. If the model asks for tools, Core runs them, appends one
//! result per call, and asks again, until the model answers in plain text.
//!
//! ## Quick Start
//!
//! ```no_run
//! use basedai::{Config, Core, OpenAIClient, ToolSettings, standard_registry};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = OpenAIClient::new(
//!     Config::new("ollama", "llama3.1").with_base_url("http://localhost:11434/v1"),
//! )?;
//! let registry = standard_registry(&ToolSettings::default(), None)?;
//!
//! let core = Core::new(client, registry).with_system_prompt("You are a helpful assistant.");
//! let answer = core.run("What time is it in Tokyo?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Policy
//!
//! - Unknown tools, rejected arguments, tool errors and tool timeouts become
//!   error results in the conversation; the run carries on.
//! - An unreachable model, an unrecognised reply or too many rounds end the
//!   run with a [`CoreError`].

pub mod core;
pub mod error;
pub mod events;

pub use basedai_client::*;
pub use basedai_common::*;
pub use basedai_tools::*;

pub use core::{Core, Phase};
pub use error::CoreError;
pub use events::{CoreEvent, EventCallback};
