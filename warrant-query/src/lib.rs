//! The query pipeline: classify chat text, walk the listing, render replies.
//!
//! - [`command`]: free text to a closed [`command::Command`]
//! - [`format`]: records to length-bounded reply chunks
//! - [`orchestrator`]: the parse → fetch → extract → format state machine

pub mod command;
pub mod format;
pub mod orchestrator;

pub use command::{Command, CommandInterpreter};
pub use format::{FormattedResult, QueryReport, ResultFormatter};
pub use orchestrator::{QueryOrchestrator, QueryPhase};
