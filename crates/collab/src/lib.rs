//! External collaborators consumed by the optimizer.
//!
//! The dialogue simulator, the scorer and the text generator live on the
//! other side of these traits. Every call to them goes through a shared
//! [`CallGate`], which caps concurrency and applies per-call timeouts and
//! retries.

#![warn(missing_docs)]

pub mod traits;
pub mod gate;
pub mod scripted;

pub use traits::{DialogueSimulator, Scorer, TextGenerator, Collaborators};
pub use gate::{CallGate, CallPolicy, CallError};
pub use scripted::{ScriptedSimulator, ScriptedScorer, ScriptedGenerator};
