//! Reflection layer - natural-language feedback on evaluation outcomes.

#![warn(missing_docs, unused_crate_dependencies)]

mod engine;
mod request;

pub use engine::{PanelReview, ReflectionConfig, ReflectionEngine};
pub use request::{reflection_request, synthesis_request};
