//! Reflection and synthesis notes.
//!
//! Notes are advisory free text. Nothing in the optimizer branches on their
//! content; they are only handed to the genetic operators as context.

use crate::id::{NoteId, PersonaId, PromptId};
use crate::{Generation, Time};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder text used when no analysis could be produced.
pub const NO_ANALYSIS: &str = "no analysis available";

/// Critique of a single conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionNote {
    /// Unique identifier
    pub id: NoteId,
    /// Prompt the conversation tested
    pub prompt_id: PromptId,
    /// Persona of the conversation
    pub persona_id: PersonaId,
    /// Generation of the evaluation
    pub generation: Generation,
    /// Verbatim collaborator output, or the placeholder
    pub text: String,
    /// The placeholder was substituted
    pub degraded: bool,
    /// When the note was written
    pub created_at: Time,
}

impl ReflectionNote {
    /// Wrap collaborator output.
    pub fn new(
        prompt_id: PromptId,
        persona_id: PersonaId,
        generation: Generation,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: NoteId::new(),
            prompt_id,
            persona_id,
            generation,
            text: text.into(),
            degraded: false,
            created_at: chrono::Utc::now(),
        }
    }

    /// Neutral placeholder note.
    pub fn placeholder(prompt_id: PromptId, persona_id: PersonaId, generation: Generation) -> Self {
        Self {
            degraded: true,
            ..Self::new(prompt_id, persona_id, generation, NO_ANALYSIS)
        }
    }
}

/// Cross-persona summary for one prompt's panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisNote {
    /// Unique identifier
    pub id: NoteId,
    /// Prompt summarised
    pub prompt_id: PromptId,
    /// Generation of the evaluation
    pub generation: Generation,
    /// Verbatim collaborator output, or the placeholder
    pub text: String,
    /// The placeholder was substituted
    pub degraded: bool,
    /// When the note was written
    pub created_at: Time,
}

impl SynthesisNote {
    /// Wrap collaborator output.
    pub fn new(prompt_id: PromptId, generation: Generation, text: impl Into<String>) -> Self {
        Self {
            id: NoteId::new(),
            prompt_id,
            generation,
            text: text.into(),
            degraded: false,
            created_at: chrono::Utc::now(),
        }
    }

    /// Neutral placeholder note.
    pub fn placeholder(prompt_id: PromptId, generation: Generation) -> Self {
        Self {
            degraded: true,
            ..Self::new(prompt_id, generation, NO_ANALYSIS)
        }
    }
}

/// Append-only log of notes, keyed by prompt id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteLog {
    reflections: BTreeMap<PromptId, Vec<ReflectionNote>>,
    syntheses: BTreeMap<PromptId, Vec<SynthesisNote>>,
}

impl NoteLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reflection.
    pub fn push_reflection(&mut self, note: ReflectionNote) {
        self.reflections.entry(note.prompt_id).or_default().push(note);
    }

    /// Append a synthesis.
    pub fn push_synthesis(&mut self, note: SynthesisNote) {
        self.syntheses.entry(note.prompt_id).or_default().push(note);
    }

    /// Reflections for a prompt, oldest first.
    pub fn reflections(&self, prompt_id: PromptId) -> &[ReflectionNote] {
        self.reflections.get(&prompt_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Syntheses for a prompt, oldest first.
    pub fn syntheses(&self, prompt_id: PromptId) -> &[SynthesisNote] {
        self.syntheses.get(&prompt_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Most recent synthesis for a prompt.
    pub fn latest_synthesis(&self, prompt_id: PromptId) -> Option<&SynthesisNote> {
        self.syntheses.get(&prompt_id).and_then(|notes| notes.last())
    }

    /// Every reflection, grouped by prompt id.
    pub fn all_reflections(&self) -> impl Iterator<Item = &ReflectionNote> {
        self.reflections.values().flatten()
    }

    /// Every synthesis, grouped by prompt id.
    pub fn all_syntheses(&self) -> impl Iterator<Item = &SynthesisNote> {
        self.syntheses.values().flatten()
    }

    /// Count of notes that fell back to the placeholder.
    pub fn degraded_count(&self) -> usize {
        self.all_reflections().filter(|n| n.degraded).count()
            + self.all_syntheses().filter(|n| n.degraded).count()
    }
}
