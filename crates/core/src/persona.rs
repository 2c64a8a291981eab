//! Persona - the simulated counterpart an instruction is tested against.

use crate::id::PersonaId;
use serde::{Deserialize, Serialize};

/// A simulated counterpart profile.
///
/// The optimizer never looks inside `profile`; it is handed through to the
/// dialogue-simulation and scoring collaborators untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Unique identifier within a panel
    pub id: PersonaId,

    /// Display name
    pub name: String,

    /// Opaque profile payload
    #[serde(default)]
    pub profile: serde_json::Value,
}

impl Persona {
    /// Create a persona with an empty profile.
    pub fn new(id: impl Into<PersonaId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            profile: serde_json::Value::Null,
        }
    }

    /// Attach a profile payload.
    pub fn with_profile(mut self, profile: serde_json::Value) -> Self {
        self.profile = profile;
        self
    }
}

impl From<String> for PersonaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
