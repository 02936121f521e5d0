//! Inbound conversational request

use serde::{Deserialize, Serialize};

/// A single conversational turn handed to the router by the transport layer.
///
/// Immutable once built; the router only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl Request {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model_hint: None,
            conversation_id: None,
        }
    }

    /// Ask for a specific configured model. Ignored when that model's
    /// provider is disabled or the model is unknown.
    pub fn model_hint(mut self, model: impl Into<String>) -> Self {
        self.model_hint = Some(model.into());
        self
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }
}
