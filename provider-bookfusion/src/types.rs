//! BookFusion Calibre API response types

use serde::Deserialize;
use serde_json::{Map, Value};

/// `POST /uploads/init` response: a presigned storage form
///
/// `params` must be posted back verbatim ahead of the file part.
#[derive(Debug, Clone, Deserialize)]
pub struct InitResponse {
    pub url: String,
    pub params: Map<String, Value>,
}

impl InitResponse {
    /// The storage key the finalize call refers to
    pub fn key(&self) -> Option<String> {
        self.params.get("key").map(value_to_string)
    }

    /// Form fields as text, in response order
    pub fn form_fields(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(name, value)| (name.clone(), value_to_string(value)))
            .collect()
    }
}

/// `POST /uploads/finalize` response; only the book id is used
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalizeResponse {
    #[serde(default)]
    pub id: Option<Value>,
}

impl FinalizeResponse {
    pub fn id(&self) -> Option<String> {
        match &self.id {
            None | Some(Value::Null) => None,
            Some(value) => Some(value_to_string(value)),
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
