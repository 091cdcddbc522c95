//! Output schema declared to the provider with every generation call.
//!
//! The declaration uses the provider's OpenAPI subset (`OBJECT`, `STRING`,
//! `ARRAY`, `INTEGER`). It mirrors [`crate::response::StudyResponse`] exactly;
//! the validator in [`crate::response`] still checks every field on receipt.

use serde_json::{json, Value};

pub const RESPONSE_MIME_TYPE: &str = "application/json";

pub const TOP_LEVEL_FIELDS: [&str; 5] = ["speed", "mermaid", "step", "deep", "exam"];
pub const SPEED_FIELDS: [&str; 2] = ["answer", "similar"];
pub const SIMILAR_FIELDS: [&str; 3] = ["question", "options", "correctIndex"];

pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "speed": {
                "type": "OBJECT",
                "properties": {
                    "answer": { "type": "STRING" },
                    "similar": {
                        "type": "OBJECT",
                        "properties": {
                            "question": { "type": "STRING" },
                            "options": {
                                "type": "ARRAY",
                                "items": { "type": "STRING" },
                            },
                            "correctIndex": { "type": "INTEGER" },
                        },
                        "required": SIMILAR_FIELDS,
                        "propertyOrdering": SIMILAR_FIELDS,
                    },
                },
                "required": SPEED_FIELDS,
                "propertyOrdering": SPEED_FIELDS,
            },
            "mermaid": { "type": "STRING" },
            "step": { "type": "STRING" },
            "deep": { "type": "STRING" },
            "exam": { "type": "STRING" },
        },
        "required": TOP_LEVEL_FIELDS,
        "propertyOrdering": TOP_LEVEL_FIELDS,
    })
}
