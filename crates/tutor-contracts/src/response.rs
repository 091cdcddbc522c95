//! Typed study response and the validator that produces it.
//!
//! Provider output is checked field by field in a fixed order and the first
//! violation is reported. Nothing is defaulted: a payload either matches the
//! declared schema completely or is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarQuestion {
    question: String,
    options: Vec<String>,
    correct_index: usize,
}

impl SimilarQuestion {
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Always a valid position in [`SimilarQuestion::options`].
    pub fn correct_index(&self) -> usize {
        self.correct_index
    }

    pub fn correct_option(&self) -> &str {
        self.options
            .get(self.correct_index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn is_correct(&self, choice: usize) -> bool {
        choice == self.correct_index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeedAnswer {
    answer: String,
    similar: SimilarQuestion,
}

impl SpeedAnswer {
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn similar(&self) -> &SimilarQuestion {
        &self.similar
    }
}

/// A response that passed [`validate`]. Only [`parse`], [`validate`] and
/// deserialization (which runs the same checks) construct one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct StudyResponse {
    speed: SpeedAnswer,
    mermaid: String,
    step: String,
    deep: String,
    exam: String,
}

impl StudyResponse {
    pub fn speed(&self) -> &SpeedAnswer {
        &self.speed
    }

    pub fn mermaid(&self) -> &str {
        &self.mermaid
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn deep(&self) -> &str {
        &self.deep
    }

    pub fn exam(&self) -> &str {
        &self.exam
    }
}

impl TryFrom<Value> for StudyResponse {
    type Error = SchemaViolation;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        validate(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    MissingField,
    WrongType,
    IndexOutOfRange,
    TooFewOptions,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViolationKind::MissingField => "missing field",
            ViolationKind::WrongType => "wrong type",
            ViolationKind::IndexOutOfRange => "index out of range",
            ViolationKind::TooFewOptions => "too few options",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at `{field}`")]
pub struct SchemaViolation {
    pub field: String,
    pub kind: ViolationKind,
}

impl SchemaViolation {
    fn new(field: &str, kind: ViolationKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("provider output is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("provider output violates the response schema: {0}")]
    SchemaViolation(#[from] SchemaViolation),
}

pub const MIN_OPTIONS: usize = 2;

pub fn parse(raw_text: &str) -> Result<StudyResponse, ParseError> {
    let value: Value =
        serde_json::from_str(raw_text).map_err(|err| ParseError::MalformedJson(err.to_string()))?;
    Ok(validate(&value)?)
}

/// Checks order: speed.answer, speed.similar.question, speed.similar.options,
/// speed.similar.correctIndex, mermaid, step, deep, exam.
///
/// The minimum option count is enforced after `correctIndex`, so a single
/// option paired with index 1 reports `IndexOutOfRange` on `correctIndex`
/// rather than `TooFewOptions`; a single option with a valid index 0 reports
/// `TooFewOptions`.
pub fn validate(value: &Value) -> Result<StudyResponse, SchemaViolation> {
    let root = value
        .as_object()
        .ok_or_else(|| SchemaViolation::new("$", ViolationKind::WrongType))?;

    let speed = object_field(root, "speed", "speed")?;
    let answer = string_field(speed, "answer", "speed.answer")?;
    let similar = object_field(speed, "similar", "speed.similar")?;
    let question = string_field(similar, "question", "speed.similar.question")?;
    let options = string_list_field(similar, "options", "speed.similar.options")?;
    let correct_index = index_field(
        similar,
        "correctIndex",
        "speed.similar.correctIndex",
        options.len(),
    )?;
    if options.len() < MIN_OPTIONS {
        return Err(SchemaViolation::new(
            "speed.similar.options",
            ViolationKind::TooFewOptions,
        ));
    }

    Ok(StudyResponse {
        speed: SpeedAnswer {
            answer,
            similar: SimilarQuestion {
                question,
                options,
                correct_index,
            },
        },
        mermaid: string_field(root, "mermaid", "mermaid")?,
        step: string_field(root, "step", "step")?,
        deep: string_field(root, "deep", "deep")?,
        exam: string_field(root, "exam", "exam")?,
    })
}

fn required<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Value, SchemaViolation> {
    match object.get(key) {
        None | Some(Value::Null) => Err(SchemaViolation::new(path, ViolationKind::MissingField)),
        Some(value) => Ok(value),
    }
}

fn object_field<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, SchemaViolation> {
    required(object, key, path)?
        .as_object()
        .ok_or_else(|| SchemaViolation::new(path, ViolationKind::WrongType))
}

fn string_field(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<String, SchemaViolation> {
    required(object, key, path)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SchemaViolation::new(path, ViolationKind::WrongType))
}

fn string_list_field(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Vec<String>, SchemaViolation> {
    let rows = required(object, key, path)?
        .as_array()
        .ok_or_else(|| SchemaViolation::new(path, ViolationKind::WrongType))?;
    rows.iter()
        .map(|row| {
            row.as_str()
                .map(str::to_string)
                .ok_or_else(|| SchemaViolation::new(path, ViolationKind::WrongType))
        })
        .collect()
}

fn index_field(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    len: usize,
) -> Result<usize, SchemaViolation> {
    let value = required(object, key, path)?;
    let out_of_range = || SchemaViolation::new(path, ViolationKind::IndexOutOfRange);
    // Providers sometimes emit integral floats such as `1.0`.
    let index = if let Some(raw) = value.as_u64() {
        raw
    } else if value.as_i64().is_some() {
        return Err(out_of_range());
    } else if let Some(raw) = value.as_f64().filter(|raw| raw.fract() == 0.0) {
        if raw < 0.0 {
            return Err(out_of_range());
        }
        raw as u64
    } else {
        return Err(SchemaViolation::new(path, ViolationKind::WrongType));
    };
    usize::try_from(index)
        .ok()
        .filter(|index| *index < len)
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{parse, ParseError, SchemaViolation, StudyResponse, ViolationKind};

    fn valid_payload() -> Value {
        json!({
            "speed": {
                "answer": "4",
                "similar": {
                    "question": "3+3=?",
                    "options": ["5", "6", "7"],
                    "correctIndex": 1,
                },
            },
            "mermaid": "graph TD; A-->B",
            "step": "Add the two numbers.",
            "deep": "Addition is commutative.",
            "exam": "Expect mental arithmetic questions.",
        })
    }

    fn violation(payload: &Value) -> SchemaViolation {
        match parse(&payload.to_string()) {
            Err(ParseError::SchemaViolation(violation)) => violation,
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    fn remove(payload: &mut Value, path: &[&str]) {
        let (last, parents) = path.split_last().unwrap();
        let mut node = payload;
        for key in parents {
            node = &mut node[*key];
        }
        node.as_object_mut().unwrap().remove(*last);
    }

    #[test]
    fn parses_valid_payload() {
        let response = parse(&valid_payload().to_string()).unwrap();
        assert_eq!(response.speed().answer(), "4");
        let similar = response.speed().similar();
        assert_eq!(similar.question(), "3+3=?");
        assert_eq!(similar.options(), ["5", "6", "7"]);
        assert_eq!(similar.correct_index(), 1);
        assert_eq!(similar.correct_option(), "6");
        assert!(similar.is_correct(1));
        assert!(!similar.is_correct(0));
        assert_eq!(response.mermaid(), "graph TD; A-->B");
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(parse("{not json"), Err(ParseError::MalformedJson(_))));
        assert!(matches!(parse(""), Err(ParseError::MalformedJson(_))));
    }

    #[test]
    fn each_missing_field_is_named() {
        let cases: [&[&str]; 8] = [
            &["speed", "answer"],
            &["speed", "similar", "question"],
            &["speed", "similar", "options"],
            &["speed", "similar", "correctIndex"],
            &["mermaid"],
            &["step"],
            &["deep"],
            &["exam"],
        ];
        for path in cases {
            let mut payload = valid_payload();
            remove(&mut payload, path);
            let found = violation(&payload);
            assert_eq!(found.field, path.join("."));
            assert_eq!(found.kind, ViolationKind::MissingField);
        }
    }

    #[test]
    fn missing_containers_are_named_at_container_path() {
        let mut payload = valid_payload();
        remove(&mut payload, &["speed"]);
        assert_eq!(violation(&payload).field, "speed");

        let mut payload = valid_payload();
        remove(&mut payload, &["speed", "similar"]);
        assert_eq!(violation(&payload).field, "speed.similar");
    }

    #[test]
    fn first_violation_in_check_order_wins() {
        let mut payload = valid_payload();
        remove(&mut payload, &["exam"]);
        remove(&mut payload, &["speed", "answer"]);
        payload["mermaid"] = json!(12);
        assert_eq!(
            violation(&payload),
            SchemaViolation {
                field: "speed.answer".to_string(),
                kind: ViolationKind::MissingField,
            }
        );
    }

    #[test]
    fn null_counts_as_missing() {
        let mut payload = valid_payload();
        payload["step"] = Value::Null;
        assert_eq!(violation(&payload).kind, ViolationKind::MissingField);
    }

    #[test]
    fn wrong_types_are_reported() {
        let mut payload = valid_payload();
        payload["speed"]["similar"]["options"] = json!(["a", 2]);
        let found = violation(&payload);
        assert_eq!(found.field, "speed.similar.options");
        assert_eq!(found.kind, ViolationKind::WrongType);

        let mut payload = valid_payload();
        payload["speed"]["similar"]["correctIndex"] = json!("1");
        assert_eq!(violation(&payload).kind, ViolationKind::WrongType);

        let mut payload = valid_payload();
        payload["speed"]["similar"]["correctIndex"] = json!(0.5);
        assert_eq!(violation(&payload).kind, ViolationKind::WrongType);

        assert_eq!(violation(&json!(["not", "an", "object"])).field, "$");
    }

    #[test]
    fn single_option_with_index_one_is_out_of_range() {
        let raw = r#"{"speed":{"answer":"x","similar":{"question":"q","options":["a"],"correctIndex":1}}, "mermaid":"...", "step":"...", "deep":"...", "exam":"..."}"#;
        match parse(raw) {
            Err(ParseError::SchemaViolation(found)) => {
                assert_eq!(found.field, "speed.similar.correctIndex");
                assert_eq!(found.kind, ViolationKind::IndexOutOfRange);
            }
            other => panic!("expected index violation, got {other:?}"),
        }
    }

    #[test]
    fn negative_and_large_indexes_are_out_of_range() {
        for index in [json!(-1), json!(3), json!(-2.0), json!(u64::MAX)] {
            let mut payload = valid_payload();
            payload["speed"]["similar"]["correctIndex"] = index;
            assert_eq!(violation(&payload).kind, ViolationKind::IndexOutOfRange);
        }
    }

    #[test]
    fn integral_float_index_is_accepted() {
        let mut payload = valid_payload();
        payload["speed"]["similar"]["correctIndex"] = json!(2.0);
        let response = parse(&payload.to_string()).unwrap();
        assert_eq!(response.speed().similar().correct_index(), 2);
    }

    #[test]
    fn single_valid_option_is_too_few() {
        let mut payload = valid_payload();
        payload["speed"]["similar"]["options"] = json!(["only"]);
        payload["speed"]["similar"]["correctIndex"] = json!(0);
        let found = violation(&payload);
        assert_eq!(found.field, "speed.similar.options");
        assert_eq!(found.kind, ViolationKind::TooFewOptions);
    }

    #[test]
    fn deserializing_runs_the_same_checks() {
        let mut payload = valid_payload();
        payload["speed"]["similar"]["options"] = json!(["a"]);
        payload["speed"]["similar"]["correctIndex"] = json!(7);
        let err = serde_json::from_value::<StudyResponse>(payload).unwrap_err();
        assert!(err.to_string().contains("speed.similar.correctIndex"));

        let response: StudyResponse = serde_json::from_value(valid_payload()).unwrap();
        assert_eq!(response, parse(&valid_payload().to_string()).unwrap());
    }

    #[test]
    fn serialized_response_parses_back() {
        let response = parse(&valid_payload().to_string()).unwrap();
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["speed"]["similar"]["correctIndex"], 1);
        assert_eq!(parse(&encoded.to_string()).unwrap(), response);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut payload = valid_payload();
        payload["extra"] = json!({"anything": true});
        assert!(parse(&payload.to_string()).is_ok());
    }

    #[test]
    fn error_messages_name_the_field() {
        let mut payload = valid_payload();
        remove(&mut payload, &["deep"]);
        let err = parse(&payload.to_string()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "provider output violates the response schema: missing field at `deep`"
        );
    }
}
