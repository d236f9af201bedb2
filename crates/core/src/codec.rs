//! Turning raw question records into editable answer fields.

use std::collections::BTreeSet;

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Answer, AnswerField, Question, QuestionId, RawQuestion};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    #[error("question {id}: malformed payload: {reason}")]
    Malformed { id: QuestionId, reason: String },

    #[error("question {id}: field without a name")]
    MissingName { id: QuestionId },

    #[error("question {id}: unknown field kind `{kind}`")]
    UnknownKind { id: QuestionId, kind: String },
}

/// A question as understood by the codec, before it is placed on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuestion {
    pub text: String,
    pub answers: Vec<Answer>,
}

/// Parses question-type-specific payloads into answer fields.
///
/// Implementations must be pure: the same record always yields the same result.
pub trait AnswerCodec: Send + Sync {
    /// Parse one raw question.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the payload cannot be understood.
    fn parse(&self, raw: &RawQuestion) -> Result<ParsedQuestion, CodecError>;
}

/// Parse every raw question of a page, in order.
///
/// # Errors
///
/// Returns the first `CodecError` encountered.
pub fn parse_page(
    codec: &dyn AnswerCodec,
    page_index: usize,
    raws: &[RawQuestion],
) -> Result<Vec<Question>, CodecError> {
    raws.iter()
        .map(|raw| {
            let parsed = codec.parse(raw)?;
            Ok(Question {
                id: raw.id,
                page_index,
                kind: raw.kind,
                text: parsed.text,
                answers: parsed.answers,
            })
        })
        .collect()
}

/// Codec for payloads that declare their fields explicitly:
///
/// ```json
/// { "text": "Pick two",
///   "fields": [ { "name": "q2", "kind": "multi", "options": ["a", "b"], "checked": ["b"] } ] }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFieldCodec;

#[derive(Debug, Deserialize)]
struct PayloadShape {
    #[serde(default)]
    text: String,
    #[serde(default)]
    fields: Vec<FieldShape>,
}

#[derive(Debug, Deserialize)]
struct FieldShape {
    #[serde(default)]
    name: String,
    kind: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    checked: Vec<String>,
}

impl AnswerCodec for JsonFieldCodec {
    fn parse(&self, raw: &RawQuestion) -> Result<ParsedQuestion, CodecError> {
        if raw.payload.is_null() {
            return Ok(ParsedQuestion {
                text: String::new(),
                answers: Vec::new(),
            });
        }
        let shape: PayloadShape =
            serde_json::from_value(raw.payload.clone()).map_err(|e| CodecError::Malformed {
                id: raw.id,
                reason: e.to_string(),
            })?;

        let mut answers = Vec::with_capacity(shape.fields.len());
        for field in shape.fields {
            if field.name.trim().is_empty() {
                return Err(CodecError::MissingName { id: raw.id });
            }
            let answer_field = match field.kind.as_str() {
                "scalar" | "text" | "radio" | "select" => AnswerField::Scalar { value: field.value },
                "multi" | "checkbox" => {
                    let checked: BTreeSet<String> = field
                        .checked
                        .into_iter()
                        .filter(|opt| field.options.contains(opt))
                        .collect();
                    AnswerField::MultiValued {
                        options: field.options,
                        checked,
                    }
                }
                other => {
                    return Err(CodecError::UnknownKind {
                        id: raw.id,
                        kind: other.to_string(),
                    });
                }
            };
            answers.push(Answer {
                name: field.name,
                field: answer_field,
            });
        }

        Ok(ParsedQuestion {
            text: shape.text,
            answers,
        })
    }
}
