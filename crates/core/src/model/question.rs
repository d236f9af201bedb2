use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::QuestionId;

/// Presentation type of a question. Grading semantics live on the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Radio,
    Checkbox,
    Text,
    Select,
    Essay,
    #[serde(other)]
    Other,
}

/// A question record exactly as the service sends it; `payload` belongs to the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQuestion {
    pub id: QuestionId,
    pub page: usize,
    pub kind: QuestionKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// One editable field of a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Key used when sending the answer to the service.
    pub name: String,
    pub field: AnswerField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerField {
    Scalar {
        value: Option<String>,
    },
    /// Checkbox group; `options` keep their declared order.
    MultiValued {
        options: Vec<String>,
        checked: BTreeSet<String>,
    },
}

impl Answer {
    #[must_use]
    pub fn scalar(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            field: AnswerField::Scalar { value },
        }
    }

    #[must_use]
    pub fn multi_valued<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            field: AnswerField::MultiValued {
                options: options.into_iter().map(Into::into).collect(),
                checked: BTreeSet::new(),
            },
        }
    }

    /// Mark `option` as initially checked. No effect on scalar answers.
    #[must_use]
    pub fn with_checked(mut self, option: impl Into<String>) -> Self {
        if let AnswerField::MultiValued { checked, .. } = &mut self.field {
            checked.insert(option.into());
        }
        self
    }
}

/// One assessable unit on a page, after the codec has parsed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub page_index: usize,
    pub kind: QuestionKind,
    pub text: String,
    pub answers: Vec<Answer>,
}

/// A value written into a single cached field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Checked(bool),
}

/// A value in the flat answer map sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollectedAnswer {
    Single(String),
    Multiple(Vec<String>),
}

/// Flat answer map, keyed by answer name.
pub type AnswerMap = BTreeMap<String, CollectedAnswer>;
