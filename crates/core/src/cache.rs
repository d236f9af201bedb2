//! Questions and in-memory answer fields for the page being edited.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::codec::{AnswerCodec, parse_page};
use crate::model::{AnswerField, AnswerMap, CollectedAnswer, FieldValue, Question, RawQuestion};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CacheError {
    #[error("field `{0}` is not on the current page")]
    UnknownField(String),

    #[error("field `{key}` expects a {expected} value")]
    KindMismatch { key: String, expected: &'static str },

    #[error("field key `{0}` is declared more than once")]
    DuplicateField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldSlot {
    Scalar,
    CheckboxOption,
}

/// Key of one checkbox option inside the flat field map.
#[must_use]
pub fn option_key(name: &str, option: &str) -> String {
    format!("{name}_{option}")
}

/// The current page's questions plus the flat field map the user edits.
///
/// Scalar answers are stored under their name. Checkbox groups are stored as
/// one boolean per option keyed `"<name>_<option>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCache {
    page_index: usize,
    questions: Vec<Question>,
    fields: BTreeMap<String, FieldValue>,
    slots: BTreeMap<String, FieldSlot>,
}

impl PageCache {
    /// Build the cache for a freshly loaded page, seeding fields from the
    /// values the codec found in the question payloads.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::DuplicateField` if two answers map to the same key.
    pub fn load(page_index: usize, questions: Vec<Question>) -> Result<Self, CacheError> {
        let mut fields = BTreeMap::new();
        let mut slots = BTreeMap::new();

        for answer in questions.iter().flat_map(|q| q.answers.iter()) {
            match &answer.field {
                AnswerField::Scalar { value } => {
                    claim(&mut slots, answer.name.clone(), FieldSlot::Scalar)?;
                    if let Some(value) = value {
                        fields.insert(answer.name.clone(), FieldValue::Text(value.clone()));
                    }
                }
                AnswerField::MultiValued { options, checked } => {
                    for option in options {
                        let key = option_key(&answer.name, option);
                        claim(&mut slots, key.clone(), FieldSlot::CheckboxOption)?;
                        fields.insert(key, FieldValue::Checked(checked.contains(option)));
                    }
                }
            }
        }

        Ok(Self {
            page_index,
            questions,
            fields,
            slots,
        })
    }

    /// Parse a fetched page with `codec` and build its cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` if a question cannot be parsed, or `Error::Cache`
    /// if the parsed fields collide.
    pub fn from_raw(
        codec: &dyn AnswerCodec,
        page_index: usize,
        raws: &[RawQuestion],
    ) -> Result<Self, crate::Error> {
        let questions = parse_page(codec, page_index, raws)?;
        Ok(Self::load(page_index, questions)?)
    }

    #[must_use]
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Write one field. Scalars take text, checkbox options take booleans.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::UnknownField` for keys not on this page and
    /// `CacheError::KindMismatch` when the value type does not fit the field.
    pub fn apply(&mut self, key: &str, value: FieldValue) -> Result<(), CacheError> {
        let slot = *self
            .slots
            .get(key)
            .ok_or_else(|| CacheError::UnknownField(key.to_string()))?;

        let expected = match slot {
            FieldSlot::Scalar => "text",
            FieldSlot::CheckboxOption => "boolean",
        };
        let fits = matches!(
            (slot, &value),
            (FieldSlot::Scalar, FieldValue::Text(_))
                | (FieldSlot::CheckboxOption, FieldValue::Checked(_))
        );
        if !fits {
            return Err(CacheError::KindMismatch {
                key: key.to_string(),
                expected,
            });
        }

        self.fields.insert(key.to_string(), value);
        Ok(())
    }

    /// Copy field values from an earlier cache of the same page.
    ///
    /// Only keys that exist here with the same kind are taken; everything else
    /// keeps the freshly loaded value.
    pub fn adopt_fields(&mut self, earlier: &PageCache) {
        for (key, value) in &earlier.fields {
            if self.slots.get(key).is_some() && self.slots.get(key) == earlier.slots.get(key) {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    /// Build the flat answer map the service expects.
    ///
    /// Checkbox options sharing a base name are merged into one array of the
    /// checked option values, in declared order. A group with nothing checked
    /// is left out entirely rather than sent as an empty array.
    #[must_use]
    pub fn collect(&self) -> AnswerMap {
        let mut out = AnswerMap::new();

        for answer in self.questions.iter().flat_map(|q| q.answers.iter()) {
            match &answer.field {
                AnswerField::Scalar { .. } => {
                    if let Some(FieldValue::Text(text)) = self.fields.get(&answer.name) {
                        out.insert(answer.name.clone(), CollectedAnswer::Single(text.clone()));
                    }
                }
                AnswerField::MultiValued { options, .. } => {
                    let selected: Vec<String> = options
                        .iter()
                        .filter(|option| {
                            matches!(
                                self.fields.get(&option_key(&answer.name, option)),
                                Some(FieldValue::Checked(true))
                            )
                        })
                        .cloned()
                        .collect();
                    if !selected.is_empty() {
                        out.insert(answer.name.clone(), CollectedAnswer::Multiple(selected));
                    }
                }
            }
        }

        out
    }
}

fn claim(
    slots: &mut BTreeMap<String, FieldSlot>,
    key: String,
    slot: FieldSlot,
) -> Result<(), CacheError> {
    if slots.contains_key(&key) {
        return Err(CacheError::DuplicateField(key));
    }
    slots.insert(key, slot);
    Ok(())
}
