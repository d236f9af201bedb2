mod attempt;
mod ids;
mod question;

pub use attempt::{AccessInfo, Attempt, AttemptData, AttemptState, SubmissionResult};
pub use ids::{AttemptId, ParseIdError, QuestionId, QuizId};
pub use question::{
    Answer, AnswerField, AnswerMap, CollectedAnswer, FieldValue, Question, QuestionKind,
    RawQuestion,
};
