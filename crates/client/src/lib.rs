#![forbid(unsafe_code)]

pub mod error;
pub mod http;
pub mod memory;
pub mod retry;
pub mod service;

pub use error::ServiceError;
pub use http::{HttpAssessmentService, HttpServiceConfig};
pub use memory::{InMemoryAssessmentService, QuizFixture, ServiceCall};
pub use retry::RetryConfig;
pub use service::{AssessmentService, ServiceOperation};
