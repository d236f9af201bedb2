#![forbid(unsafe_code)]

pub mod cache;
pub mod codec;
pub mod countdown;
pub mod error;
pub mod model;
pub mod time;

pub use cache::PageCache;
pub use codec::{AnswerCodec, JsonFieldCodec};
pub use countdown::{CountdownState, CountdownTimer};
pub use error::Error;
pub use time::Clock;
