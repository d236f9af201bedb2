use thiserror::Error;

use crate::cache::CacheError;
use crate::codec::CodecError;

/// Failure to turn a fetched page into an editable page.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}
