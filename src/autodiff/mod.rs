//! Forward-mode derivative transcription.
//!
//! Given a lowered function, the transcriber builds a companion function in
//! which every differentiable value travels as a (primal, differential)
//! pair. Instructions in the result carry a mark saying which side of the
//! computation they belong to; downstream passes use the marks to split or
//! fuse the two sides.

mod transcribe;

pub use transcribe::ForwardTranscriber;

use thiserror::Error;

use crate::ir::ValueId;

/// Fatal transcription failures. Per-instruction problems degrade to
/// diagnostics and zero differentials instead.
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("function has no body to transcribe")]
    MissingBody,

    #[error("value %{} is not a function", (.0).0)]
    NotAFunction(ValueId),
}
