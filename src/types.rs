use thiserror::Error;

use crate::model::{DecodeError, EncodingError, TokenId};

/// The result of a single sampling call
#[derive(Debug, Clone, PartialEq)]
pub struct Sampled {
	/// The chosen token
	pub token: TokenId,

	/// Decoded text for the chosen token. Empty while a multi-byte character is still incomplete; the missing bytes
	/// are emitted with a later token.
	pub text: String,

	/// Whether the chosen token is the engine's end-of-text token
	pub is_end_of_text: bool,
}

/// Returned by completion callbacks to steer generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
	/// Continue generation
	Continue,

	/// Stop generation
	Halt,
}

#[derive(Error, Debug)]
pub enum SessionError {
	#[error("encoding error: {0}")]
	Encoding(#[from] EncodingError),

	#[error("context capacity exceeded: {requested} tokens requested while {submitted} fit in a context of {capacity}")]
	CapacityExceeded { submitted: usize, requested: usize, capacity: usize },

	#[error("no logits available: sample called without a preceding evaluation")]
	NoLogitsAvailable,

	#[error("use after free: the session's resources have been released")]
	UseAfterFree,

	#[error("inference error: {0}")]
	Inference(#[from] DecodeError),

	#[error("sampling error: {0}")]
	Sampling(String),
}
