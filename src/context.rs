use tracing::*;

use crate::model::{InferenceEngine, TokenId};
use crate::types::SessionError;

/// Owns the engine's mutable inference state: the attention/recurrent cache and the position cursor. The engine is
/// held exclusively; releasing it is permanent and every later operation fails with [SessionError::UseAfterFree].
pub struct EvaluationContext {
	engine: Option<Box<dyn InferenceEngine>>,
	n_past: usize,
	has_logits: bool,
}

impl EvaluationContext {
	pub fn new(engine: Box<dyn InferenceEngine>) -> EvaluationContext {
		EvaluationContext {
			engine: Some(engine),
			n_past: 0,
			has_logits: false,
		}
	}

	pub(crate) fn engine(&self) -> Result<&dyn InferenceEngine, SessionError> {
		self.engine.as_deref().ok_or(SessionError::UseAfterFree)
	}

	/// Submit `tokens` for evaluation in chunks of at most `batch_size`, advancing the position cursor by each
	/// successfully decoded chunk. When the context's capacity would be exceeded, no further chunks are submitted and
	/// the call fails with [SessionError::CapacityExceeded]; the chunks decoded so far are retained and must be
	/// discarded with [EvaluationContext::reset] to recover a clean context.
	pub fn submit(&mut self, tokens: &[TokenId], batch_size: usize) -> Result<(), SessionError> {
		let batch_size = batch_size.max(1);
		let capacity = self.engine()?.context_size();
		let requested = tokens.len();
		self.has_logits = false;

		for chunk in tokens.chunks(batch_size) {
			if self.n_past + chunk.len() > capacity {
				warn!(
					n_past = self.n_past,
					requested, capacity, "context capacity exceeded; partial evaluation state retained"
				);
				return Err(SessionError::CapacityExceeded {
					submitted: self.n_past,
					requested,
					capacity,
				});
			}

			let engine = self.engine.as_deref_mut().ok_or(SessionError::UseAfterFree)?;
			engine.decode(chunk)?;
			self.n_past += chunk.len();
			trace!(n_past = self.n_past, chunk_len = chunk.len(), "decoded chunk");
		}

		if !tokens.is_empty() {
			self.has_logits = true;
		}
		Ok(())
	}

	/// Tokenize `text` and submit the result. `add_bos` requests a beginning-of-sequence marker from the tokenizer.
	pub fn submit_text(&mut self, text: &str, batch_size: usize, add_bos: bool) -> Result<(), SessionError> {
		let tokens = self.engine()?.tokenize(text, add_bos, false)?;
		self.submit(&tokens, batch_size)
	}

	/// Logits for the last evaluated position. Valid only immediately after a successful submit; taking them returns
	/// the context to the not-evaluated state so stale logits can never be sampled twice.
	pub fn take_logits(&mut self) -> Result<Vec<f32>, SessionError> {
		let engine = self.engine.as_deref().ok_or(SessionError::UseAfterFree)?;
		if !self.has_logits {
			return Err(SessionError::NoLogitsAvailable);
		}
		let logits = engine.logits().to_vec();
		self.has_logits = false;
		Ok(logits)
	}

	pub fn has_logits(&self) -> bool {
		self.has_logits
	}

	/// Number of tokens evaluated since the last reset
	pub fn n_past(&self) -> usize {
		self.n_past
	}

	pub fn capacity(&self) -> Result<usize, SessionError> {
		Ok(self.engine()?.context_size())
	}

	pub fn remaining(&self) -> Result<usize, SessionError> {
		Ok(self.capacity()?.saturating_sub(self.n_past))
	}

	/// Discard the engine cache and position cursor, returning the context to its initial empty state. Engine
	/// resources stay allocated.
	pub fn reset(&mut self) -> Result<(), SessionError> {
		let engine = self.engine.as_deref_mut().ok_or(SessionError::UseAfterFree)?;
		engine.clear_cache();
		self.n_past = 0;
		self.has_logits = false;
		debug!("evaluation context reset");
		Ok(())
	}

	/// Permanently release the engine. Idempotent.
	pub fn release(&mut self) {
		if self.engine.take().is_some() {
			debug!("evaluation context released");
		}
		self.has_logits = false;
	}

	pub fn is_released(&self) -> bool {
		self.engine.is_none()
	}
}
