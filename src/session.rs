use std::fmt::Debug;
use std::time::Instant;

use crate::config::SessionConfig;
use crate::context::EvaluationContext;
use crate::model::{InferenceEngine, TokenId};
use crate::sampler::SamplerState;
use crate::stats::SessionStats;
use crate::tokenizer;
use crate::types::{Feedback, Sampled, SessionError};

/// One inference session: an evaluation context and a sampling state over a single engine, driven by one logical
/// thread of control (tokenize, evaluate, sample, accept, repeat). Sessions do not share state with each other.
pub struct Session {
	context: EvaluationContext,
	sampler: SamplerState,
	config: SessionConfig,
	stats: SessionStats,
	released: bool,
}

impl Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("config", &self.config)
			.field("n_past", &self.context.n_past())
			.field("released", &self.released)
			.finish()
	}
}

impl Session {
	pub fn new(engine: Box<dyn InferenceEngine>, config: SessionConfig) -> Session {
		tracing::info!(
			vocabulary_size = engine.vocabulary_size(),
			context_size = engine.context_size(),
			batch_size = config.batch_size,
			"session starting"
		);
		Session {
			sampler: SamplerState::new(config.sampler.clone()),
			context: EvaluationContext::new(engine),
			config,
			stats: SessionStats::default(),
			released: false,
		}
	}

	fn ensure_active(&self) -> Result<(), SessionError> {
		if self.released {
			Err(SessionError::UseAfterFree)
		} else {
			Ok(())
		}
	}

	/// Convert text to a token sequence using the engine's vocabulary
	pub fn tokenize(&self, text: &str, add_special: bool, parse_special: bool) -> Result<Vec<TokenId>, SessionError> {
		self.ensure_active()?;
		Ok(self.context.engine()?.tokenize(text, add_special, parse_special)?)
	}

	/// Decode a single token to text; empty for control tokens and partial multi-byte fragments
	pub fn token_to_fragment(&self, token: TokenId) -> Result<String, SessionError> {
		self.ensure_active()?;
		Ok(tokenizer::token_to_fragment(self.context.engine()?, token))
	}

	/// Evaluate `tokens`, advancing the model state. Submission is chunked by the configured batch size; on
	/// [SessionError::CapacityExceeded] the chunks already evaluated are retained (see [EvaluationContext::submit]).
	pub fn evaluate_tokens(&mut self, tokens: &[TokenId]) -> Result<(), SessionError> {
		self.ensure_active()?;
		let start = Instant::now();
		let n_before = self.context.n_past();
		let result = self.context.submit(tokens, self.config.batch_size);
		self.stats.add(&SessionStats {
			prompt_tokens: self.context.n_past() - n_before,
			feed_prompt_duration: start.elapsed(),
			..SessionStats::default()
		});
		result
	}

	/// Tokenize `text` and evaluate the result. A beginning-of-sequence marker is requested only when `add_bos` is
	/// set, the model has one and the context is still empty.
	pub fn evaluate_text(&mut self, text: &str, add_bos: bool) -> Result<(), SessionError> {
		self.ensure_active()?;
		let engine = self.context.engine()?;
		let add_special = add_bos && engine.bot_token().is_some() && self.context.n_past() == 0;
		let tokens = engine.tokenize(text, add_special, false)?;
		tracing::debug!(n_tokens = tokens.len(), add_special, "evaluating text");
		self.evaluate_tokens(&tokens)
	}

	/// Sample the next token from the last evaluation's logits. The chosen token is accepted into the sampling
	/// history; the evaluation state is not advanced. Fails with [SessionError::NoLogitsAvailable] when no evaluation
	/// happened since the last sample.
	pub fn sample(&mut self) -> Result<Sampled, SessionError> {
		self.ensure_active()?;
		let start = Instant::now();
		let logits = self.context.take_logits()?;
		let sampled = self.sampler.sample(self.context.engine()?, &logits)?;
		self.sampler.accept(sampled.token);
		self.stats.add(&SessionStats {
			predict_tokens: 1,
			predict_duration: start.elapsed(),
			..SessionStats::default()
		});
		Ok(sampled)
	}

	/// Sample the next token and feed it back into the evaluation context, leaving the session ready for the next
	/// sampling step. The end-of-text token is not fed back.
	pub fn sample_and_evaluate(&mut self) -> Result<Sampled, SessionError> {
		let sampled = self.sample()?;
		if !sampled.is_end_of_text {
			self.evaluate_tokens(&[sampled.token])?;
		}
		Ok(sampled)
	}

	/// Push a token into the sampling history without sampling it (for tokens the caller injected out of band)
	pub fn accept(&mut self, token: TokenId) -> Result<(), SessionError> {
		self.ensure_active()?;
		self.sampler.accept(token);
		Ok(())
	}

	/// Ban the token sequence `text` tokenizes to; it will not be produced by future sampling calls
	pub fn reverse(&mut self, text: &str) -> Result<(), SessionError> {
		self.ensure_active()?;
		self.sampler.reverse(self.context.engine()?, text)
	}

	/// Feed a caller-chosen continuation: `text` is tokenized, evaluated, and accepted into the sampling history as if
	/// the model had produced it.
	pub fn force(&mut self, text: &str) -> Result<(), SessionError> {
		self.ensure_active()?;
		let tokens = self.context.engine()?.tokenize(text, false, false)?;
		self.evaluate_tokens(&tokens)?;
		for token in tokens {
			self.sampler.accept(token);
		}
		Ok(())
	}

	/// Generate tokens until the callback halts, the model emits end-of-text, `max_tokens` is reached or the context
	/// fills up. The callback receives every sampled token except end-of-text. Returns the statistics for this run.
	pub fn complete(&mut self, max_tokens: Option<usize>, mut callback: impl FnMut(&Sampled) -> Feedback) -> Result<SessionStats, SessionError> {
		self.ensure_active()?;
		let before = self.stats.clone();
		let mut tokens_generated: usize = 0;

		loop {
			if let Some(max_tokens) = max_tokens {
				if tokens_generated >= max_tokens {
					break;
				}
			}

			let sampled = match self.sample_and_evaluate() {
				Ok(sampled) => sampled,
				Err(SessionError::CapacityExceeded { .. }) => {
					tracing::warn!("ending generation because context is full");
					break;
				}
				Err(e) => return Err(e),
			};
			tokens_generated += 1;

			if sampled.is_end_of_text {
				tracing::debug!("ending generation on end-of-text");
				break;
			}
			match callback(&sampled) {
				Feedback::Continue => {}
				Feedback::Halt => break,
			}
		}

		let run = self.stats.since(&before);
		let prompt_tokens_per_s = (run.prompt_tokens as f64) / run.feed_prompt_duration.as_secs_f64();
		let predict_tokens_per_s = (run.predict_tokens as f64) / run.predict_duration.as_secs_f64();
		tracing::info!(
			"completion finished; {prompt_tokens_per_s:.3} t/s prompt, {predict_tokens_per_s:.3} t/s predict; stats: {:?}",
			run
		);
		Ok(run)
	}

	/// Discard the evaluation state, returning the context to empty. Sampling state is unaffected.
	pub fn reset(&mut self) -> Result<(), SessionError> {
		self.ensure_active()?;
		self.context.reset()
	}

	/// Clear the sampling history and pending output bytes; banned sequences are cleared as well unless configured to
	/// persist
	pub fn reset_sampling_context(&mut self) -> Result<(), SessionError> {
		self.ensure_active()?;
		self.sampler.reset();
		Ok(())
	}

	/// Release the sampling state and the engine. The session is terminal afterwards: every operation fails with
	/// [SessionError::UseAfterFree]. Idempotent and safe to call during teardown after a failed operation.
	pub fn free_sampling_context(&mut self) {
		if self.released {
			return;
		}
		self.sampler.free();
		self.context.release();
		self.released = true;
		tracing::info!("session released");
	}

	/// Alias for [Session::free_sampling_context]; releases all session resources. Idempotent.
	pub fn release(&mut self) {
		self.free_sampling_context();
	}

	/// Number of tokens evaluated since the last reset
	pub fn n_past(&self) -> usize {
		self.context.n_past()
	}

	/// The most recently accepted tokens, oldest first
	pub fn recent_tokens(&self) -> Vec<TokenId> {
		self.sampler.recent_tokens()
	}

	/// Cumulative statistics for this session
	pub fn stats(&self) -> &SessionStats {
		&self.stats
	}

	pub fn context(&self) -> &EvaluationContext {
		&self.context
	}

	pub fn sampler(&self) -> &SamplerState {
		&self.sampler
	}
}
