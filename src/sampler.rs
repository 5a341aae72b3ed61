use std::collections::{HashMap, VecDeque};

use partial_sort::PartialSort;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::*;

use crate::config::SamplerParameters;
use crate::model::{InferenceEngine, TokenId};
use crate::sequence::{BannedSequence, BannedSequenceSet};
use crate::tokenizer::TokenOutputBuffer;
use crate::types::{Sampled, SessionError};

/// Sampling state for one session: the rolling window of recently accepted tokens, the set of banned sequences, the
/// sampling hyperparameters and the random source. Mutated only by [SamplerState::accept] and [SamplerState::reverse];
/// sampling itself leaves the history untouched.
pub struct SamplerState {
	params: SamplerParameters,
	history: VecDeque<TokenId>,
	banned: BannedSequenceSet,
	rng: StdRng,
	output_buffer: TokenOutputBuffer,
}

impl SamplerState {
	pub fn new(params: SamplerParameters) -> SamplerState {
		let rng = match params.seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};

		SamplerState {
			params,
			history: VecDeque::new(),
			banned: BannedSequenceSet::new(),
			rng,
			output_buffer: TokenOutputBuffer::new(),
		}
	}

	/// Sample one token from `logits`. Penalties are applied for tokens in the history window, banned completions are
	/// forced to negative infinity, the distribution is truncated by temperature/top-k/top-p and a token is drawn from
	/// it. A zero temperature selects the most likely token deterministically. The caller decides whether the chosen
	/// token is accepted into the history.
	pub fn sample(&mut self, engine: &dyn InferenceEngine, logits: &[f32]) -> Result<Sampled, SessionError> {
		if logits.len() != engine.vocabulary_size() {
			return Err(SessionError::Sampling(format!(
				"logits length {} does not match vocabulary size {}",
				logits.len(),
				engine.vocabulary_size()
			)));
		}

		let mut candidates: Vec<(TokenId, f32)> = logits.iter().enumerate().map(|(id, logit)| (id as TokenId, *logit)).collect();
		let history: Vec<TokenId> = self.history.iter().copied().collect();

		self.apply_penalties(&mut candidates, &history);
		self.apply_bans(&mut candidates, &history);

		let token = if self.params.temperature <= 0.0 {
			greedy(&candidates)?
		} else {
			self.draw(candidates)?
		};

		let text = self.output_buffer.push(&engine.token_bytes(token)).unwrap_or_default();
		trace!(token, text = %text, "sampled");

		Ok(Sampled {
			token,
			text,
			is_end_of_text: token == engine.eot_token(),
		})
	}

	/// Push an accepted token onto the history window, evicting the oldest entry when the window is at its configured
	/// bound. Affects future sampling calls, not any sample already produced.
	pub fn accept(&mut self, token: TokenId) {
		let window = self.params.repetition_penalty_last_n;
		if window == 0 {
			return;
		}
		if self.history.len() == window {
			self.history.pop_front();
		}
		self.history.push_back(token);
		trace!(token, history_len = self.history.len(), "accepted token");
	}

	/// Ban the token sequence `text` tokenizes to: a token that would complete the sequence, given the current history
	/// suffix, is never produced by [SamplerState::sample]. Text that tokenizes to nothing adds no ban.
	pub fn reverse(&mut self, engine: &dyn InferenceEngine, text: &str) -> Result<(), SessionError> {
		let tokens = engine.tokenize(text, false, false)?;
		match BannedSequence::new(tokens) {
			Some(sequence) => {
				debug!(?sequence, "banning sequence");
				self.banned.add(sequence);
			}
			None => warn!(text, "reverse text tokenizes to an empty sequence, nothing banned"),
		}
		Ok(())
	}

	/// Clear the history window and the pending output bytes. Banned sequences are cleared as well unless the
	/// parameters say they persist. A fixed seed replays identically after a reset.
	pub fn reset(&mut self) {
		self.history.clear();
		self.output_buffer.clear();
		if !self.params.persist_banned_sequences {
			self.banned.clear();
		}
		if let Some(seed) = self.params.seed {
			self.rng = StdRng::seed_from_u64(seed);
		}
		debug!("sampling context reset");
	}

	/// Release sampling resources. Idempotent.
	pub fn free(&mut self) {
		self.history.clear();
		self.banned.clear();
		self.output_buffer.clear();
	}

	/// The most recently accepted tokens, oldest first
	pub fn recent_tokens(&self) -> Vec<TokenId> {
		self.history.iter().copied().collect()
	}

	pub fn banned_sequence_count(&self) -> usize {
		self.banned.len()
	}

	pub fn parameters(&self) -> &SamplerParameters {
		&self.params
	}

	fn apply_penalties(&self, candidates: &mut [(TokenId, f32)], history: &[TokenId]) {
		if history.is_empty() {
			return;
		}

		let mut counts: HashMap<TokenId, usize> = HashMap::new();
		for token in history {
			*counts.entry(*token).or_insert(0) += 1;
		}

		for (token, logit) in candidates.iter_mut() {
			if let Some(count) = counts.get(token) {
				// llama.cpp convention: dampen towards zero rather than subtract
				if *logit > 0.0 {
					*logit /= self.params.repeat_penalty;
				} else {
					*logit *= self.params.repeat_penalty;
				}
				*logit -= (*count as f32) * self.params.frequency_penalty + self.params.presence_penalty;
			}
		}
	}

	fn apply_bans(&self, candidates: &mut [(TokenId, f32)], history: &[TokenId]) {
		if self.banned.is_empty() {
			return;
		}
		for (token, logit) in candidates.iter_mut() {
			if self.banned.is_banned(history, *token) {
				*logit = f32::NEG_INFINITY;
			}
		}
	}

	fn draw(&mut self, mut candidates: Vec<(TokenId, f32)>) -> Result<TokenId, SessionError> {
		let temperature = self.params.temperature;
		for (_, logit) in candidates.iter_mut() {
			*logit /= temperature;
		}

		// Keep the top_k highest logits
		let k = self.params.top_k.max(1).min(candidates.len());
		candidates.partial_sort(k, |a, b| b.1.total_cmp(&a.1));
		candidates.truncate(k);

		let max_logit = candidates.first().map(|c| c.1).unwrap_or(f32::NEG_INFINITY);
		if !max_logit.is_finite() {
			return Err(SessionError::Sampling("no viable candidate: all tokens are banned or non-finite".to_string()));
		}

		// Softmax over the survivors, then nucleus truncation; at least one candidate is always kept
		let mut weights: Vec<f32> = candidates.iter().map(|(_, logit)| (logit - max_logit).exp()).collect();
		let sum: f32 = weights.iter().sum();
		let mut cumulative = 0.0;
		let mut keep = weights.len();
		for (index, weight) in weights.iter().enumerate() {
			cumulative += weight / sum;
			if cumulative >= self.params.top_p {
				keep = index + 1;
				break;
			}
		}
		candidates.truncate(keep);
		weights.truncate(keep);

		let distribution = WeightedIndex::new(&weights).map_err(|e| SessionError::Sampling(e.to_string()))?;
		Ok(candidates[distribution.sample(&mut self.rng)].0)
	}
}

fn greedy(candidates: &[(TokenId, f32)]) -> Result<TokenId, SessionError> {
	let best = candidates
		.iter()
		.max_by(|a, b| a.1.total_cmp(&b.1))
		.ok_or_else(|| SessionError::Sampling("no candidates to sample from".to_string()))?;
	if best.1 == f32::NEG_INFINITY {
		return Err(SessionError::Sampling("no viable candidate: all tokens are banned".to_string()));
	}
	Ok(best.0)
}
