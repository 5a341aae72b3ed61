use std::time::Duration;

use serde::Serialize;

/// Counters for the work a session has performed
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
	/// Number of tokens fed into the evaluation context (prompt or forced input)
	pub prompt_tokens: usize,

	/// Total duration of prompt feeding
	pub feed_prompt_duration: Duration,

	/// Number of tokens produced by sampling
	pub predict_tokens: usize,

	/// Total duration of sampling
	pub predict_duration: Duration,
}

impl Default for SessionStats {
	fn default() -> Self {
		Self {
			prompt_tokens: 0,
			feed_prompt_duration: Duration::ZERO,

			predict_tokens: 0,
			predict_duration: Duration::ZERO,
		}
	}
}

impl SessionStats {
	pub fn add(&mut self, stats: &SessionStats) {
		self.prompt_tokens += stats.prompt_tokens;
		self.feed_prompt_duration += stats.feed_prompt_duration;
		self.predict_tokens += stats.predict_tokens;
		self.predict_duration += stats.predict_duration;
	}

	/// The work performed since an earlier snapshot
	pub fn since(&self, earlier: &SessionStats) -> SessionStats {
		SessionStats {
			prompt_tokens: self.prompt_tokens.saturating_sub(earlier.prompt_tokens),
			feed_prompt_duration: self.feed_prompt_duration.saturating_sub(earlier.feed_prompt_duration),
			predict_tokens: self.predict_tokens.saturating_sub(earlier.predict_tokens),
			predict_duration: self.predict_duration.saturating_sub(earlier.predict_duration),
		}
	}
}
