use serde::Deserialize;

/// Sampling hyperparameters for a session. All fields have defaults so a config file only needs to name the ones it
/// changes.
#[derive(Deserialize, Debug, Clone)]
pub struct SamplerParameters {
	/// The top K words by score are kept during sampling.
	#[serde(default = "default_top_k")]
	pub top_k: usize,

	/// The cumulative probability after which no more words are kept for sampling.
	#[serde(default = "default_top_p")]
	pub top_p: f32,

	/// The penalty for repeating tokens. Higher values make the generation less
	/// likely to get into a loop, but may harm results when repetitive outputs
	/// are desired.
	#[serde(default = "default_repeat_penalty")]
	pub repeat_penalty: f32,

	/// Penalty subtracted per occurrence of a token within the penalty window
	#[serde(default = "default_frequency_penalty")]
	pub frequency_penalty: f32,

	/// Penalty subtracted once for any token present in the penalty window
	#[serde(default = "default_presence_penalty")]
	pub presence_penalty: f32,

	/// Temperature (randomness) used for sampling. A higher number is more random. Zero selects the most likely
	/// token deterministically.
	#[serde(default = "default_temperature")]
	pub temperature: f32,

	/// The number of tokens to consider for the repetition penalty; also the size of the accepted-token history
	#[serde(default = "default_repetition_penalty_last_n")]
	pub repetition_penalty_last_n: usize,

	/// Whether banned sequences survive a sampling reset
	#[serde(default = "default_persist_banned_sequences")]
	pub persist_banned_sequences: bool,

	/// Seed for the sampling RNG. When unset the RNG is seeded from entropy.
	#[serde(default)]
	pub seed: Option<u64>,
}

impl Default for SamplerParameters {
	fn default() -> Self {
		Self {
			top_k: default_top_k(),
			top_p: default_top_p(),
			repeat_penalty: default_repeat_penalty(),
			frequency_penalty: default_frequency_penalty(),
			presence_penalty: default_presence_penalty(),
			temperature: default_temperature(),
			repetition_penalty_last_n: default_repetition_penalty_last_n(),
			persist_banned_sequences: default_persist_banned_sequences(),
			seed: None,
		}
	}
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SessionConfig {
	/// Controls batch/chunk size for prompt ingestion in [crate::context::EvaluationContext::submit].
	///
	/// This is the number of tokens that will be ingested at once. This is useful for
	/// trying to speed up the ingestion of prompts, as it allows for parallelization.
	/// However, you will be fundamentally limited by your machine's ability to evaluate
	/// the transformer model, so increasing the batch size will not always help.
	///
	/// A reasonable default value is 8.
	pub batch_size: usize,

	/// Sampling parameters for the session
	pub sampler: SamplerParameters,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			batch_size: default_batch_size(),
			sampler: SamplerParameters::default(),
		}
	}
}

const fn default_batch_size() -> usize {
	8
}

const fn default_top_k() -> usize {
	40
}

const fn default_top_p() -> f32 {
	0.95
}

const fn default_repeat_penalty() -> f32 {
	1.30
}

const fn default_frequency_penalty() -> f32 {
	0.0
}

const fn default_presence_penalty() -> f32 {
	0.0
}

const fn default_temperature() -> f32 {
	0.80
}

const fn default_repetition_penalty_last_n() -> usize {
	512
}

const fn default_persist_banned_sequences() -> bool {
	false
}
