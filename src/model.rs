use thiserror::Error;

/// Identifier of a token in the model vocabulary
pub type TokenId = u32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
	#[error("text cannot be represented by the vocabulary: {0}")]
	Unrepresentable(String),

	#[error("special token markup is malformed: {0}")]
	MalformedSpecial(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("engine decode failed: {0}")]
pub struct DecodeError(pub String);

/// The contract this crate requires from an inference engine. The engine owns the model weights and the compute
/// backend; a session owns the engine's mutable inference state through a boxed instance of this trait. Dropping the
/// box releases engine-side resources. Engines must be `Send` so a session can move between threads behind external
/// mutual exclusion; nothing here is internally synchronized.
pub trait InferenceEngine: Send {
	/// Number of entries in the model vocabulary. [InferenceEngine::logits] has exactly this length.
	fn vocabulary_size(&self) -> usize;

	/// Beginning-of-sequence token, for models that use one
	fn bot_token(&self) -> Option<TokenId>;

	/// End-of-text token
	fn eot_token(&self) -> TokenId;

	/// Maximum number of tokens the context can hold
	fn context_size(&self) -> usize;

	/// Convert text to a token sequence. `add_special` inserts beginning/end-of-sequence markers where the model
	/// expects them; `parse_special` makes in-band special token markup in `text` tokenize to the special tokens
	/// rather than to their literal text.
	fn tokenize(&self, text: &str, add_special: bool, parse_special: bool) -> Result<Vec<TokenId>, EncodingError>;

	/// Raw bytes for a single token. May be a partial UTF-8 sequence; empty for tokens without a printable
	/// representation (e.g. control tokens).
	fn token_bytes(&self, token: TokenId) -> Vec<u8>;

	/// Advance the model state by one batch of tokens. After a successful call the logits for the last position in
	/// the batch can be read through [InferenceEngine::logits].
	fn decode(&mut self, tokens: &[TokenId]) -> Result<(), DecodeError>;

	/// Logits for the last decoded position
	fn logits(&self) -> &[f32];

	/// Discard the attention/recurrent cache and the position cursor, returning the context to empty. Engine
	/// resources stay allocated.
	fn clear_cache(&mut self);
}
