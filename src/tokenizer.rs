use crate::model::{InferenceEngine, TokenId};

/// Decode a single token to text. Returns the decoded string when the token's bytes form complete valid UTF-8, and an
/// empty string for control tokens or partial multi-byte fragments. Fragments that are split over multiple tokens are
/// reassembled by [TokenOutputBuffer].
pub fn token_to_fragment(engine: &dyn InferenceEngine, token: TokenId) -> String {
	match String::from_utf8(engine.token_bytes(token)) {
		Ok(text) => text,
		Err(_) => String::new(),
	}
}

/// Buffers raw token bytes until they form valid UTF-8. A single token may decode to a partial multi-byte sequence;
/// pushing the next token's bytes completes it.
#[derive(Debug, Default)]
pub struct TokenOutputBuffer {
	bytes: Vec<u8>,
}

impl TokenOutputBuffer {
	pub fn new() -> TokenOutputBuffer {
		TokenOutputBuffer { bytes: vec![] }
	}

	/// Append the bytes of one token. Returns the longest newly completed UTF-8 prefix of the buffered bytes, or None
	/// when nothing printable completed.
	pub fn push(&mut self, token_bytes: &[u8]) -> Option<String> {
		self.bytes.extend_from_slice(token_bytes);

		let valid_len = match std::str::from_utf8(&self.bytes) {
			Ok(_) => self.bytes.len(),
			Err(e) => e.valid_up_to(),
		};
		if valid_len == 0 {
			return None;
		}

		// Lossless: the prefix was just validated
		let text = String::from_utf8_lossy(&self.bytes[..valid_len]).into_owned();
		self.bytes.drain(..valid_len);
		if text.is_empty() {
			None
		} else {
			Some(text)
		}
	}

	/// Discard any incomplete trailing bytes
	pub fn clear(&mut self) {
		self.bytes.clear();
	}

	pub fn is_empty(&self) -> bool {
		self.bytes.is_empty()
	}
}

#[cfg(test)]
mod test {
	use super::TokenOutputBuffer;

	#[test]
	fn test_ascii_passthrough() {
		let mut buffer = TokenOutputBuffer::new();
		assert_eq!(buffer.push(b"hello"), Some("hello".to_string()));
		assert_eq!(buffer.push(b" world"), Some(" world".to_string()));
		assert!(buffer.is_empty());
	}

	#[test]
	fn test_split_multibyte() {
		// "€" is 0xE2 0x82 0xAC; feed it split over two tokens
		let mut buffer = TokenOutputBuffer::new();
		assert_eq!(buffer.push(&[0xE2, 0x82]), None);
		assert!(!buffer.is_empty());
		assert_eq!(buffer.push(&[0xAC]), Some("€".to_string()));
		assert!(buffer.is_empty());
	}

	#[test]
	fn test_valid_prefix_before_partial_tail() {
		// 'a' completes immediately even though the euro sign is still missing a byte
		let mut buffer = TokenOutputBuffer::new();
		assert_eq!(buffer.push(&[b'a', 0xE2, 0x82]), Some("a".to_string()));
		assert_eq!(buffer.push(&[0xAC, b'b']), Some("€b".to_string()));
	}

	#[test]
	fn test_empty_and_clear() {
		let mut buffer = TokenOutputBuffer::new();
		assert_eq!(buffer.push(b""), None);
		assert_eq!(buffer.push(&[0xE2]), None);
		buffer.clear();
		assert_eq!(buffer.push(&[0x82, 0xAC]), None); // orphaned continuation bytes never become valid
	}
}
