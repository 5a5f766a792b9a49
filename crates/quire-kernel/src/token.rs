//! Opaque bearer tokens.
//!
//! A [`Token`] is 24 bytes: an 8-byte big-endian Unix timestamp followed by
//! 16 random bytes. Only its [`TokenHash`] (the same timestamp followed by
//! BLAKE2b-256 of the random part) is ever persisted. The embedded
//! timestamp gives every token and hash an age without a separate column.
//!
//! Transport form is lowercase hex with leading zeros trimmed; decoding
//! pads back to 48 characters.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

type Blake2b256 = Blake2b<U32>;

/// Raw token length in bytes.
pub const TOKEN_LEN: usize = 24;
/// Token hash length in bytes.
pub const HASH_LEN: usize = 40;
/// Encoded token length before zero trimming.
pub const ENCODED_LEN: usize = TOKEN_LEN * 2;

const TIMESTAMP_LEN: usize = 8;

/// Token parse errors.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token too long: {0} characters")]
    TooLong(usize),

    #[error("token is not hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("token hash must be {HASH_LEN} bytes, got {0}")]
    HashLength(usize),
}

/// Seconds since the Unix epoch, clamped at zero.
pub fn unix_seconds(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn read_timestamp(bytes: &[u8]) -> u64 {
    let mut ts = [0u8; TIMESTAMP_LEN];
    ts.copy_from_slice(&bytes[..TIMESTAMP_LEN]);
    u64::from_be_bytes(ts)
}

/// A bearer token. Held by the client, never stored server-side.
#[derive(Clone, PartialEq, Eq)]
pub struct Token([u8; TOKEN_LEN]);

impl Token {
    /// Generate a fresh token stamped with the current time.
    pub fn generate() -> (Token, TokenHash) {
        Self::generate_at(SystemTime::now())
    }

    /// Generate a token stamped with `now`.
    pub fn generate_at(now: SystemTime) -> (Token, TokenHash) {
        let mut random = [0u8; TOKEN_LEN - TIMESTAMP_LEN];
        OsRng.fill_bytes(&mut random);
        let token = Self::from_parts(unix_seconds(now), random);
        let hash = token.hash();
        (token, hash)
    }

    /// Assemble a token from its timestamp and random suffix.
    pub fn from_parts(timestamp: u64, random: [u8; TOKEN_LEN - TIMESTAMP_LEN]) -> Token {
        let mut bytes = [0u8; TOKEN_LEN];
        bytes[..TIMESTAMP_LEN].copy_from_slice(&timestamp.to_be_bytes());
        bytes[TIMESTAMP_LEN..].copy_from_slice(&random);
        Token(bytes)
    }

    /// Compute the persisted form. Pure function of the token bytes.
    pub fn hash(&self) -> TokenHash {
        let digest = Blake2b256::digest(&self.0[TIMESTAMP_LEN..]);
        let mut bytes = [0u8; HASH_LEN];
        bytes[..TIMESTAMP_LEN].copy_from_slice(&self.0[..TIMESTAMP_LEN]);
        bytes[TIMESTAMP_LEN..].copy_from_slice(&digest);
        TokenHash(bytes)
    }

    /// Hex-encode for transport, leading zeros trimmed.
    pub fn encode(&self) -> String {
        let hex = hex::encode(self.0);
        hex.trim_start_matches('0').to_string()
    }

    /// Parse the transport form produced by [`encode`](Token::encode).
    pub fn decode(s: &str) -> Result<Token, TokenError> {
        if s.len() > ENCODED_LEN {
            return Err(TokenError::TooLong(s.len()));
        }
        let padded = format!("{s:0>width$}", width = ENCODED_LEN);
        let mut bytes = [0u8; TOKEN_LEN];
        hex::decode_to_slice(padded, &mut bytes)?;
        Ok(Token(bytes))
    }

    /// Creation time, in seconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        read_timestamp(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(ts={}, ..)", self.timestamp())
    }
}

/// Persisted token form: timestamp ‖ BLAKE2b-256(random part).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; HASH_LEN]);

impl TokenHash {
    /// Rebuild from bytes read out of storage.
    pub fn from_bytes(bytes: &[u8]) -> Result<TokenHash, TokenError> {
        let bytes: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|_| TokenError::HashLength(bytes.len()))?;
        Ok(TokenHash(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Creation time of the originating token, in seconds since the epoch.
    pub fn timestamp(&self) -> u64 {
        read_timestamp(&self.0)
    }

    /// Age relative to `now`. Tokens stamped in the future have age zero.
    pub fn age_at(&self, now: SystemTime) -> Duration {
        Duration::from_secs(unix_seconds(now).saturating_sub(self.timestamp()))
    }

    /// Age relative to the current time.
    pub fn age(&self) -> Duration {
        self.age_at(SystemTime::now())
    }

    /// True once the age strictly exceeds `ttl`.
    pub fn is_expired_at(&self, now: SystemTime, ttl: Duration) -> bool {
        self.age_at(now) > ttl
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TokenHash(ts={}, {})",
            self.timestamp(),
            hex::encode(&self.0[TIMESTAMP_LEN..TIMESTAMP_LEN + 4])
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for _ in 0..64 {
            let (token, _) = Token::generate();
            let decoded = Token::decode(&token.encode()).unwrap();
            assert_eq!(decoded, token);
        }
    }

    #[test]
    fn test_leading_zeros_trimmed() {
        let token = Token::from_parts(0x0000_0000_6500_0000, [0xab; 16]);
        let encoded = token.encode();
        assert!(!encoded.starts_with('0'));
        assert_eq!(encoded.len(), 48 - 8);
        assert_eq!(Token::decode(&encoded).unwrap(), token);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let (token, hash) = Token::generate();
        assert_eq!(token.hash(), hash);
        assert_eq!(hash.timestamp(), token.timestamp());
        assert_eq!(&hash.as_bytes()[..8], &token.as_bytes()[..8]);
        // Random part is never stored verbatim.
        assert_ne!(&hash.as_bytes()[8..24], &token.as_bytes()[8..]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Token::decode(&"f".repeat(49)),
            Err(TokenError::TooLong(49))
        ));
        assert!(matches!(
            Token::decode("not-hex"),
            Err(TokenError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_ttl_boundary() {
        let ttl = Duration::from_secs(300);
        let now = SystemTime::now();

        let (_, old) = Token::generate_at(now - ttl - Duration::from_secs(1));
        assert!(old.is_expired_at(now, ttl));

        let (_, fresh) = Token::generate_at(now - ttl + Duration::from_secs(1));
        assert!(!fresh.is_expired_at(now, ttl));
    }

    #[test]
    fn test_future_token_has_zero_age() {
        let now = SystemTime::now();
        let (_, hash) = Token::generate_at(now + Duration::from_secs(60));
        assert_eq!(hash.age_at(now), Duration::ZERO);
    }

    #[test]
    fn test_hash_from_bytes() {
        let (_, hash) = Token::generate();
        assert_eq!(TokenHash::from_bytes(hash.as_bytes()).unwrap(), hash);
        assert!(matches!(
            TokenHash::from_bytes(&[0u8; 12]),
            Err(TokenError::HashLength(12))
        ));
    }
}
