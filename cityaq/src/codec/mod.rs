//! Binary encoding for cached payloads.
//!
//! Every cache entry is framed so it can be recognised without knowing which
//! store it came from:
//!
//! ```text
//! +--------+---------+------------------+
//! | magic  | version | bincode payload  |
//! | 4 bytes| u16 LE  | ...              |
//! +--------+---------+------------------+
//! ```
//!
//! Types opt in by implementing [`CacheCodec`]; the framing and the
//! invariant check on decode come for free.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Length of the frame header (magic + version).
pub const HEADER_LEN: usize = 6;

/// Errors raised while encoding or decoding cached payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload too short: {0} bytes")]
    Truncated(usize),

    #[error("unexpected magic {found:?}, expected {expected:?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },

    #[error("unsupported format version {found} (expected {expected})")]
    UnsupportedVersion { expected: u16, found: u16 },

    #[error("serialization failed: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// A value that can be stored in a [`RequestCache`](crate::cache::RequestCache).
pub trait CacheCodec: Serialize + DeserializeOwned {
    /// Identifies the payload type.
    const MAGIC: [u8; 4];

    /// Bumped whenever the serialized shape changes.
    const VERSION: u16;

    /// Checks structural invariants. Called before encoding and after
    /// decoding.
    fn validate(&self) -> Result<(), CodecError> {
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        self.validate()?;
        let mut out = Vec::with_capacity(HEADER_LEN + 64);
        out.extend_from_slice(&Self::MAGIC);
        out.extend_from_slice(&Self::VERSION.to_le_bytes());
        bincode::serialize_into(&mut out, self)?;
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated(bytes.len()));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        if magic != Self::MAGIC {
            return Err(CodecError::BadMagic {
                expected: Self::MAGIC,
                found: magic,
            });
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != Self::VERSION {
            return Err(CodecError::UnsupportedVersion {
                expected: Self::VERSION,
                found: version,
            });
        }
        let value: Self = bincode::deserialize(&bytes[HEADER_LEN..])?;
        value.validate()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pair {
        a: Vec<f64>,
        b: Vec<f64>,
    }

    impl CacheCodec for Pair {
        const MAGIC: [u8; 4] = *b"TEST";
        const VERSION: u16 = 3;

        fn validate(&self) -> Result<(), CodecError> {
            if self.a.len() != self.b.len() {
                return Err(CodecError::Invalid("length mismatch".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = Pair { a: vec![1.0], b: vec![2.0] }.encode().unwrap();
        assert_eq!(&bytes[..4], b"TEST");
        assert_eq!(&bytes[4..6], &[3, 0]);
    }

    #[test]
    fn test_roundtrip() {
        let p = Pair { a: vec![1.0, 2.5], b: vec![-3.0, 0.0] };
        assert_eq!(Pair::decode(&p.encode().unwrap()).unwrap(), p);
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(Pair::decode(b"TES"), Err(CodecError::Truncated(3))));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = Pair { a: vec![], b: vec![] }.encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(Pair::decode(&bytes), Err(CodecError::BadMagic { .. })));
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = Pair { a: vec![], b: vec![] }.encode().unwrap();
        bytes[4] = 9;
        assert!(matches!(
            Pair::decode(&bytes),
            Err(CodecError::UnsupportedVersion { expected: 3, found: 9 })
        ));
    }

    #[test]
    fn test_invariant_checked_on_encode() {
        let p = Pair { a: vec![1.0], b: vec![] };
        assert!(matches!(p.encode(), Err(CodecError::Invalid(_))));
    }

    #[test]
    fn test_garbage_payload() {
        let mut bytes = b"TEST".to_vec();
        bytes.extend_from_slice(&3u16.to_le_bytes());
        bytes.extend_from_slice(&[0xFF; 3]);
        assert!(matches!(Pair::decode(&bytes), Err(CodecError::Bincode(_))));
    }
}
