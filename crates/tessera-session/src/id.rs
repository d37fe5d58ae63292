//! Session identifiers.
//!
//! An id is 32 bytes from the operating system CSPRNG, encoded with the
//! RFC 4648 base-32 alphabet without padding. The encoded form always has
//! [`ENCODED_LEN`] characters, so the length can be checked before decoding.
//!
//! Decoding ignores the unused low bits of the final character, so an id
//! whose last symbol carries non-zero padding bits is still accepted.

use data_encoding::{Encoding, BASE32_NOPAD};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tessera_core::{FormatError, GenerationError};

/// Number of random bytes in a session id.
pub const ID_BYTES: usize = 32;

/// Number of characters in an encoded session id.
pub const ENCODED_LEN: usize = 52;

/// A validated session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Draws a fresh random id.
    pub fn generate() -> Result<Self, GenerationError> {
        generate()
    }

    /// Validates externally supplied text and wraps it.
    pub fn parse(s: &str) -> Result<Self, FormatError> {
        validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// The encoded id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = FormatError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate(&s)?;
        Ok(Self(s))
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Draws [`ID_BYTES`] bytes from the OS entropy source and encodes them.
pub fn generate() -> Result<SessionId, GenerationError> {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(SessionId(BASE32_NOPAD.encode(&bytes)))
}

/// Checks both the encoded length and the alphabet.
pub fn validate(s: &str) -> Result<(), FormatError> {
    check_length(s)?;
    check_encoding(s)
}

/// Checks the encoded length without decoding.
pub fn check_length(s: &str) -> Result<(), FormatError> {
    if s.len() != ENCODED_LEN {
        return Err(FormatError::WrongLength {
            expected: ENCODED_LEN,
            actual: s.len(),
        });
    }
    Ok(())
}

/// Unpadded base-32 that tolerates non-zero trailing bits.
fn lenient_base32() -> &'static Encoding {
    static LENIENT: OnceLock<Encoding> = OnceLock::new();
    LENIENT.get_or_init(|| {
        let mut spec = BASE32_NOPAD.specification();
        spec.check_trailing_bits = false;
        spec.encoding().unwrap_or_else(|_| BASE32_NOPAD.clone())
    })
}

/// Checks that the text decodes under the unpadded base-32 alphabet.
pub fn check_encoding(s: &str) -> Result<(), FormatError> {
    lenient_base32()
        .decode(s.as_bytes())
        .map(drop)
        .map_err(FormatError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_GOOD: &str = "A7TF7SGM5WZRW7WMGY7BRJPQOGWGXATZWT35HXPKHRO3DU2J3L4Q";

    #[test]
    fn encoded_len_matches_id_bytes() {
        assert_eq!(BASE32_NOPAD.encode_len(ID_BYTES), ENCODED_LEN);
    }

    #[test]
    fn generated_ids_validate() {
        for _ in 0..64 {
            let id = generate().unwrap();
            assert_eq!(id.as_str().len(), ENCODED_LEN);
            validate(id.as_str()).unwrap();
        }
    }

    #[test]
    fn generated_ids_differ() {
        let a = generate().unwrap();
        let b = generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn known_good_id_validates() {
        validate(KNOWN_GOOD).unwrap();
        assert_eq!(SessionId::parse(KNOWN_GOOD).unwrap().as_str(), KNOWN_GOOD);
    }

    #[test]
    fn wrong_lengths_are_rejected() {
        let longer = format!("{KNOWN_GOOD}A");
        let cases = [&KNOWN_GOOD[..ENCODED_LEN - 1], "A", "", longer.as_str()];
        for case in cases {
            let err = validate(case).unwrap_err();
            match err {
                FormatError::WrongLength { expected, actual } => {
                    assert_eq!(expected, ENCODED_LEN);
                    assert_eq!(actual, case.len());
                }
                other => panic!("expected WrongLength for {case:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn foreign_alphabet_is_rejected() {
        let bad = format!("!{}", &KNOWN_GOOD[1..]);
        assert!(check_length(&bad).is_ok());
        assert!(matches!(
            validate(&bad).unwrap_err(),
            FormatError::InvalidEncoding(_)
        ));

        // Lowercase and the digits 0, 1, 8, 9 are outside the alphabet.
        let lower = KNOWN_GOOD.to_lowercase();
        assert!(matches!(
            check_encoding(&lower).unwrap_err(),
            FormatError::InvalidEncoding(_)
        ));
        let digit = format!("{}1", &KNOWN_GOOD[..ENCODED_LEN - 1]);
        assert!(validate(&digit).is_err());
    }

    #[test]
    fn trailing_bits_are_ignored() {
        // 'Q' leaves the four unused bits clear, 'R' sets the lowest one.
        let dirty = format!("{}R", &KNOWN_GOOD[..ENCODED_LEN - 1]);
        assert!(BASE32_NOPAD.decode(dirty.as_bytes()).is_err());
        validate(&dirty).unwrap();
        assert_eq!(
            lenient_base32().decode(dirty.as_bytes()).unwrap(),
            BASE32_NOPAD.decode(KNOWN_GOOD.as_bytes()).unwrap()
        );
    }

    #[test]
    fn deserialize_validates() {
        let ok: SessionId = serde_json::from_str(&format!("\"{KNOWN_GOOD}\"")).unwrap();
        assert_eq!(ok.as_str(), KNOWN_GOOD);
        assert!(serde_json::from_str::<SessionId>("\"nonexistent-id\"").is_err());
    }
}
