use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::Engine;
use thiserror::Error;

/// Standard alphabet, padded, tolerant of non-zero trailing bits the way browsers' `atob` is.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Error)]
#[error("invalid base64url value {value:?}: {source}")]
pub struct DecodeError {
    value: String,
    #[source]
    source: base64::DecodeError,
}

/// Decodes unpadded URL-safe Base64 into raw bytes.
///
/// The padding is restored and the URL-safe characters are mapped back onto the standard
/// alphabet before decoding, so already padded input is accepted as well.
pub fn decode(base64url: &str) -> Result<Vec<u8>, DecodeError> {
    let padding = (4 - base64url.len() % 4) % 4;
    let mut base64 = String::with_capacity(base64url.len() + padding);
    for c in base64url.chars() {
        base64.push(match c {
            '-' => '+',
            '_' => '/',
            c => c,
        });
    }
    base64.extend(std::iter::repeat('=').take(padding));

    STANDARD_LENIENT
        .decode(base64.as_bytes())
        .map_err(|source| DecodeError {
            value: base64url.to_string(),
            source,
        })
}

/// Encodes raw bytes as unpadded URL-safe Base64.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `serde` adapter for binary fields that travel as Base64url text.
pub mod base64url {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode(&text).map_err(D::Error::custom)
    }
}
