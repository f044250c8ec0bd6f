use crate::webauthn::encoding::base64url;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// COSE algorithm identifier for ECDSA w/ SHA-256 on P-256.
pub const ES256: i64 = -7;

/// An optional wire field whose null and absent states mean different things.
///
/// Use with `#[serde(default, skip_serializing_if = "Field::is_absent")]` so that a missing
/// key deserializes to [`Field::Absent`] and is never written back out.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Absent,
    Null,
    Present(T),
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Present(value) => Some(value),
            Field::Absent | Field::Null => None,
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Field::Present(value),
            None => Field::Null,
        })
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Present(value) => value.serialize(serializer),
            Field::Absent | Field::Null => serializer.serialize_none(),
        }
    }
}

/// <https://www.w3.org/TR/webauthn-3/#dictdef-publickeycredentialdescriptor>
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
    /// `type`, `transports` and anything else the relying party sent along.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// <https://www.w3.org/TR/webauthn-3/#dictdef-publickeycredentialuserentity>
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublicKeyCredentialUserEntity {
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PublicKeyCredentialUserEntity {
    pub fn name(&self) -> Option<&str> {
        self.extra.get("name").and_then(Value::as_str)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.extra.get("displayName").and_then(Value::as_str)
    }
}

/// Creation options in the binary-native shape handed to the platform.
///
/// <https://www.w3.org/TR/webauthn-3/#dictdef-publickeycredentialcreationoptions>
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    #[serde(with = "base64url")]
    pub challenge: Vec<u8>,
    pub user: PublicKeyCredentialUserEntity,
    #[serde(default)]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    /// `rp`, `pubKeyCredParams`, `timeout`, `authenticatorSelection`, `attestation`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PublicKeyCredentialCreationOptions {
    pub fn rp_id(&self) -> Option<&str> {
        self.extra.get("rp")?.get("id")?.as_str()
    }

    /// COSE algorithm identifiers offered in `pubKeyCredParams`, in preference order.
    pub fn algorithms(&self) -> Vec<i64> {
        self.extra
            .get("pubKeyCredParams")
            .and_then(Value::as_array)
            .map(|params| {
                params
                    .iter()
                    .filter_map(|param| param.get("alg").and_then(Value::as_i64))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Request options in the binary-native shape handed to the platform.
///
/// <https://www.w3.org/TR/webauthn-3/#dictdef-publickeycredentialrequestoptions>
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKeyCredentialRequestOptions {
    pub challenge: Vec<u8>,
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub hints: Option<Vec<String>>,
    /// `rpId`, `timeout`, `userVerification`, ...
    pub extra: Map<String, Value>,
}

impl PublicKeyCredentialRequestOptions {
    pub fn rp_id(&self) -> Option<&str> {
        self.extra.get("rpId").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize, Serialize)]
    struct Probe {
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        hints: Field<Vec<String>>,
    }

    #[test]
    fn test_field_states() {
        let absent: Probe = serde_json::from_value(json!({})).unwrap();
        let null: Probe = serde_json::from_value(json!({ "hints": null })).unwrap();
        let present: Probe = serde_json::from_value(json!({ "hints": ["security-key"] })).unwrap();

        assert!(absent.hints.is_absent());
        assert!(null.hints.is_null());
        assert_eq!(
            present.hints,
            Field::Present(vec![String::from("security-key")])
        );
    }

    #[test]
    fn test_absent_field_is_not_serialized() {
        let probe = Probe {
            hints: Field::Absent,
        };

        assert_eq!(serde_json::to_value(&probe).unwrap(), json!({}));
    }

    #[test]
    fn test_creation_accessors() {
        let options: PublicKeyCredentialCreationOptions = serde_json::from_value(json!({
            "challenge": "AAAA",
            "rp": { "id": "example.com", "name": "Example" },
            "user": { "id": "AQ", "name": "alice", "displayName": "Alice" },
            "pubKeyCredParams": [
                { "type": "public-key", "alg": -7 },
                { "type": "public-key", "alg": -257 }
            ]
        }))
        .unwrap();

        assert_eq!(options.rp_id(), Some("example.com"));
        assert_eq!(options.algorithms(), vec![ES256, -257]);
        assert_eq!(options.user.name(), Some("alice"));
        assert_eq!(options.user.display_name(), Some("Alice"));
        assert!(options.exclude_credentials.is_empty());
    }
}
