use crate::webauthn::encoding;
use anyhow::{anyhow, Result};
use ciborium::value::Value;
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

/// Software authenticators have no attested model, so the AAGUID is all zeros.
pub(crate) const AAGUID: [u8; 16] = [0; 16];

const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;

/// <https://www.w3.org/TR/webauthn-3/#dictdef-collectedclientdata>
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct CollectedClientData {
    #[serde(rename = "type")]
    ceremony_type: &'static str,
    challenge: String,
    origin: String,
    cross_origin: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ClientDataType {
    Create,
    Get,
}

impl ClientDataType {
    fn as_str(&self) -> &'static str {
        match self {
            ClientDataType::Create => "webauthn.create",
            ClientDataType::Get => "webauthn.get",
        }
    }
}

/// Serialized `clientDataJSON` for a ceremony on `origin`.
pub(crate) fn client_data_json(
    ceremony_type: ClientDataType,
    challenge: &[u8],
    origin: &Url,
) -> Result<Vec<u8>> {
    let collected_client_data = CollectedClientData {
        ceremony_type: ceremony_type.as_str(),
        challenge: encoding::encode(challenge),
        origin: origin.origin().unicode_serialization(),
        cross_origin: false,
    };

    Ok(serde_json::to_vec(&collected_client_data)?)
}

/// authenticatorData for a new credential: UP and AT set, signCount 0, attested credential data.
pub(crate) fn registration_authenticator_data(
    rp_id: &str,
    credential_id: &[u8],
    public_key_x: &[u8],
    public_key_y: &[u8],
) -> Result<Vec<u8>> {
    let cose_key = encode_cose_key(public_key_x, public_key_y)?;
    let credential_id_length = u16::try_from(credential_id.len())
        .map_err(|_| anyhow!("credential id is too long"))?;

    let mut data = Vec::new();
    data.extend_from_slice(&Sha256::digest(rp_id.as_bytes()));
    data.push(FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL_DATA);
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&AAGUID);
    data.extend_from_slice(&credential_id_length.to_be_bytes());
    data.extend_from_slice(credential_id);
    data.extend_from_slice(&cose_key);

    Ok(data)
}

/// authenticatorData for an assertion: UP set, no attested credential data.
pub(crate) fn assertion_authenticator_data(rp_id: &str, sign_count: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&Sha256::digest(rp_id.as_bytes()));
    data.push(FLAG_USER_PRESENT);
    data.extend_from_slice(&sign_count.to_be_bytes());

    data
}

/// The bytes an assertion signs: `authenticatorData || SHA-256(clientDataJSON)`.
pub(crate) fn signed_data(authenticator_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let mut data = authenticator_data.to_vec();
    data.extend_from_slice(&Sha256::digest(client_data_json));

    data
}

/// P-256 public key as a COSE_Key map (kty=EC2, alg=ES256, crv=P-256, x, y).
pub(crate) fn encode_cose_key(x: &[u8], y: &[u8]) -> Result<Vec<u8>> {
    let map = Value::Map(vec![
        (Value::Integer(1i64.into()), Value::Integer(2i64.into())),
        (Value::Integer(3i64.into()), Value::Integer((-7i64).into())),
        (Value::Integer((-1i64).into()), Value::Integer(1i64.into())),
        (Value::Integer((-2i64).into()), Value::Bytes(x.to_vec())),
        (Value::Integer((-3i64).into()), Value::Bytes(y.to_vec())),
    ]);

    to_cbor(&map)
}

/// Attestation object using the `none` format.
pub(crate) fn none_attestation_object(authenticator_data: &[u8]) -> Result<Vec<u8>> {
    let map = Value::Map(vec![
        (Value::Text(String::from("fmt")), Value::Text(String::from("none"))),
        (Value::Text(String::from("attStmt")), Value::Map(vec![])),
        (
            Value::Text(String::from("authData")),
            Value::Bytes(authenticator_data.to_vec()),
        ),
    ]);

    to_cbor(&map)
}

fn to_cbor(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| anyhow!("CBOR encoding failed: {}", e))?;

    Ok(buf)
}
