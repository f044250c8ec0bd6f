//! A software passkey authenticator.
//!
//! Keys are P-256 (ES256), attestation is `none`, and the private keys live in a
//! [`CredentialVault`]. Every operation is gated on a [`UserPresence`] confirmation.

mod data;
mod presence;
mod vault;

pub use presence::{AutoApprove, ConsolePresence, UserPresence};
pub use vault::{CredentialRecord, CredentialVault, FileVault, KeyringVault};

use crate::error::CeremonyError;
use crate::webauthn::encoding;
use crate::webauthn::normalizer::{JsonOptionsParser, OptionsNormalizer};
use crate::webauthn::options::{
    PublicKeyCredentialCreationOptions, PublicKeyCredentialRequestOptions, ES256,
};
use crate::webauthn::platform::{CredentialPlatform, PlatformCredential};
use async_trait::async_trait;
use data::ClientDataType;
use log::{debug, info};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{DerSignature, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

const CREDENTIAL_ID_LENGTH: usize = 32;

/// Output of [`SoftAuthenticator`]: the credential id and its JSON export.
pub struct SoftCredential {
    id: String,
    json: Value,
}

impl PlatformCredential for SoftCredential {
    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn to_json(&self) -> Value {
        self.json.clone()
    }
}

pub struct SoftAuthenticator {
    origin: Url,
    vault: Box<dyn CredentialVault>,
    presence: Arc<dyn UserPresence>,
    // serializes read-modify-write cycles on the vault
    vault_lock: Mutex<()>,
}

impl SoftAuthenticator {
    pub fn new(
        origin: Url,
        vault: Box<dyn CredentialVault>,
        presence: Box<dyn UserPresence>,
    ) -> Self {
        SoftAuthenticator {
            origin,
            vault,
            presence: Arc::from(presence),
            vault_lock: Mutex::new(()),
        }
    }

    /// The relying party id to scope a credential to.
    ///
    /// Defaults to the origin's host and must be that host or a parent domain of it.
    fn rp_id(&self, requested: Option<&str>) -> Result<String, CeremonyError> {
        let host = self
            .origin
            .host_str()
            .ok_or_else(|| CeremonyError::Platform(format!("{} has no host", self.origin)))?;

        let rp_id = match requested {
            Some(rp_id) => rp_id,
            None => return Ok(host.to_string()),
        };

        // a bare top-level label is only acceptable as the origin host itself
        if host == rp_id || (rp_id.contains('.') && host.ends_with(&format!(".{}", rp_id))) {
            Ok(rp_id.to_string())
        } else {
            Err(CeremonyError::Platform(format!(
                "relying party id {} is not valid for origin {}",
                rp_id,
                self.origin.origin().unicode_serialization()
            )))
        }
    }

    fn load(&self) -> Result<Vec<CredentialRecord>, CeremonyError> {
        self.vault.load().map_err(platform_error)
    }

    fn store(&self, records: &[CredentialRecord]) -> Result<(), CeremonyError> {
        self.vault.store(records).map_err(platform_error)
    }

    /// Prompts on the blocking pool so a waiting user does not stall the runtime.
    async fn confirm(&self, prompt: String) -> Result<bool, CeremonyError> {
        let presence = Arc::clone(&self.presence);
        let question = prompt.clone();
        let confirmed = tokio::task::spawn_blocking(move || presence.confirm(&question))
            .await
            .map_err(|e| CeremonyError::Platform(format!("user presence prompt failed: {}", e)))?
            .map_err(platform_error)?;
        if !confirmed {
            info!("user declined: {}", prompt);
        }

        Ok(confirmed)
    }
}

#[async_trait]
impl CredentialPlatform for SoftAuthenticator {
    fn is_available(&self) -> bool {
        self.origin.host_str().is_some()
    }

    fn options_parser(&self) -> Option<&dyn OptionsNormalizer> {
        Some(&JsonOptionsParser)
    }

    async fn create(
        &self,
        options: PublicKeyCredentialCreationOptions,
    ) -> Result<Option<Box<dyn PlatformCredential>>, CeremonyError> {
        if !options.algorithms().contains(&ES256) {
            return Err(CeremonyError::Platform(String::from(
                "none of the requested algorithms is supported, only ES256 is",
            )));
        }
        let rp_id = self.rp_id(options.rp_id())?;

        let _guard = self.vault_lock.lock().await;
        let mut records = self.load()?;

        let excluded = records.iter().any(|record| {
            record.rp_id == rp_id
                && options
                    .exclude_credentials
                    .iter()
                    .any(|descriptor| descriptor.id == record.credential_id)
        });
        if excluded {
            return Err(CeremonyError::Platform(format!(
                "this authenticator already holds a passkey for this account on {}",
                rp_id
            )));
        }

        let user_name = options.user.name().unwrap_or("unknown user");
        if !self
            .confirm(format!("Create a passkey for {} on {}?", user_name, rp_id))
            .await?
        {
            return Ok(None);
        }

        let signing_key = SigningKey::random(&mut OsRng);
        let mut credential_id = vec![0u8; CREDENTIAL_ID_LENGTH];
        OsRng.fill_bytes(&mut credential_id);

        let public_key = signing_key.verifying_key().to_encoded_point(false);
        let (x, y) = public_key
            .x()
            .zip(public_key.y())
            .ok_or_else(|| CeremonyError::Platform(String::from("public key is not affine")))?;

        let client_data_json =
            data::client_data_json(ClientDataType::Create, &options.challenge, &self.origin)
                .map_err(platform_error)?;
        let authenticator_data =
            data::registration_authenticator_data(&rp_id, &credential_id, x, y)
                .map_err(platform_error)?;
        let attestation_object =
            data::none_attestation_object(&authenticator_data).map_err(platform_error)?;

        records.push(CredentialRecord {
            credential_id: credential_id.clone(),
            rp_id: rp_id.clone(),
            user_handle: options.user.id.clone(),
            user_name: options.user.name().map(String::from),
            private_key: signing_key.to_bytes().to_vec(),
            sign_count: 0,
        });
        self.store(&records)?;

        let id = encoding::encode(&credential_id);
        debug!("stored passkey {} for {}", id, rp_id);

        let json = json!({
            "id": id,
            "rawId": id,
            "type": "public-key",
            "authenticatorAttachment": "platform",
            "clientExtensionResults": {},
            "response": {
                "clientDataJSON": encoding::encode(&client_data_json),
                "attestationObject": encoding::encode(&attestation_object),
                "authenticatorData": encoding::encode(&authenticator_data),
                "transports": ["internal"],
                "publicKeyAlgorithm": ES256,
            },
        });

        Ok(Some(Box::new(SoftCredential { id, json })))
    }

    async fn get(
        &self,
        options: PublicKeyCredentialRequestOptions,
    ) -> Result<Option<Box<dyn PlatformCredential>>, CeremonyError> {
        let rp_id = self.rp_id(options.rp_id())?;

        let _guard = self.vault_lock.lock().await;
        let mut records = self.load()?;

        let position = records
            .iter()
            .position(|record| {
                record.rp_id == rp_id
                    && (options.allow_credentials.is_empty()
                        || options
                            .allow_credentials
                            .iter()
                            .any(|descriptor| descriptor.id == record.credential_id))
            })
            .ok_or_else(|| {
                CeremonyError::Platform(format!("no passkey for {} on this authenticator", rp_id))
            })?;

        let user_name = records[position]
            .user_name
            .clone()
            .unwrap_or_else(|| String::from("unknown user"));
        if !self
            .confirm(format!("Sign in to {} as {}?", rp_id, user_name))
            .await?
        {
            return Ok(None);
        }

        let record = &mut records[position];
        record.sign_count = record.sign_count.wrapping_add(1);

        let signing_key = SigningKey::from_slice(&record.private_key)
            .map_err(|e| CeremonyError::Platform(format!("stored key is unusable: {}", e)))?;
        let client_data_json =
            data::client_data_json(ClientDataType::Get, &options.challenge, &self.origin)
                .map_err(platform_error)?;
        let authenticator_data = data::assertion_authenticator_data(&rp_id, record.sign_count);
        let signature: DerSignature =
            signing_key.sign(&data::signed_data(&authenticator_data, &client_data_json));

        let id = encoding::encode(&record.credential_id);
        let json = json!({
            "id": id,
            "rawId": id,
            "type": "public-key",
            "authenticatorAttachment": "platform",
            "clientExtensionResults": {},
            "response": {
                "clientDataJSON": encoding::encode(&client_data_json),
                "authenticatorData": encoding::encode(&authenticator_data),
                "signature": encoding::encode(signature.as_bytes()),
                "userHandle": encoding::encode(&record.user_handle),
            },
        });

        self.store(&records)?;
        debug!("signed assertion with passkey {} for {}", id, rp_id);

        Ok(Some(Box::new(SoftCredential { id, json })))
    }
}

fn platform_error(e: anyhow::Error) -> CeremonyError {
    CeremonyError::Platform(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::normalizer::{normalize_creation_options, normalize_request_options};
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};
    use p256::EncodedPoint;
    use sha2::{Digest, Sha256};
    use std::sync::mpsc;
    use tempfile::TempDir;

    struct Decline;

    impl UserPresence for Decline {
        fn confirm(&self, _prompt: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    fn authenticator(dir: &TempDir, presence: Box<dyn UserPresence>) -> SoftAuthenticator {
        SoftAuthenticator::new(
            Url::parse("https://login.example.com").unwrap(),
            Box::new(FileVault::new(dir.path().join("credentials.toml"))),
            presence,
        )
    }

    fn creation_options(authenticator: &SoftAuthenticator) -> PublicKeyCredentialCreationOptions {
        normalize_creation_options(
            authenticator,
            &json!({
                "rp": { "id": "example.com", "name": "Example" },
                "user": { "id": "dXNlcg", "name": "alice", "displayName": "Alice" },
                "challenge": "Y2hhbGxlbmdl",
                "pubKeyCredParams": [
                    { "type": "public-key", "alg": -7 },
                    { "type": "public-key", "alg": -257 }
                ],
                "excludeCredentials": []
            }),
        )
        .unwrap()
    }

    fn request_options(
        authenticator: &SoftAuthenticator,
        allow: Option<&str>,
    ) -> PublicKeyCredentialRequestOptions {
        let allow_credentials = allow.map(|id| json!([{ "type": "public-key", "id": id }]));

        normalize_request_options(
            authenticator,
            &json!({
                "challenge": "c2lnbg",
                "rpId": "example.com",
                "allowCredentials": allow_credentials,
                "userVerification": "preferred"
            }),
        )
        .unwrap()
    }

    fn decode_field(json: &Value, field: &str) -> Vec<u8> {
        encoding::decode(json["response"][field].as_str().unwrap()).unwrap()
    }

    /// Pulls the COSE public key back out of a registration export.
    fn verifying_key(registration: &Value) -> VerifyingKey {
        let authenticator_data = decode_field(registration, "authenticatorData");
        let id_length = u16::from_be_bytes([authenticator_data[53], authenticator_data[54]]);
        let cose_offset = 55 + id_length as usize;
        let cose: ciborium::value::Value =
            ciborium::from_reader(&authenticator_data[cose_offset..]).unwrap();

        let coordinate = |label: i64| -> Vec<u8> {
            cose.as_map()
                .unwrap()
                .iter()
                .find(|(key, _)| *key == ciborium::value::Value::Integer(label.into()))
                .and_then(|(_, value)| value.as_bytes().cloned())
                .unwrap()
        };
        let x = coordinate(-2);
        let y = coordinate(-3);
        let point = EncodedPoint::from_affine_coordinates(
            x.as_slice().into(),
            y.as_slice().into(),
            false,
        );

        VerifyingKey::from_encoded_point(&point).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_sign() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = authenticator(&dir, Box::new(AutoApprove));

        let credential = authenticator
            .create(creation_options(&authenticator))
            .await
            .unwrap()
            .unwrap();
        let registration = credential.to_json();

        assert_eq!(registration["id"], json!(credential.id()));
        assert_eq!(registration["type"], json!("public-key"));
        let client_data: Value =
            serde_json::from_slice(&decode_field(&registration, "clientDataJSON")).unwrap();
        assert_eq!(client_data["type"], json!("webauthn.create"));
        assert_eq!(client_data["challenge"], json!("Y2hhbGxlbmdl"));
        assert_eq!(client_data["origin"], json!("https://login.example.com"));
        let authenticator_data = decode_field(&registration, "authenticatorData");
        assert_eq!(
            &authenticator_data[0..32],
            Sha256::digest(b"example.com").as_slice()
        );

        let assertion = authenticator
            .get(request_options(&authenticator, Some(credential.id())))
            .await
            .unwrap()
            .unwrap();
        let assertion = assertion.to_json();

        let client_data_json = decode_field(&assertion, "clientDataJSON");
        let authenticator_data = decode_field(&assertion, "authenticatorData");
        let signature = Signature::from_der(&decode_field(&assertion, "signature")).unwrap();
        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&Sha256::digest(&client_data_json));

        assert!(verifying_key(&registration).verify(&signed, &signature).is_ok());
        assert_eq!(&authenticator_data[33..37], &[0, 0, 0, 1]);
        assert_eq!(decode_field(&assertion, "userHandle"), b"user".to_vec());
    }

    #[tokio::test]
    async fn test_sign_count_increments() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = authenticator(&dir, Box::new(AutoApprove));
        authenticator
            .create(creation_options(&authenticator))
            .await
            .unwrap();

        for expected in 1..=2u32 {
            let assertion = authenticator
                .get(request_options(&authenticator, None))
                .await
                .unwrap()
                .unwrap()
                .to_json();
            let authenticator_data = decode_field(&assertion, "authenticatorData");

            assert_eq!(&authenticator_data[33..37], &expected.to_be_bytes());
        }
    }

    #[tokio::test]
    async fn test_excluded_credential_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = authenticator(&dir, Box::new(AutoApprove));
        let credential = authenticator
            .create(creation_options(&authenticator))
            .await
            .unwrap()
            .unwrap();

        let mut options = creation_options(&authenticator);
        options.exclude_credentials = request_options(&authenticator, Some(credential.id()))
            .allow_credentials;
        let result = authenticator.create(options).await;

        assert!(matches!(result, Err(CeremonyError::Platform(_))));
    }

    #[tokio::test]
    async fn test_declined_prompt_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = authenticator(&dir, Box::new(Decline));

        let created = authenticator
            .create(creation_options(&authenticator))
            .await
            .unwrap();

        assert!(created.is_none());
        assert!(FileVault::new(dir.path().join("credentials.toml"))
            .load()
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_credential_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = authenticator(&dir, Box::new(AutoApprove));

        let result = authenticator
            .get(request_options(&authenticator, Some("AQID")))
            .await;

        assert!(matches!(result, Err(CeremonyError::Platform(_))));
    }

    #[tokio::test]
    async fn test_unsupported_algorithm_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = authenticator(&dir, Box::new(AutoApprove));
        let mut options = creation_options(&authenticator);
        options
            .extra
            .insert(String::from("pubKeyCredParams"), json!([{ "type": "public-key", "alg": -257 }]));

        let result = authenticator.create(options).await;

        assert!(matches!(result, Err(CeremonyError::Platform(_))));
    }

    #[test]
    fn test_rp_id_must_match_origin() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = authenticator(&dir, Box::new(AutoApprove));

        assert_eq!(authenticator.rp_id(None).unwrap(), "login.example.com");
        assert_eq!(authenticator.rp_id(Some("example.com")).unwrap(), "example.com");
        assert!(authenticator.rp_id(Some("ample.com")).is_err());
        assert!(authenticator.rp_id(Some("com")).is_err());
        assert!(authenticator.rp_id(Some("other.org")).is_err());
    }

    #[test]
    fn test_single_label_rp_id_matches_only_itself() {
        let dir = tempfile::tempdir().unwrap();
        let authenticator = SoftAuthenticator::new(
            Url::parse("http://localhost:8080").unwrap(),
            Box::new(FileVault::new(dir.path().join("credentials.toml"))),
            Box::new(AutoApprove),
        );

        assert_eq!(authenticator.rp_id(Some("localhost")).unwrap(), "localhost");
        assert!(authenticator.rp_id(Some("host")).is_err());
    }

    struct WaitForSignal(std::sync::Mutex<mpsc::Receiver<()>>);

    impl UserPresence for WaitForSignal {
        fn confirm(&self, _prompt: &str) -> anyhow::Result<bool> {
            self.0.lock().unwrap().recv()?;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_prompt_does_not_block_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let (sender, receiver) = mpsc::channel();
        let authenticator = authenticator(
            &dir,
            Box::new(WaitForSignal(std::sync::Mutex::new(receiver))),
        );
        let options = creation_options(&authenticator);

        // the single runtime thread must stay free to send the answer
        let (created, _) = tokio::join!(authenticator.create(options), async move {
            tokio::task::yield_now().await;
            sender.send(()).unwrap();
        });

        assert!(created.unwrap().is_some());
    }
}
