use crate::error::CeremonyError;
use crate::webauthn::normalizer::OptionsNormalizer;
use crate::webauthn::options::{
    PublicKeyCredentialCreationOptions, PublicKeyCredentialRequestOptions,
};
use async_trait::async_trait;
use serde_json::Value;

/// A credential or assertion produced by the platform.
///
/// Opaque to the ceremony: only the transport export is ever read.
pub trait PlatformCredential: Send + Sync {
    /// Base64url credential id.
    fn id(&self) -> &str;

    /// `RegistrationResponseJSON` or `AuthenticationResponseJSON`.
    fn to_json(&self) -> Value;
}

/// The host's credential subsystem.
///
/// `create` and `get` resolve to `Ok(None)` when the user dismisses the prompt; a refusal by
/// the platform itself is an error.
#[async_trait]
pub trait CredentialPlatform: Send + Sync {
    /// Feature probe gating both ceremonies.
    fn is_available(&self) -> bool;

    /// A parser the platform ships for the JSON option shapes, if it has one.
    fn options_parser(&self) -> Option<&dyn OptionsNormalizer> {
        None
    }

    async fn create(
        &self,
        options: PublicKeyCredentialCreationOptions,
    ) -> Result<Option<Box<dyn PlatformCredential>>, CeremonyError>;

    async fn get(
        &self,
        options: PublicKeyCredentialRequestOptions,
    ) -> Result<Option<Box<dyn PlatformCredential>>, CeremonyError>;
}
