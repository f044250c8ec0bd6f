mod state;
mod status;

pub use state::{Ceremony, CeremonyOutcome, CeremonyState};
pub use status::{ConsoleStatus, StatusLog};

use crate::error::CeremonyError;
use crate::http::api_client::JsonExchange;
use crate::webauthn::normalizer;
use crate::webauthn::platform::CredentialPlatform;
use anyhow::{anyhow, Result};
use log::debug;
use serde::Deserialize;
use serde_json::json;
use state::Trace;
use std::sync::Arc;
use url::Url;

const REGISTER_OPTIONS_PATH: &str = "webauthn/register/options";
const REGISTER_FINISH_PATH: &str = "webauthn/register/finish";
const AUTHENTICATE_OPTIONS_PATH: &str = "webauthn/authenticate/options";
const AUTHENTICATE_FINISH_PATH: &str = "webauthn/authenticate/finish";

/// What the relying party answers to a finished ceremony.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FinishResponse {
    credential_id: String,
}

/// Runs registration and authentication ceremonies against one relying party.
///
/// Each invocation is independent: options, credential and outcome are local to the call,
/// so several ceremonies may run at once on the same client.
pub struct CeremonyClient {
    relying_party: Url,
    exchange: Arc<dyn JsonExchange>,
    platform: Arc<dyn CredentialPlatform>,
    status: Arc<dyn StatusLog>,
}

impl CeremonyClient {
    pub fn new(
        relying_party: Url,
        exchange: Arc<dyn JsonExchange>,
        platform: Arc<dyn CredentialPlatform>,
        status: Arc<dyn StatusLog>,
    ) -> Result<Self> {
        if relying_party.cannot_be_a_base() {
            return Err(anyhow!("{} cannot be used as a base url", relying_party));
        }

        Ok(CeremonyClient {
            relying_party,
            exchange,
            platform,
            status,
        })
    }

    /// Registers a new passkey for `username`.
    pub async fn register(&self, username: &str, display_name: Option<&str>) -> CeremonyOutcome {
        let mut trace = Trace::new(Ceremony::Registration);
        let result = self.try_register(username, display_name, &mut trace).await;

        self.finish(trace, result)
    }

    /// Signs in as `username` with a passkey registered earlier.
    pub async fn authenticate(&self, username: &str) -> CeremonyOutcome {
        let mut trace = Trace::new(Ceremony::Authentication);
        let result = self.try_authenticate(username, &mut trace).await;

        self.finish(trace, result)
    }

    async fn try_register(
        &self,
        username: &str,
        display_name: Option<&str>,
        trace: &mut Trace,
    ) -> Result<String, CeremonyError> {
        let username = self.check_preconditions(username)?;
        let display_name = display_name.map(str::trim).filter(|name| !name.is_empty());

        self.status.log("Requesting registration options...");
        trace.enter(CeremonyState::OptionsRequested);
        let options = self
            .exchange
            .post_json(
                &self.endpoint(REGISTER_OPTIONS_PATH)?,
                &json!({
                    "username": username,
                    "displayName": display_name,
                }),
            )
            .await?
            .into_json()?;
        trace.enter(CeremonyState::OptionsReceived);

        let public_key = normalizer::normalize_creation_options(self.platform.as_ref(), &options)?;

        self.status.log("Creating credential on device...");
        trace.enter(CeremonyState::CredentialCreating);
        let credential = self
            .platform
            .create(public_key)
            .await?
            .ok_or(CeremonyError::NoCredentialCreated)?;
        trace.enter(CeremonyState::CredentialCreated);
        debug!("created credential {}", credential.id());

        self.status.log("Sending registration response...");
        let response = self
            .exchange
            .post_json(
                &self.endpoint(REGISTER_FINISH_PATH)?,
                &json!({
                    "username": username,
                    "credential": credential.to_json(),
                }),
            )
            .await?;
        trace.enter(CeremonyState::ResultSent);

        let response: FinishResponse = serde_json::from_value(response.into_json()?)?;
        Ok(response.credential_id)
    }

    async fn try_authenticate(
        &self,
        username: &str,
        trace: &mut Trace,
    ) -> Result<String, CeremonyError> {
        let username = self.check_preconditions(username)?;

        self.status.log("Requesting authentication options...");
        trace.enter(CeremonyState::OptionsRequested);
        let options = self
            .exchange
            .post_json(
                &self.endpoint(AUTHENTICATE_OPTIONS_PATH)?,
                &json!({ "username": username }),
            )
            .await?
            .into_json()?;
        trace.enter(CeremonyState::OptionsReceived);

        let public_key = normalizer::normalize_request_options(self.platform.as_ref(), &options)?;

        self.status.log("Requesting assertion from device...");
        trace.enter(CeremonyState::AssertionRequesting);
        let assertion = self
            .platform
            .get(public_key)
            .await?
            .ok_or(CeremonyError::NoAssertionReturned)?;
        trace.enter(CeremonyState::AssertionReceived);
        debug!("assertion signed by credential {}", assertion.id());

        self.status.log("Sending authentication response...");
        let response = self
            .exchange
            .post_json(
                &self.endpoint(AUTHENTICATE_FINISH_PATH)?,
                &json!({
                    "username": username,
                    "credential": assertion.to_json(),
                }),
            )
            .await?;
        trace.enter(CeremonyState::ResultSent);

        let response: FinishResponse = serde_json::from_value(response.into_json()?)?;
        Ok(response.credential_id)
    }

    /// Platform probe first, then a non-blank username.
    fn check_preconditions<'a>(&self, username: &'a str) -> Result<&'a str, CeremonyError> {
        if !self.platform.is_available() {
            return Err(CeremonyError::UnsupportedPlatform);
        }

        let username = username.trim();
        if username.is_empty() {
            return Err(CeremonyError::MissingInput("username"));
        }

        Ok(username)
    }

    fn finish(&self, trace: Trace, result: Result<String, CeremonyError>) -> CeremonyOutcome {
        let outcome = trace.finish(result);
        self.status.log(&outcome.status_message());

        outcome
    }

    fn endpoint(&self, path: &str) -> Result<String, CeremonyError> {
        let mut url = self.relying_party.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CeremonyError::Request(format!("{} cannot be a base url", self.relying_party))
            })?
            .pop_if_empty()
            .extend(path.split('/'));

        Ok(url.to_string())
    }
}
