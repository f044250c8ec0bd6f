use crate::error::CeremonyError;
use crate::webauthn::encoding;
use crate::webauthn::encoding::base64url;
use crate::webauthn::options::{
    Field, PublicKeyCredentialCreationOptions, PublicKeyCredentialDescriptor,
    PublicKeyCredentialRequestOptions, PublicKeyCredentialUserEntity,
};
use crate::webauthn::platform::CredentialPlatform;
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Optional request option keys the platform rejects when present but null.
const NULLABLE_REQUEST_KEYS: [&str; 2] = ["allowCredentials", "hints"];

/// Turns server-issued JSON options into the binary-native shape the platform consumes.
pub trait OptionsNormalizer: Send + Sync {
    fn creation_options(
        &self,
        options: &Value,
    ) -> Result<PublicKeyCredentialCreationOptions, CeremonyError>;

    fn request_options(
        &self,
        options: &Value,
    ) -> Result<PublicKeyCredentialRequestOptions, CeremonyError>;
}

/// Picks the platform's own parser when it ships one, the manual decoder otherwise.
pub fn select(platform: &dyn CredentialPlatform) -> &dyn OptionsNormalizer {
    match platform.options_parser() {
        Some(parser) => {
            debug!("using the platform options parser");
            parser
        }
        None => {
            debug!("platform has no options parser, decoding manually");
            &ManualDecoder
        }
    }
}

pub fn normalize_creation_options(
    platform: &dyn CredentialPlatform,
    options: &Value,
) -> Result<PublicKeyCredentialCreationOptions, CeremonyError> {
    select(platform).creation_options(options)
}

/// Sanitizes the options before handing them to whichever strategy is selected.
pub fn normalize_request_options(
    platform: &dyn CredentialPlatform,
    options: &Value,
) -> Result<PublicKeyCredentialRequestOptions, CeremonyError> {
    let sanitized = sanitize_request_options(options)?;
    select(platform).request_options(&sanitized)
}

/// Shallow copy of the request options with null `allowCredentials` and `hints` removed.
///
/// The keys are deleted rather than forwarded as null.
pub fn sanitize_request_options(options: &Value) -> Result<Value, CeremonyError> {
    let mut sanitized = object(options, "request options")?;
    for key in NULLABLE_REQUEST_KEYS {
        if sanitized.get(key).is_some_and(Value::is_null) {
            sanitized.remove(key);
        }
    }

    Ok(Value::Object(sanitized))
}

/// Field-by-field Base64url decoding, for platforms without their own parser.
pub struct ManualDecoder;

impl OptionsNormalizer for ManualDecoder {
    fn creation_options(
        &self,
        options: &Value,
    ) -> Result<PublicKeyCredentialCreationOptions, CeremonyError> {
        let mut options = object(options, "creation options")?;

        let challenge = take_binary(&mut options, "challenge")?;

        let user = options
            .remove("user")
            .ok_or_else(|| CeremonyError::InvalidOptions(String::from("missing user")))?;
        let mut user = object(&user, "user")?;
        let user_id = take_binary(&mut user, "id")?;

        let exclude_credentials = descriptors(options.remove("excludeCredentials"))?;

        Ok(PublicKeyCredentialCreationOptions {
            challenge,
            user: PublicKeyCredentialUserEntity {
                id: user_id,
                extra: user,
            },
            exclude_credentials,
            extra: options,
        })
    }

    fn request_options(
        &self,
        options: &Value,
    ) -> Result<PublicKeyCredentialRequestOptions, CeremonyError> {
        let sanitized = sanitize_request_options(options)?;
        let mut options = object(&sanitized, "request options")?;

        let challenge = take_binary(&mut options, "challenge")?;
        let allow_credentials = descriptors(options.remove("allowCredentials"))?;
        let hints = match options.remove("hints") {
            Some(hints) => Some(serde_json::from_value(hints)?),
            None => None,
        };

        Ok(PublicKeyCredentialRequestOptions {
            challenge,
            allow_credentials,
            hints,
            extra: options,
        })
    }
}

/// A parser built on the option types' own `Deserialize` impls.
///
/// Platforms that carry one expose it through [`CredentialPlatform::options_parser`]. Like a
/// browser's `parseRequestOptionsFromJSON` it refuses null for the optional sequences.
pub struct JsonOptionsParser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestOptionsJson {
    #[serde(with = "base64url")]
    challenge: Vec<u8>,
    #[serde(default)]
    allow_credentials: Field<Vec<PublicKeyCredentialDescriptor>>,
    #[serde(default)]
    hints: Field<Vec<String>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl OptionsNormalizer for JsonOptionsParser {
    fn creation_options(
        &self,
        options: &Value,
    ) -> Result<PublicKeyCredentialCreationOptions, CeremonyError> {
        serde_json::from_value(options.clone())
            .map_err(|e| CeremonyError::InvalidOptions(e.to_string()))
    }

    fn request_options(
        &self,
        options: &Value,
    ) -> Result<PublicKeyCredentialRequestOptions, CeremonyError> {
        let options: RequestOptionsJson = serde_json::from_value(options.clone())
            .map_err(|e| CeremonyError::InvalidOptions(e.to_string()))?;

        if options.allow_credentials.is_null() {
            return Err(CeremonyError::InvalidOptions(String::from(
                "allowCredentials must not be null",
            )));
        }
        if options.hints.is_null() {
            return Err(CeremonyError::InvalidOptions(String::from(
                "hints must not be null",
            )));
        }

        Ok(PublicKeyCredentialRequestOptions {
            challenge: options.challenge,
            allow_credentials: options.allow_credentials.into_option().unwrap_or_default(),
            hints: options.hints.into_option(),
            extra: options.extra,
        })
    }
}

fn object(value: &Value, what: &str) -> Result<Map<String, Value>, CeremonyError> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| CeremonyError::InvalidOptions(format!("{} must be a JSON object", what)))
}

fn take_binary(fields: &mut Map<String, Value>, key: &str) -> Result<Vec<u8>, CeremonyError> {
    match fields.remove(key) {
        Some(Value::String(text)) => Ok(encoding::decode(&text)?),
        Some(other) => Err(CeremonyError::InvalidOptions(format!(
            "{} must be a base64url string, got {}",
            key, other
        ))),
        None => Err(CeremonyError::InvalidOptions(format!("missing {}", key))),
    }
}

fn descriptors(value: Option<Value>) -> Result<Vec<PublicKeyCredentialDescriptor>, CeremonyError> {
    let entries = match value {
        None | Some(Value::Null) => return Ok(vec![]),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(CeremonyError::InvalidOptions(format!(
                "expected a list of credential descriptors, got {}",
                other
            )))
        }
    };

    entries
        .iter()
        .map(|entry| {
            let mut fields = object(entry, "credential descriptor")?;
            let id = take_binary(&mut fields, "id")?;

            Ok(PublicKeyCredentialDescriptor { id, extra: fields })
        })
        .collect()
}
