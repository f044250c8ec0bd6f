use crate::error::CeremonyError;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;

const DEFAULT_ERROR_MESSAGE: &str = "Request failed";

/// A decoded relying-party response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn into_json(self) -> Result<Value, CeremonyError> {
        match self {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::Text(text) => Err(CeremonyError::Request(format!(
                "expected a JSON response, got {:?}",
                text
            ))),
        }
    }
}

/// Sends JSON to the relying party.
#[async_trait]
pub trait JsonExchange: Send + Sync {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<ResponseBody, CeremonyError>;
}

pub struct ApiClient {
    http_client: Client,
}

impl ApiClient {
    pub fn new() -> Result<ApiClient> {
        Ok(ApiClient {
            http_client: Client::builder().cookie_store(true).build()?,
        })
    }
}

#[async_trait]
impl JsonExchange for ApiClient {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<ResponseBody, CeremonyError> {
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(url)
            .json(payload)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await?;

        let status = response.status();
        let is_json = is_json(response.headers());
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(is_json, &body);
            warn!("POST {} failed with {}: {}", url, status, message);

            return Err(CeremonyError::Request(message));
        }

        if is_json {
            Ok(ResponseBody::Json(serde_json::from_str(body.as_str())?))
        } else {
            Ok(ResponseBody::Text(body))
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

/// A JSON string body, the `error` field of a JSON object, or the raw text of any other body.
fn error_message(is_json: bool, body: &str) -> String {
    let message = if is_json {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| match value {
                Value::String(message) => Some(message),
                value => value.get("error")?.as_str().map(String::from),
            })
    } else {
        Some(body.to_string())
    };

    message
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| String::from(DEFAULT_ERROR_MESSAGE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use serde_json::json;

    #[test]
    fn test_new() {
        let client = ApiClient::new();
        assert!(client.is_ok());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(true, r#"{"error":"username taken"}"#),
            "username taken"
        );
        assert_eq!(
            error_message(true, r#""username taken""#),
            "username taken"
        );
        assert_eq!(error_message(false, "boom"), "boom");
        assert_eq!(error_message(false, ""), DEFAULT_ERROR_MESSAGE);
        assert_eq!(error_message(true, r#"{"message":"x"}"#), DEFAULT_ERROR_MESSAGE);
        assert_eq!(error_message(true, "not json"), DEFAULT_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_post_json_returns_json() {
        let server = MockServer::start_async().await;
        let response_mock = server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/webauthn/authenticate/options")
                    .header("content-type", "application/json")
                    .json_body(json!({ "username": "alice" }));
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "challenge": "AAAA" }));
            })
            .await;

        let client = ApiClient::new().unwrap();
        let body = client
            .post_json(
                &server.url("/webauthn/authenticate/options"),
                &json!({ "username": "alice" }),
            )
            .await
            .unwrap();

        response_mock.assert_async().await;
        assert_eq!(body, ResponseBody::Json(json!({ "challenge": "AAAA" })));
    }

    #[tokio::test]
    async fn test_post_json_returns_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/ping");
                then.status(200).header("content-type", "text/plain").body("pong");
            })
            .await;

        let client = ApiClient::new().unwrap();
        let body = client.post_json(&server.url("/ping"), &json!({})).await.unwrap();

        assert_eq!(body, ResponseBody::Text(String::from("pong")));
    }

    #[tokio::test]
    async fn test_post_json_json_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/webauthn/register/options");
                then.status(400)
                    .header("content-type", "application/json")
                    .json_body(json!({ "error": "username taken" }));
            })
            .await;

        let client = ApiClient::new().unwrap();
        let error = client
            .post_json(&server.url("/webauthn/register/options"), &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(error, CeremonyError::Request(ref message) if message == "username taken"));
    }

    #[tokio::test]
    async fn test_post_json_text_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/webauthn/register/options");
                then.status(500).header("content-type", "text/plain").body("boom");
            })
            .await;

        let client = ApiClient::new().unwrap();
        let error = client
            .post_json(&server.url("/webauthn/register/options"), &json!({}))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_post_json_empty_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST").path("/webauthn/register/options");
                then.status(403);
            })
            .await;

        let client = ApiClient::new().unwrap();
        let error = client
            .post_json(&server.url("/webauthn/register/options"), &json!({}))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), DEFAULT_ERROR_MESSAGE);
    }

    #[test]
    fn test_text_body_is_not_json() {
        let body = ResponseBody::Text(String::from("ok"));

        assert!(matches!(body.into_json(), Err(CeremonyError::Request(_))));
    }
}
