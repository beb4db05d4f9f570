//! HTTP transport for the greeting REST service.

use async_trait::async_trait;
use greeting_core::{
    ContentDraft, CreatedGreeting, FieldError, GreetingApi, GreetingError, GreetingView,
    ManagementView, ManualPaymentReceipt, OwnerSession, PaymentMethod, ResponseReceipt,
    RevealReceipt, UnlockReceipt,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const OWNER_TOKEN_HEADER: &str = "x-owner-token";

/// `greetingd` health payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub service: String,
    pub store_backend: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct AnswerRequest<'a> {
    answer: &'a str,
}

#[derive(Debug, Serialize)]
struct PaymentRequest<'a> {
    code: &'a str,
    method: PaymentMethod,
}

#[derive(Debug, Serialize)]
struct ResponseRequest {
    accepted: bool,
}

/// Client for a remote `greetingd`.
#[derive(Debug, Clone)]
pub struct HttpGreetingClient {
    client: Client,
    base_url: String,
}

impl HttpGreetingClient {
    pub fn new(endpoint: &str) -> Result<Self, GreetingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(transport_error)?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<ServiceHealth, GreetingError> {
        self.get("/v1/health").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GreetingError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GreetingError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(response).await
    }
}

fn transport_error(err: reqwest::Error) -> GreetingError {
    GreetingError::Transient(format!("greeting service unreachable: {err}"))
}

async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GreetingError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(transport_error);
    }

    let text = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "Greeting service returned an error");
    Err(error_from_status(status, &text))
}

/// Map an error response back onto the lifecycle taxonomy.
fn error_from_status(status: StatusCode, body: &str) -> GreetingError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .map(|body| body.error.clone())
        .unwrap_or_else(|| format!("greeting service returned {status}"));

    match status {
        StatusCode::NOT_FOUND => GreetingError::NotFound(message),
        StatusCode::UNPROCESSABLE_ENTITY => {
            let fields = parsed
                .and_then(|body| body.details)
                .and_then(|details| serde_json::from_value::<Vec<FieldError>>(details).ok())
                .unwrap_or_default();
            GreetingError::Validation(fields)
        }
        _ => GreetingError::Transient(message),
    }
}

#[async_trait]
impl GreetingApi for HttpGreetingClient {
    async fn create(&self, draft: &ContentDraft) -> Result<CreatedGreeting, GreetingError> {
        self.post("/v1/greetings", draft).await
    }

    async fn fetch(
        &self,
        id: &str,
        owner: Option<&OwnerSession>,
        preview: bool,
    ) -> Result<GreetingView, GreetingError> {
        let url = format!("{}/v1/greetings/{}", self.base_url, id);
        let mut request = self.client.get(&url);
        if let Some(owner) = owner.filter(|session| session.owns(id)) {
            request = request.header(OWNER_TOKEN_HEADER, owner.owner_token.as_str());
        }
        if preview {
            request = request.query(&[("preview", "true")]);
        }
        let response = request.send().await.map_err(transport_error)?;
        handle_response(response).await
    }

    async fn submit_answer(&self, id: &str, answer: &str) -> Result<UnlockReceipt, GreetingError> {
        self.post(
            &format!("/v1/greetings/{id}/unlock"),
            &AnswerRequest { answer },
        )
        .await
    }

    async fn submit_manual_payment(
        &self,
        id: &str,
        code: &str,
        method: PaymentMethod,
    ) -> Result<ManualPaymentReceipt, GreetingError> {
        self.post(
            &format!("/v1/greetings/{id}/payments/manual"),
            &PaymentRequest { code, method },
        )
        .await
    }

    async fn submit_payment_proof(
        &self,
        id: &str,
        code: &str,
        method: PaymentMethod,
    ) -> Result<RevealReceipt, GreetingError> {
        self.post(
            &format!("/v1/greetings/{id}/payments/reveal"),
            &PaymentRequest { code, method },
        )
        .await
    }

    async fn record_response(
        &self,
        id: &str,
        accepted: bool,
    ) -> Result<ResponseReceipt, GreetingError> {
        self.post(
            &format!("/v1/greetings/{id}/response"),
            &ResponseRequest { accepted },
        )
        .await
    }

    async fn management_view(&self, owner_token: &str) -> Result<ManagementView, GreetingError> {
        self.get(&format!("/v1/manage/{owner_token}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greeting_core::DraftField;

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = HttpGreetingClient::new("http://127.0.0.1:8092/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8092");
    }

    #[test]
    fn statuses_map_onto_error_taxonomy() {
        let not_found = error_from_status(
            StatusCode::NOT_FOUND,
            r#"{"error":"Not found: greeting 'x' not found","code":"NOT_FOUND"}"#,
        );
        assert!(matches!(not_found, GreetingError::NotFound(message) if message.contains("'x'")));

        let invalid = error_from_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error":"Validation failed","code":"VALIDATION_ERROR","details":[{"field":"sender_name","message":"too short"}]}"#,
        );
        match invalid {
            GreetingError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, DraftField::SenderName);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let unavailable = error_from_status(StatusCode::SERVICE_UNAVAILABLE, "upstream down");
        assert!(unavailable.is_retryable());

        let conflict = error_from_status(
            StatusCode::CONFLICT,
            r#"{"error":"Verification mismatch: used","code":"VERIFICATION_MISMATCH"}"#,
        );
        assert!(matches!(conflict, GreetingError::Transient(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_transient() {
        let client = HttpGreetingClient::new("http://127.0.0.1:9").unwrap();
        let err = client.fetch("abc123def456", None, false).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
