//! [`HttpRemoteService`]: the remote over JSON/HTTP.
//!
//! Successful responses wrap their payload as `{ "data": ... }`; failures
//! carry `{ "error": "...", "code": "..." }`. Gateway errors (502, 503, 504)
//! count as network errors since the backend itself was never reached.

use std::time::Duration;

use async_trait::async_trait;
use covenant_core::models::{NewParticipant, Participant};
use covenant_core::types::DbId;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::remote::{RemoteError, RemoteService};

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[allow(dead_code)]
    code: Option<String>,
}

/// HTTP client for the children API.
pub struct HttpRemoteService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteService {
    /// Build a client with a per-request timeout.
    ///
    /// * `base_url` - API root, e.g. `https://church.example/api/v1`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn data<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = self.send(request).await?;
        let envelope: DataEnvelope<T> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Network(format!("request timed out: {err}"))
    } else {
        RemoteError::Network(err.to_string())
    }
}

/// Classify a non-2xx response.
fn status_error(status: StatusCode, body: &str) -> RemoteError {
    if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        return RemoteError::Network(format!("remote unavailable ({})", status.as_u16()));
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.to_string()
            }
        });
    RemoteError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn get_child(&self, id: DbId) -> Result<Option<Participant>, RemoteError> {
        match self.data(self.client.get(self.url(&format!("/children/{id}")))).await {
            Ok(child) => Ok(Some(child)),
            Err(RemoteError::Rejected { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_children(&self, guardian_id: &str) -> Result<Vec<Participant>, RemoteError> {
        self.data(
            self.client
                .get(self.url("/children"))
                .query(&[("guardian_id", guardian_id)]),
        )
        .await
    }

    async fn search_children(&self, query: &str) -> Result<Vec<Participant>, RemoteError> {
        self.data(
            self.client
                .get(self.url("/children/search"))
                .query(&[("q", query)]),
        )
        .await
    }

    async fn register_child(&self, input: &NewParticipant) -> Result<Participant, RemoteError> {
        self.data(self.client.post(self.url("/children")).json(input))
            .await
    }

    async fn update_child(&self, child: &Participant) -> Result<Participant, RemoteError> {
        self.data(
            self.client
                .put(self.url(&format!("/children/{}", child.id)))
                .json(child),
        )
        .await
    }

    async fn delete_child(&self, id: DbId) -> Result<(), RemoteError> {
        self.send(self.client.delete(self.url(&format!("/children/{id}"))))
            .await?;
        Ok(())
    }

    async fn check_in(
        &self,
        child_id: DbId,
        resource_id: DbId,
    ) -> Result<Participant, RemoteError> {
        let body = serde_json::json!({ "resource_id": resource_id });
        self.data(
            self.client
                .post(self.url(&format!("/children/{child_id}/check-in")))
                .json(&body),
        )
        .await
    }

    async fn check_out(&self, child_id: DbId) -> Result<Participant, RemoteError> {
        self.data(
            self.client
                .post(self.url(&format!("/children/{child_id}/check-out"))),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use covenant_core::status::ParticipantStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn child_json(id: DbId) -> serde_json::Value {
        json!({
            "id": id,
            "guardian_id": "guardian-1",
            "first_name": "Noah",
            "last_name": "Kim",
            "birth_date": "2020-04-02",
            "status": "not_in_service",
            "current_resource_id": null,
            "last_check_in": null,
            "last_check_out": null
        })
    }

    fn client(server: &MockServer) -> HttpRemoteService {
        HttpRemoteService::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn gateway_errors_are_network_errors() {
        for status in [502, 503, 504] {
            let status = StatusCode::from_u16(status).unwrap();
            assert!(status_error(status, "").is_network());
        }
    }

    #[test]
    fn error_body_message_is_used() {
        let err = status_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error":"first name is required","code":"VALIDATION_ERROR"}"#,
        );
        assert_eq!(
            err,
            RemoteError::Rejected {
                status: 422,
                message: "first name is required".into()
            }
        );
    }

    #[tokio::test]
    async fn get_child_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/children/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": child_json(7) })))
            .mount(&server)
            .await;

        let child = client(&server).get_child(7).await.unwrap().unwrap();
        assert_eq!(child.id, 7);
        assert_eq!(child.status, ParticipantStatus::NotInService);
    }

    #[tokio::test]
    async fn missing_child_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/children/8"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({ "error": "child not found", "code": "NOT_FOUND" })),
            )
            .mount(&server)
            .await;

        assert_eq!(client(&server).get_child(8).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_children_passes_guardian() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/children"))
            .and(query_param("guardian_id", "guardian-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": [child_json(1), child_json(2)] })),
            )
            .mount(&server)
            .await;

        let children = client(&server).list_children("guardian-1").await.unwrap();
        assert_eq!(children.len(), 2);
    }

    #[tokio::test]
    async fn service_unavailable_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/children"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let input = NewParticipant {
            guardian_id: "guardian-1".into(),
            first_name: "Noah".into(),
            last_name: "Kim".into(),
            birth_date: None,
        };
        assert_matches!(
            client(&server).register_child(&input).await,
            Err(RemoteError::Network(_))
        );
    }

    #[tokio::test]
    async fn slow_remote_times_out_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/children/3/check-out"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": child_json(3) }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let remote = HttpRemoteService::new(server.uri(), Duration::from_millis(50)).unwrap();
        assert_matches!(remote.check_out(3).await, Err(RemoteError::Network(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let remote =
            HttpRemoteService::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert_matches!(remote.get_child(1).await, Err(RemoteError::Network(_)));
    }
}
