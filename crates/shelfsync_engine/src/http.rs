//! HTTP adapter for the label system.
//!
//! The actual HTTP client is abstracted via a trait so any HTTP library can
//! carry the requests. Bodies are JSON.

use crate::client::LabelSystemClient;
use crate::error::ExternalError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfsync_protocol::{
    AimsCredentials, EntityType, RemoteArticle, StoreConfig, SyncAction, SyncQueueItem,
};
use std::future::Future;
use url::Url;

const API_PREFIX: &str = "/common/api/v2/common";

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// HTTP client abstraction.
///
/// An `Err` means the request never produced a response (DNS, connect, TLS,
/// reset).
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a GET request.
    fn get(
        &self,
        url: &str,
        bearer: &str,
    ) -> impl Future<Output = Result<HttpResponse, String>> + Send;

    /// Sends a POST request with a JSON body.
    fn post(
        &self,
        url: &str,
        bearer: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<HttpResponse, String>> + Send;
}

/// Mutation body sent to the label system.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationRequest<'a> {
    store: &'a str,
    entity_type: EntityType,
    entity_id: &'a str,
    action: SyncAction,
    payload: &'a Value,
}

/// `GET /articles` responses come either bare or paged.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArticlePage {
    Bare(Vec<RemoteArticle>),
    Paged { content: Vec<RemoteArticle> },
}

/// Label system client speaking JSON over an [`HttpClient`].
#[derive(Debug)]
pub struct HttpLabelClient<C: HttpClient> {
    client: C,
}

impl<C: HttpClient> HttpLabelClient<C> {
    /// Creates a client over `client`.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns the underlying HTTP client.
    pub fn inner(&self) -> &C {
        &self.client
    }
}

fn credentials(store: &StoreConfig) -> Result<&AimsCredentials, ExternalError> {
    store.aims.as_ref().ok_or_else(|| {
        ExternalError::permanent(format!("store {} has no credentials", store.store_id))
    })
}

/// Builds a tenant-scoped API URL. Query values are form-encoded, so a
/// company or store code cannot add or override query parameters.
fn endpoint(aims: &AimsCredentials, resource: &str, store_code: &str) -> Result<Url, ExternalError> {
    let base = format!("{}{}/{}", aims.base_url.trim_end_matches('/'), API_PREFIX, resource);
    Url::parse_with_params(&base, [("company", aims.company.as_str()), ("store", store_code)])
        .map_err(|e| ExternalError::permanent(format!("invalid label system url {}: {}", base, e)))
}

fn resource_for(action: SyncAction) -> &'static str {
    match action {
        SyncAction::Create | SyncAction::Update | SyncAction::Delete => "articles",
        SyncAction::Link => "labels/link",
        SyncAction::Unlink => "labels/unlink",
    }
}

/// Classifies a response status.
///
/// 2xx succeeds; 408, 429 and 5xx are transient; every other status is a
/// permanent rejection.
fn classify(response: &HttpResponse) -> Result<(), ExternalError> {
    let reason = || {
        let body = String::from_utf8_lossy(&response.body);
        format!("HTTP {}: {}", response.status, body.trim())
    };
    match response.status {
        200..=299 => Ok(()),
        408 | 429 | 500..=599 => Err(ExternalError::transient(reason())),
        _ => Err(ExternalError::permanent(reason())),
    }
}

impl<C: HttpClient> LabelSystemClient for HttpLabelClient<C> {
    async fn fetch_articles(&self, store: &StoreConfig) -> Result<Vec<RemoteArticle>, ExternalError> {
        let aims = credentials(store)?;
        let url = endpoint(aims, "articles", &store.store_code)?;
        let response = self
            .client
            .get(url.as_str(), &aims.api_key)
            .await
            .map_err(ExternalError::Transient)?;
        classify(&response)?;

        let page: ArticlePage = serde_json::from_slice(&response.body)
            .map_err(|e| ExternalError::permanent(format!("malformed article list: {}", e)))?;
        Ok(match page {
            ArticlePage::Bare(articles) | ArticlePage::Paged { content: articles } => articles,
        })
    }

    async fn push_mutation(
        &self,
        store: &StoreConfig,
        item: &SyncQueueItem,
    ) -> Result<(), ExternalError> {
        let aims = credentials(store)?;
        let url = endpoint(aims, resource_for(item.action), &store.store_code)?;
        let body = serde_json::to_vec(&MutationRequest {
            store: &store.store_code,
            entity_type: item.entity_type,
            entity_id: &item.entity_id,
            action: item.action,
            payload: &item.payload,
        })
        .map_err(|e| ExternalError::permanent(format!("unencodable payload: {}", e)))?;

        let response = self
            .client
            .post(url.as_str(), &aims.api_key, body)
            .await
            .map_err(ExternalError::Transient)?;
        classify(&response)
    }

    async fn is_connected(&self, store: &StoreConfig) -> bool {
        let Ok(aims) = credentials(store) else {
            return false;
        };
        let Ok(url) = endpoint(aims, "articles", &store.store_code) else {
            return false;
        };
        matches!(self.client.get(url.as_str(), &aims.api_key).await, Ok(response) if classify(&response).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use shelfsync_protocol::NewQueueItem;

    #[derive(Default)]
    struct TestClient {
        response: Mutex<Option<Result<HttpResponse, String>>>,
        requests: Mutex<Vec<(String, Option<Vec<u8>>)>>,
    }

    impl TestClient {
        fn respond(&self, response: Result<HttpResponse, String>) {
            *self.response.lock() = Some(response);
        }

        fn reply(&self) -> Result<HttpResponse, String> {
            self.response
                .lock()
                .clone()
                .unwrap_or_else(|| Err("no response set".into()))
        }
    }

    impl HttpClient for TestClient {
        async fn get(&self, url: &str, _bearer: &str) -> Result<HttpResponse, String> {
            self.requests.lock().push((url.to_string(), None));
            self.reply()
        }

        async fn post(&self, url: &str, _bearer: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
            self.requests.lock().push((url.to_string(), Some(body)));
            self.reply()
        }
    }

    fn store() -> StoreConfig {
        StoreConfig::new("s1", "S001").with_aims(AimsCredentials {
            base_url: "https://aims.example.com/".into(),
            company: "ACME".into(),
            api_key: "secret".into(),
        })
    }

    fn item(action: SyncAction) -> SyncQueueItem {
        let new = NewQueueItem::new("s1", EntityType::Spaces, "A1", action, json!({"labelCode": "L1"}));
        SyncQueueItem::from_new(new, 0, 0)
    }

    #[test]
    fn status_classification() {
        assert!(classify(&HttpResponse::new(204, "")).is_ok());
        assert!(!classify(&HttpResponse::new(503, "busy")).unwrap_err().is_permanent());
        assert!(!classify(&HttpResponse::new(429, "")).unwrap_err().is_permanent());
        assert!(!classify(&HttpResponse::new(408, "")).unwrap_err().is_permanent());
        assert!(classify(&HttpResponse::new(400, "bad")).unwrap_err().is_permanent());
        assert!(classify(&HttpResponse::new(404, "")).unwrap_err().is_permanent());
    }

    #[tokio::test]
    async fn fetch_accepts_bare_and_paged_lists() {
        let client = HttpLabelClient::new(TestClient::default());
        client.inner().respond(Ok(HttpResponse::new(
            200,
            br#"[{"articleId":"A1","data":{"name":"Aisle 1"}}]"#.to_vec(),
        )));
        assert_eq!(client.fetch_articles(&store()).await.unwrap().len(), 1);

        client.inner().respond(Ok(HttpResponse::new(
            200,
            br#"{"content":[{"articleId":"A1"},{"articleId":"A2"}]}"#.to_vec(),
        )));
        assert_eq!(client.fetch_articles(&store()).await.unwrap().len(), 2);

        let (url, _) = client.inner().requests.lock()[0].clone();
        assert_eq!(
            url,
            "https://aims.example.com/common/api/v2/common/articles?company=ACME&store=S001"
        );
    }

    #[tokio::test]
    async fn push_routes_by_action() {
        let client = HttpLabelClient::new(TestClient::default());
        client.inner().respond(Ok(HttpResponse::new(200, "")));
        client.push_mutation(&store(), &item(SyncAction::Link)).await.unwrap();

        let (url, body) = client.inner().requests.lock()[0].clone();
        assert!(url.contains("/labels/link?"));
        let body: Value = serde_json::from_slice(&body.unwrap()).unwrap();
        assert_eq!(body["entityId"], "A1");
        assert_eq!(body["action"], "link");
        assert_eq!(body["payload"]["labelCode"], "L1");
    }

    #[tokio::test]
    async fn query_values_are_encoded() {
        let client = HttpLabelClient::new(TestClient::default());
        client.inner().respond(Ok(HttpResponse::new(200, "[]")));
        let store = StoreConfig::new("s1", "01&store=99").with_aims(AimsCredentials {
            base_url: "https://aims.example.com".into(),
            company: "Acme Retail #1".into(),
            api_key: "secret".into(),
        });
        client.fetch_articles(&store).await.unwrap();

        let (url, _) = client.inner().requests.lock()[0].clone();
        assert_eq!(
            url,
            "https://aims.example.com/common/api/v2/common/articles?company=Acme+Retail+%231&store=01%26store%3D99"
        );
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("company".to_string(), "Acme Retail #1".to_string()),
                ("store".to_string(), "01&store=99".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn malformed_base_url_is_permanent() {
        let client = HttpLabelClient::new(TestClient::default());
        let store = StoreConfig::new("s1", "S001").with_aims(AimsCredentials {
            base_url: "not a url".into(),
            company: "ACME".into(),
            api_key: "secret".into(),
        });
        let err = client.fetch_articles(&store).await.unwrap_err();
        assert!(err.is_permanent());
        assert!(client.inner().requests.lock().is_empty());
        assert!(!client.is_connected(&store).await);
    }

    #[tokio::test]
    async fn transport_failures_are_transient() {
        let client = HttpLabelClient::new(TestClient::default());
        client.inner().respond(Err("connection reset".into()));
        let err = client.push_mutation(&store(), &item(SyncAction::Update)).await.unwrap_err();
        assert!(!err.is_permanent());
        assert!(!client.is_connected(&store()).await);
    }

    #[tokio::test]
    async fn missing_credentials_are_permanent() {
        let client = HttpLabelClient::new(TestClient::default());
        let bare = StoreConfig::new("s1", "S001");
        assert!(client.fetch_articles(&bare).await.unwrap_err().is_permanent());
        assert!(!client.is_connected(&bare).await);
    }
}
