//! Batched, fault-tolerant author lookup against the platform user service.

use std::{collections::HashMap, env, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_USER_SERVICE_BASE: &str = "http://127.0.0.1:8001/api";

/// Display data for one comment author.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Platform response envelope as the user service emits it.
#[derive(Debug, Deserialize)]
struct BatchEnvelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Vec<UserProfile>>,
}

/// Client for `GET {base}/users/batch?ids=...`.
///
/// Author enrichment is strictly best-effort: every failure mode (transport
/// error, timeout, bad envelope code, malformed body) degrades to an empty
/// mapping after one retry. Callers render comments without profile fields
/// for the ids that are missing; they never see the failure itself.
#[derive(Clone)]
pub struct UserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl UserDirectory {
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("USER_SERVICE_BASE_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_SERVICE_BASE.to_string());
        let timeout = env::var("USER_SERVICE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(3)
            .max(1);

        Self::new(base_url, Duration::from_secs(timeout))
    }

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build user service client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Profiles for the given author ids, keyed by id.
    ///
    /// Ids are deduplicated; an empty input makes no call at all. Missing
    /// entries are simply absent from the map.
    pub async fn profiles_by_ids(&self, author_ids: &[i64]) -> HashMap<i64, UserProfile> {
        let mut ids: Vec<i64> = author_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return HashMap::new();
        }

        match self.fetch_batch(&ids).await {
            Ok(profiles) => profiles,
            Err(err) => {
                tracing::warn!("user profile batch failed, retrying once: {err:#}");
                match self.fetch_batch(&ids).await {
                    Ok(profiles) => profiles,
                    Err(err) => {
                        tracing::warn!(
                            "user profile batch failed again, rendering without profiles: {err:#}"
                        );
                        HashMap::new()
                    }
                }
            }
        }
    }

    async fn fetch_batch(&self, ids: &[i64]) -> Result<HashMap<i64, UserProfile>> {
        let joined = ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let envelope: BatchEnvelope = self
            .client
            .get(format!("{}/users/batch", self.base_url))
            .query(&[("ids", joined.as_str())])
            .send()
            .await
            .context("failed to call user service")?
            .error_for_status()
            .context("user service returned bad status")?
            .json()
            .await
            .context("failed to decode user service response")?;

        if envelope.code != 200 {
            anyhow::bail!(
                "user service envelope code {}: {}",
                envelope.code,
                envelope.message.unwrap_or_default()
            );
        }

        Ok(envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|profile| (profile.id, profile))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::UserDirectory;

    const TIMEOUT: Duration = Duration::from_millis(300);

    #[tokio::test]
    async fn empty_input_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/batch"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let directory = UserDirectory::new(server.uri(), TIMEOUT).expect("directory");
        assert!(directory.profiles_by_ids(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn ids_are_deduplicated_and_sorted_on_the_wire() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/batch"))
            .and(query_param("ids", "1,2,5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "ok",
                "data": [
                    {"id": 1, "username": "ada", "nickname": "Ada", "avatarUrl": "https://cdn.example.com/u/1.png"},
                    {"id": 5, "username": "brian"},
                ],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let directory = UserDirectory::new(server.uri(), TIMEOUT).expect("directory");
        let profiles = directory.profiles_by_ids(&[5, 1, 2, 1, 5]).await;

        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[&1].nickname.as_deref(), Some("Ada"));
        assert_eq!(profiles[&5].username.as_deref(), Some("brian"));
        assert!(profiles[&5].avatar_url.is_none());
        assert!(!profiles.contains_key(&2));
    }

    #[tokio::test]
    async fn non_success_envelope_code_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 500,
                "message": "user service unavailable",
                "data": null,
            })))
            .mount(&server)
            .await;

        let directory = UserDirectory::new(server.uri(), TIMEOUT).expect("directory");
        assert!(directory.profiles_by_ids(&[1]).await.is_empty());
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/batch"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "ok",
                "data": [{"id": 9, "username": "carol"}],
            })))
            .mount(&server)
            .await;

        let directory = UserDirectory::new(server.uri(), TIMEOUT).expect("directory");
        let profiles = directory.profiles_by_ids(&[9]).await;
        assert_eq!(profiles[&9].username.as_deref(), Some("carol"));
    }

    #[tokio::test]
    async fn slow_collaborator_times_out_and_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/batch"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(800))
                    .set_body_json(serde_json::json!({"code": 200, "data": []})),
            )
            .mount(&server)
            .await;

        let directory = UserDirectory::new(server.uri(), TIMEOUT).expect("directory");
        assert!(directory.profiles_by_ids(&[1]).await.is_empty());
    }
}
