//! HTTP transport layer for the ARM client.

use crate::config::{ArmConfig, MANAGEMENT_SCOPE};
use crate::credential::TokenCredential;
use crate::error::{ArmError, ArmResult};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// One page of a list operation.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

/// Authenticated HTTP transport for management-plane requests.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<ArmConfig>,
    credential: Arc<dyn TokenCredential>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: Arc<ArmConfig>, credential: Arc<dyn TokenCredential>) -> ArmResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            credential,
        })
    }

    /// Build a URL from path segments and query parameters.
    ///
    /// Each segment is percent-encoded on its own, so a `/` inside a name
    /// stays inside its segment.
    pub(crate) fn build_url(&self, segments: &[&str], query: &[(&str, &str)]) -> ArmResult<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ArmError::Config(format!(
                    "'{}' cannot be used as a base URL",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Execute a GET request with retries.
    async fn execute_with_retry(&self, url: &Url) -> ArmResult<Response> {
        let retry_config = &self.config.retry_config;
        let mut attempts = 0;

        loop {
            let token = self.credential.get_token(MANAGEMENT_SCOPE).await?;

            match self
                .client
                .get(url.clone())
                .bearer_auth(token)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if response.status().is_success() {
                        return Ok(response);
                    }

                    if attempts < retry_config.max_retries
                        && retry_config.should_retry_status(status)
                    {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            status = status,
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis(),
                            "Management request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(ArmError::from_response(status, &body));
                }
                Err(e) => {
                    if attempts < retry_config.max_retries && (e.is_timeout() || e.is_connect()) {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis(),
                            "Management request did not complete, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// GET a single resource.
    pub async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> ArmResult<T> {
        let url = self.build_url(segments, query)?;
        debug!(url = %url, "GET request");

        let response = self.execute_with_retry(&url).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// GET every page of a list operation, following `nextLink`.
    ///
    /// Links must stay on the management endpoint's origin since every
    /// request carries the bearer token. Paging stops at the first link
    /// that was already visited.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> ArmResult<Vec<T>> {
        let mut url = self.build_url(segments, query)?;
        let mut visited = HashSet::new();
        let mut items = Vec::new();

        loop {
            visited.insert(url.clone());
            debug!(url = %url, "GET page");
            let response = self.execute_with_retry(&url).await?;
            let body = response.text().await?;
            let page: Page<T> = serde_json::from_str(&body)?;
            items.extend(page.value);

            let next = match page.next_link {
                Some(next) if !next.is_empty() => self.next_page_url(&next)?,
                _ => break,
            };
            if visited.contains(&next) {
                warn!(url = %next, "nextLink repeats a page already read, stopping");
                break;
            }
            url = next;
        }

        Ok(items)
    }

    fn next_page_url(&self, link: &str) -> ArmResult<Url> {
        let next = Url::parse(link)?;
        if next.origin() != self.config.base_url.origin() {
            return Err(ArmError::Config(format!(
                "nextLink '{}' leaves the management endpoint {}",
                link, self.config.base_url
            )));
        }
        Ok(next)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.config.base_url.as_str())
            .finish()
    }
}
