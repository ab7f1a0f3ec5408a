//! HTTP gateway and remote failure classification.
//!
//! Every exchange with the indexer goes through [`Gateway`]. A non-success
//! response is turned into an [`IndexerError`] carrying the reason phrase, the
//! raw body and, when the service sent a `Retry-After` header, the backoff
//! hint. Failures are logged here and then returned to the caller.

use crate::config::{AccountConfig, HttpConfig};
use crate::error::{IndexerError, Result};
use hyper::ext::ReasonPhrase;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::Form;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Header carrying the API management subscription key
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// HTTP gateway bound to one indexer account
pub struct Gateway {
    http: reqwest::Client,
    account: AccountConfig,
    api_base: Url,
}

impl Gateway {
    /// Create a new gateway for the given account
    pub fn new(account: AccountConfig, http: &HttpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(http.user_agent.as_str())
            .timeout(Duration::from_secs(http.request_timeout_secs))
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .build()
            .map_err(|source| IndexerError::Transport {
                endpoint: account.api_url.clone(),
                source,
            })?;

        let api_base = Url::parse(&account.api_url).map_err(|e| {
            IndexerError::Validation(format!("Invalid api url {}: {}", account.api_url, e))
        })?;

        Ok(Self {
            http,
            account,
            api_base,
        })
    }

    /// Account this gateway is bound to
    pub fn account(&self) -> &AccountConfig {
        &self.account
    }

    /// Build a url under `base` with the given query parameters
    pub fn url(&self, base: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(base)
            .map_err(|e| IndexerError::Validation(format!("Invalid url {}: {}", base, e)))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        Ok(url)
    }

    /// Build `{root}/{segments...}` with the given query parameters. Each
    /// segment is percent-encoded, so ids cannot change the request target.
    pub fn endpoint(&self, root: &str, segments: &[&str], params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.url(root, params)?;
        url.path_segments_mut()
            .map_err(|_| IndexerError::Validation(format!("Url {} cannot take a path", root)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET and deserialize a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let endpoint = redact(&url);
        let body = self.execute(self.request(Method::GET, url), &endpoint, cancel).await?;
        decode(&endpoint, &body)
    }

    /// GET a text body
    pub async fn get_text(&self, url: Url, cancel: &CancellationToken) -> Result<String> {
        let endpoint = redact(&url);
        let body = self.execute(self.request(Method::GET, url), &endpoint, cancel).await?;
        String::from_utf8(body).map_err(|e| {
            let err = IndexerError::Schema {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            };
            error!(endpoint = %endpoint, error = %err, "Indexer response was not UTF-8");
            err
        })
    }

    /// GET a body that the service returns as a JSON string literal
    /// (access tokens, signed urls) and strip the surrounding quotes
    pub async fn get_quoted(&self, url: Url, cancel: &CancellationToken) -> Result<String> {
        let text = self.get_text(url, cancel).await?;
        Ok(unquote(&text).to_string())
    }

    /// GET raw bytes
    pub async fn get_bytes(&self, url: Url, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let endpoint = redact(&url);
        self.execute(self.request(Method::GET, url), &endpoint, cancel).await
    }

    /// POST an optional JSON body and deserialize the JSON response
    pub async fn post_json<B, T>(
        &self,
        url: Url,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let endpoint = redact(&url);
        let mut request = self.request(Method::POST, url);
        request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_LENGTH, 0),
        };
        let response = self.execute(request, &endpoint, cancel).await?;
        decode(&endpoint, &response)
    }

    /// POST a multipart/form-data body and deserialize the JSON response
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        url: Url,
        form: Form,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let endpoint = redact(&url);
        let request = self.request(Method::POST, url).multipart(form);
        let response = self.execute(request, &endpoint, cancel).await?;
        decode(&endpoint, &response)
    }

    /// POST without a body, ignoring the response body
    pub async fn post_empty(&self, url: Url, cancel: &CancellationToken) -> Result<()> {
        let endpoint = redact(&url);
        let request = self
            .request(Method::POST, url)
            .header(reqwest::header::CONTENT_LENGTH, 0);
        self.execute(request, &endpoint, cancel).await.map(|_| ())
    }

    /// DELETE, ignoring the response body
    pub async fn delete(&self, url: Url, cancel: &CancellationToken) -> Result<()> {
        let endpoint = redact(&url);
        self.execute(self.request(Method::DELETE, url), &endpoint, cancel)
            .await
            .map(|_| ())
    }

    /// Start a request. The subscription key is only attached for the
    /// account's own API origin; signed artifact urls point elsewhere.
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let attach_key = url.origin() == self.api_base.origin();
        let request = self.http.request(method, url);
        if attach_key {
            request.header(SUBSCRIPTION_KEY_HEADER, &self.account.subscription_key)
        } else {
            request
        }
    }

    /// Run one exchange, racing it against cancellation
    async fn execute(
        &self,
        request: RequestBuilder,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        debug!(endpoint = %endpoint, "Sending indexer request");

        let exchange = async {
            let response = request.send().await.map_err(|source| IndexerError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

            let status = response.status();
            let reason = reason_phrase(&response);
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|source| IndexerError::Transport {
                    endpoint: endpoint.to_string(),
                    source,
                })?;

            if status.is_success() {
                Ok(body.to_vec())
            } else {
                Err(classify_failure(
                    endpoint,
                    status,
                    reason.as_deref(),
                    &headers,
                    &String::from_utf8_lossy(&body),
                ))
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IndexerError::Cancelled),
            result = exchange => result,
        };

        match &result {
            Err(IndexerError::Cancelled) => debug!(endpoint = %endpoint, "Indexer request cancelled"),
            Err(err) if err.is_retryable() => {
                metrics::counter!("indexer.requests.rate_limited").increment(1);
                error!(
                    endpoint = %endpoint,
                    retry_after_secs = err.retry_after().unwrap_or_default().as_secs(),
                    error = %err,
                    "Indexer request rate limited"
                );
            }
            Err(err) => error!(endpoint = %endpoint, error = %err, "Indexer request failed"),
            Ok(_) => {}
        }

        result
    }
}

/// Reason phrase as sent by the server. Only present when it differs from
/// the canonical one for the status.
pub fn reason_phrase(response: &Response) -> Option<String> {
    response
        .extensions()
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
}

/// Turn a non-success response into a typed failure. Without a reason
/// phrase from the wire the canonical one for `status` is used.
pub fn classify_failure(
    endpoint: &str,
    status: StatusCode,
    reason: Option<&str>,
    headers: &HeaderMap,
    body: &str,
) -> IndexerError {
    let reason = reason
        .or_else(|| status.canonical_reason())
        .unwrap_or("Unknown")
        .to_string();

    match parse_retry_after(headers) {
        Some(retry_after) => IndexerError::RateLimited {
            endpoint: endpoint.to_string(),
            status,
            reason,
            body: body.to_string(),
            retry_after,
        },
        None => IndexerError::RemoteOperation {
            endpoint: endpoint.to_string(),
            status,
            reason,
            body: body.to_string(),
        },
    }
}

/// Parse a delta-seconds `Retry-After` header. HTTP-date values are not
/// treated as a hint.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Strip the quotes around a JSON string literal body
pub fn unquote(text: &str) -> &str {
    text.trim().trim_matches('"')
}

/// Url without its query string; access tokens travel in the query
pub fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_query(None);
    redacted.set_fragment(None);
    redacted.to_string()
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        let err = IndexerError::Schema {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        };
        error!(endpoint = %endpoint, error = %err, "Indexer response did not match expected shape");
        err
    })
}
