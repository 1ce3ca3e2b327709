//! Conditional GET over reqwest.

use reqwest::StatusCode;
use reqwest::header::{
    ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use serde::de::DeserializeOwned;
use studycache_api_types::headers::CORRELATION_ID;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::error::ClientError;
use super::resource_cache::ResponseValidators;
use crate::config::ClientSettings;

/// Outcome of a conditional request (`NotModified` only for 304).
#[derive(Debug)]
pub enum FetchOutcome<T> {
    NotModified(ResponseValidators),
    Fetched {
        data: T,
        validators: ResponseValidators,
    },
}

/// HTTP backend shared by every resource load.
#[derive(Debug, Clone)]
pub struct ConditionalFetcher {
    http: reqwest::Client,
    base_url: Url,
}

impl ConditionalFetcher {
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self::with_client(http, settings.base_url.clone()))
    }

    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded.
    pub fn resource_url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `url`, sending whatever validators the caller holds.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        cached: Option<&ResponseValidators>,
    ) -> Result<FetchOutcome<T>, ClientError> {
        let correlation_id = Uuid::new_v4().to_string();
        let mut request = self
            .http
            .get(url.clone())
            .header(CORRELATION_ID, correlation_id.as_str());

        if let Some(validators) = cached {
            if let Some(etag) = validators.etag.as_deref() {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = validators.last_modified.as_deref() {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request.send().await.inspect_err(|err| {
            warn!(url = %url, correlation_id, error = %err, "resource request failed");
        })?;
        let status = response.status();
        let validators = validators_from(response.headers());

        if status == StatusCode::NOT_MODIFIED {
            debug!(url = %url, correlation_id, "resource not modified (304)");
            return Ok(FetchOutcome::NotModified(validators));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                url = %url,
                correlation_id,
                status = status.as_u16(),
                "origin rejected resource request"
            );
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let data = serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode {
            message: format!("{url}: {err}"),
        })?;
        debug!(url = %url, correlation_id, bytes = bytes.len(), "resource fetched");
        Ok(FetchOutcome::Fetched { data, validators })
    }
}

fn validators_from(headers: &HeaderMap) -> ResponseValidators {
    let text = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    ResponseValidators {
        etag: text(ETAG),
        last_modified: text(LAST_MODIFIED),
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;
    use serde_json::Value;

    use super::*;

    fn fetcher(server: &MockServer) -> ConditionalFetcher {
        let base = Url::parse(&server.base_url()).expect("base url");
        ConditionalFetcher::with_client(reqwest::Client::new(), base)
    }

    #[test]
    fn resource_url_encodes_segments() {
        let fetcher = ConditionalFetcher::with_client(
            reqwest::Client::new(),
            Url::parse("http://origin.test/base/").expect("url"),
        );
        let url = fetcher
            .resource_url(&["concursos", "trf 3", "simulados"])
            .expect("url");
        assert_eq!(url.as_str(), "http://origin.test/base/concursos/trf%203/simulados");
    }

    #[tokio::test]
    async fn sends_validators_and_maps_not_modified() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/r")
                .header("if-none-match", "\"v1\"")
                .header("if-modified-since", "Wed, 01 Apr 2026 12:00:00 GMT")
                .header_exists("x-correlation-id");
            then.status(304).header("etag", "\"v1\"");
        });

        let fetcher = fetcher(&server);
        let cached = ResponseValidators {
            etag: Some("\"v1\"".into()),
            last_modified: Some("Wed, 01 Apr 2026 12:00:00 GMT".into()),
        };
        let url = fetcher.resource_url(&["r"]).expect("url");
        let outcome = fetcher
            .get_json::<Value>(url, Some(&cached))
            .await
            .expect("fetch");

        mock.assert();
        match outcome {
            FetchOutcome::NotModified(validators) => {
                assert_eq!(validators.etag.as_deref(), Some("\"v1\""));
            }
            other => panic!("expected 304, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_is_a_status_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/missing");
            then.status(404).body("not here");
        });

        let fetcher = fetcher(&server);
        let url = fetcher.resource_url(&["missing"]).expect("url");
        let err = fetcher.get_json::<Value>(url, None).await.expect_err("404");
        assert!(matches!(err, ClientError::Status { status: 404, ref body } if body == "not here"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/bad");
            then.status(200)
                .header("content-type", "application/json")
                .body("{not json");
        });

        let fetcher = fetcher(&server);
        let url = fetcher.resource_url(&["bad"]).expect("url");
        let err = fetcher.get_json::<Value>(url, None).await.expect_err("decode");
        assert!(matches!(err, ClientError::Decode { .. }));
    }
}
