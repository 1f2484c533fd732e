use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::StreamExt;

use crate::error::ClientError;
use crate::request::PreparedRequest;

use super::{Transport, TransportError, UpstreamResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_MAX_IDLE_PER_HOST: usize = 16;

fn build_reqwest_client(use_env_proxy: bool) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none());

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| ClientError::Config(format!("Failed to build HTTP client: {err}")))
}

/// [`Transport`] backed by a pooled `reqwest` client.
///
/// Deadlines are not set on the client; the invoker enforces them through
/// cancellation so that timeouts and caller aborts share one path.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, ClientError> {
        build_reqwest_client(false).map(Self::with_client)
    }

    /// Same as [`HttpTransport::new`] but honors `HTTP(S)_PROXY` variables.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the client cannot be built.
    pub fn with_env_proxy() -> Result<Self, ClientError> {
        build_reqwest_client(true).map(Self::with_client)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: PreparedRequest) -> BoxFuture<'static, Result<UpstreamResponse, TransportError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let url = url::Url::parse(&request.url)
                .map_err(|e| TransportError(format!("Invalid upstream URL: {e}")))?;
            let mut outgoing = reqwest::Request::new(request.method, url);
            *outgoing.headers_mut() = request.headers;
            if let Some(body) = request.body {
                *outgoing.body_mut() = Some(reqwest::Body::from(body));
            }

            let response = client
                .execute(outgoing)
                .await
                .map_err(|err| TransportError(err.to_string()))?;
            let status = response.status();
            let body = response
                .bytes_stream()
                .map(|read| read.map_err(|err| TransportError(err.to_string())));
            Ok(UpstreamResponse {
                status,
                body: Box::pin(body),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};

    #[tokio::test]
    async fn invalid_url_is_a_transport_error() {
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .execute(PreparedRequest {
                method: Method::POST,
                url: "://bad-url".into(),
                headers: HeaderMap::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(err.0.starts_with("Invalid upstream URL"));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new().unwrap();
        let result = transport
            .execute(PreparedRequest {
                method: Method::GET,
                url: format!("http://{addr}/"),
                headers: HeaderMap::new(),
                body: None,
            })
            .await;
        assert!(result.is_err());
    }
}
