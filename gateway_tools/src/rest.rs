use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use smsr_common::Secret;

use crate::ClientError;

/// A thin JSON-over-HTTPS client bound to one base URL. Every gateway, provider and FX client is built on top of one
/// of these.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    client: Arc<Client>,
}

impl RestClient {
    pub fn new(base_url: &str, mut headers: HeaderMap, timeout: Duration) -> Result<Self, ClientError> {
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Initialization(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, ClientError> {
        let text = self.rest_query_text(method, path, params, body).await?;
        serde_json::from_str::<T>(&text).map_err(|e| ClientError::JsonError(e.to_string()))
    }

    /// Like [`RestClient::rest_query`], but hands back the raw body of a successful response. Useful for APIs that
    /// answer in plain text some of the time.
    pub async fn rest_query_text<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<String, ClientError> {
        let url = self.url(path);
        trace!("Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| ClientError::RestResponseError(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| ClientError::RestResponseError(e.to_string()))?;
        if status.is_success() {
            trace!("REST query successful. {status}");
            Ok(text)
        } else {
            debug!("REST query failed. {status}: {text}");
            Err(ClientError::QueryError { status: status.as_u16(), message: text })
        }
    }
}

/// Builds a sensitive header value from a secret, so that it is redacted in reqwest's debug output.
pub fn secret_header(prefix: &str, secret: &Secret<String>) -> Result<HeaderValue, ClientError> {
    let mut val = HeaderValue::from_str(&format!("{prefix}{}", secret.reveal()))
        .map_err(|e| ClientError::Initialization(e.to_string()))?;
    val.set_sensitive(true);
    Ok(val)
}
