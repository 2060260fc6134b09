// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokenadmin_app::{
    ActionMethod, CellAction, EnrollParams, ListRequest, ListRow, Page, QueryParams, ViewKind,
};
use tracing::debug;
use url::Url;

/// Outcome of a `/token/init` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollResponse {
    pub serial: String,
    /// `otpauth://` provisioning URL, when the token type has one.
    pub otpauth_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, auth_token: Option<&str>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("server.base_url must not be empty -- set it in the config file");
        }
        Url::parse(&base_url).with_context(|| {
            format!("server.base_url {base_url:?} is not a URL -- use e.g. https://pi.example.com")
        })?;

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            auth_token: auth_token
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_owned),
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_auth_token(&self) -> bool {
        self.auth_token.is_some()
    }

    /// Full URL for `path` with `params` as the query string.
    pub fn url(&self, path: &str, params: &QueryParams) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .with_context(|| format!("build URL for {path}"))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        Ok(url)
    }

    pub fn ping(&self) -> Result<()> {
        let url = self.url("/healthz/", &QueryParams::new())?;
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        Ok(())
    }

    /// One page of `view` as raw JSON items.
    pub fn fetch_raw_page(&self, view: ViewKind, params: &QueryParams) -> Result<Page<Value>> {
        let url = self.url(view.endpoint(), params)?;
        let envelope = self.send(self.request(Method::GET, url))?;
        let mut value = envelope.value()?;

        let items = match value.get_mut(view.items_key()).map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => bail!(
                "{} list response has {:?} as {}, expected an array",
                view.label(),
                other,
                view.items_key()
            ),
        };
        let count = match value.get("count").and_then(Value::as_u64) {
            Some(count) => usize::try_from(count).context("item count out of range")?,
            None => items.len(),
        };
        Ok(Page { items, count })
    }

    pub fn fetch_page<T: DeserializeOwned>(
        &self,
        view: ViewKind,
        params: &QueryParams,
    ) -> Result<Page<T>> {
        self.fetch_raw_page(view, params)?
            .try_map(serde_json::from_value)
            .with_context(|| format!("decode {} rows", view.label()))
    }

    /// Fetches the page `request` describes for row type `T`.
    pub fn fetch_list<T: ListRow>(&self, request: &ListRequest) -> Result<Page<T>> {
        let params = request.to_query(&T::VIEW.classification());
        self.fetch_page(T::VIEW, &params)
    }

    /// Runs a cell action and returns the server's `value`.
    pub fn perform(&self, action: &CellAction) -> Result<Value> {
        let url = self.url(&action.path, &QueryParams::new())?;
        let method = match action.method {
            ActionMethod::Post => Method::POST,
            ActionMethod::Delete => Method::DELETE,
        };
        let mut builder = self.request(method, url);
        if !action.body.is_null() {
            builder = builder.json(&action.body);
        }
        let envelope = self
            .send(builder)
            .with_context(|| format!("{} failed", action.description))?;
        envelope.value()
    }

    pub fn enroll_token(&self, params: &EnrollParams) -> Result<EnrollResponse> {
        let url = self.url("/token/init", &QueryParams::new())?;
        let envelope = self
            .send(self.request(Method::POST, url).json(params))
            .context("enroll token")?;

        let detail = envelope.detail.unwrap_or(Value::Null);
        let serial = detail
            .get("serial")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("enrollment response carries no serial"))?
            .to_owned();
        let otpauth_url = detail
            .get("googleurl")
            .and_then(|url| url.get("value"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        Ok(EnrollResponse {
            serial,
            otpauth_url,
        })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, url = %url, "sending request");
        let builder = self.http.request(method, url);
        match &self.auth_token {
            Some(token) => builder.header(AUTHORIZATION, token),
            None => builder,
        }
    }

    fn send(&self, builder: RequestBuilder) -> Result<Envelope> {
        let response = builder
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let envelope: Envelope = response.json().context("decode server response")?;
        debug!(status = status.as_u16(), ok = envelope.result.status, "response received");
        Ok(envelope)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: ResultBody,
    #[serde(default)]
    detail: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResultBody {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error: Option<ServerError>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

impl Envelope {
    fn value(self) -> Result<Value> {
        if !self.result.status {
            return Err(match self.result.error {
                Some(error) => server_error_message(&error),
                None => anyhow!("server reported failure without a message"),
            });
        }
        Ok(self.result.value.unwrap_or(Value::Null))
    }
}

fn server_error_message(error: &ServerError) -> anyhow::Error {
    match error.code {
        Some(code) => anyhow!("server error {code}: {}", error.message),
        None => anyhow!("server error: {}", error.message),
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!(
            "{} did not answer in time -- raise [server].timeout or check the server ({})",
            base_url,
            error
        );
    }
    anyhow!(
        "cannot reach {} -- check [server].base_url and that the server is running ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if status == StatusCode::UNAUTHORIZED {
        return anyhow!(
            "server rejected the request ({}) -- set [server].auth_token or TOKENADMIN_AUTH_TOKEN",
            status.as_u16()
        );
    }

    if let Ok(parsed) = serde_json::from_str::<Envelope>(body)
        && let Some(error) = parsed.result.error
        && !error.message.is_empty()
    {
        return anyhow!(
            "server error ({}): {}",
            status.as_u16(),
            server_error_message(&error)
        );
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

#[cfg(test)]
mod tests {
    use super::{Client, Envelope, clean_error_response};
    use anyhow::Result;
    use reqwest::StatusCode;
    use std::time::Duration;
    use tokenadmin_app::QueryParams;

    #[test]
    fn new_rejects_empty_and_malformed_base_urls() {
        let error = Client::new("  ", None, Duration::from_secs(1)).expect_err("empty url");
        assert!(error.to_string().contains("base_url"));
        assert!(Client::new("not a url", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn blank_auth_token_counts_as_missing() -> Result<()> {
        let client = Client::new("http://127.0.0.1:1/", Some("  "), Duration::from_secs(1))?;
        assert!(!client.has_auth_token());
        assert_eq!(client.base_url(), "http://127.0.0.1:1");
        Ok(())
    }

    #[test]
    fn url_encodes_query_params() -> Result<()> {
        let client = Client::new("http://127.0.0.1:1", None, Duration::from_secs(1))?;
        let params: QueryParams = [
            ("serial".to_owned(), "*oath 1*".to_owned()),
            ("page".to_owned(), "1".to_owned()),
        ]
        .into_iter()
        .collect();
        let url = client.url("/token/", &params)?;
        assert_eq!(url.path(), "/token/");
        assert_eq!(url.query(), Some("page=1&serial=*oath+1*"));
        Ok(())
    }

    #[test]
    fn failed_envelope_reports_code_and_message() -> Result<()> {
        let envelope: Envelope = serde_json::from_str(
            r#"{"result":{"status":false,"error":{"code":303,"message":"no such token"}}}"#,
        )?;
        let error = envelope.value().expect_err("status false");
        assert_eq!(error.to_string(), "server error 303: no such token");
        Ok(())
    }

    #[test]
    fn clean_error_response_prefers_server_message() {
        let body = r#"{"result":{"status":false,"error":{"code":4033,"message":"denied"}}}"#;
        let message = clean_error_response(StatusCode::FORBIDDEN, body).to_string();
        assert_eq!(message, "server error (403): server error 4033: denied");

        let unauthorized = clean_error_response(StatusCode::UNAUTHORIZED, "").to_string();
        assert!(unauthorized.contains("auth_token"), "{unauthorized}");

        let plain = clean_error_response(StatusCode::BAD_GATEWAY, "upstream down").to_string();
        assert_eq!(plain, "server error (502): upstream down");

        let opaque = clean_error_response(StatusCode::INTERNAL_SERVER_ERROR, "<html>").to_string();
        assert_eq!(opaque, "server error (500): <html>");
    }
}
