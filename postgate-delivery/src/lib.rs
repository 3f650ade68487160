use std::fmt;
use std::net::IpAddr;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use reqwest::{Client, Url};

use postgate_mail::DeliveryPayload;

/// HTTP Basic credentials of the sending API, the secret is the API key.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Success,
    Failure {
        reason: String,
        /// The request never got an HTTP answer
        transport: bool,
    },
}

impl DeliveryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_matches(|c: char| c == '[' || c == ']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}

pub struct DeliveryClient {
    http: Client,
    endpoint: Url,
    credentials: Credentials,
}

impl DeliveryClient {
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("invalid webhook URL {:?}", endpoint))?;
        // A redirect answer is a refusal, following it would turn the
        // POST into a bodyless GET
        let mut builder = Client::builder()
            .user_agent(concat!("postgate/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::none());
        // Proxies from the environment never apply to a local endpoint
        if is_loopback(&endpoint) {
            builder = builder.no_proxy();
        }
        let http = builder.build().context("unable to build the HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Post the payload once, as multipart/form-data. Nothing is retried.
    pub async fn deliver(&self, payload: DeliveryPayload) -> DeliveryResult {
        let (fields, files) = payload.into_parts();
        let file_count = files.len();

        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        for file in files {
            let part = Part::bytes(file.data).file_name(file.name);
            form = form.part(file.field.as_str(), part);
        }

        let response = self
            .http
            .post(self.endpoint.clone())
            .basic_auth(&self.credentials.user, Some(&self.credentials.secret))
            .multipart(form)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, err = %e, "sending API unreachable");
                return DeliveryResult::Failure {
                    reason: e.to_string(),
                    transport: true,
                };
            }
        };

        let status = response.status();
        if status.as_u16() >= 300 {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "sending API rejected the message");
            return DeliveryResult::Failure {
                reason: format!("{} - {}", status.as_u16(), body),
                transport: false,
            };
        }

        tracing::info!(status = status.as_u16(), files = file_count, "message handed to the sending API");
        DeliveryResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_not_printed() {
        let creds = Credentials::new("api", "key-0123456789");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("api"));
        assert!(!debug.contains("key-0123456789"));
    }

    #[test]
    fn endpoint_must_be_an_url() {
        assert!(DeliveryClient::new("not a url", Credentials::new("api", "k")).is_err());
        let client = DeliveryClient::new(
            "https://api.example.net/v3/example.com/messages",
            Credentials::new("api", "k"),
        )
        .unwrap();
        assert_eq!(client.endpoint().host_str(), Some("api.example.net"));
    }

    #[test]
    fn loopback_endpoints() {
        let url = |s: &str| Url::parse(s).unwrap();
        assert!(is_loopback(&url("http://127.0.0.1:8080/messages")));
        assert!(is_loopback(&url("http://[::1]:8080/messages")));
        assert!(is_loopback(&url("http://localhost/messages")));
        assert!(!is_loopback(&url("https://api.example.net/messages")));
    }
}
