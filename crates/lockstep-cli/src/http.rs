//! The production [`UrlResolver`]: a `reqwest` client following redirects
//! with a HEAD request.
//!
//! Classification follows the toolkit's failure taxonomy: timeouts and 5xx
//! are transient, 4xx and malformed URLs are permanent, and a redirect
//! chain past the limit is permanent (a loop will not converge on retry).

use std::time::Duration;

use anyhow::Context as _;
use lockstep_core::resolver::UrlResolver;
use lockstep_core::store::ResolveOutcome;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::redirect::Policy;

pub struct HttpResolverConfig {
  pub timeout:       Duration,
  pub max_redirects: usize,
  pub user_agent:    String,
  /// Contact email for the From header, good-netizen style.
  pub from:          Option<String>,
}

pub struct HttpResolver {
  client: reqwest::Client,
}

impl HttpResolver {
  pub fn new(config: &HttpResolverConfig) -> anyhow::Result<Self> {
    let mut headers = HeaderMap::new();
    if let Some(from) = &config.from {
      headers.insert(
        reqwest::header::FROM,
        HeaderValue::from_str(from).context("invalid From header value")?,
      );
    }

    let client = reqwest::Client::builder()
      .timeout(config.timeout)
      .redirect(Policy::limited(config.max_redirects))
      .user_agent(&config.user_agent)
      .default_headers(headers)
      .build()
      .context("failed to build HTTP client")?;

    Ok(Self { client })
  }
}

/// Corpus URL columns routinely omit the scheme ("www.example.com/x");
/// default those to http so they are requestable at all.
fn request_url(url: &str) -> String {
  if url.contains("://") {
    url.to_owned()
  } else {
    format!("http://{url}")
  }
}

impl UrlResolver for HttpResolver {
  async fn resolve(&self, url: &str) -> ResolveOutcome {
    match self.client.head(request_url(url)).send().await {
      Ok(response) => {
        let status = response.status();
        if status.is_server_error() {
          ResolveOutcome::TransientFailure(format!("http {}", status.as_u16()))
        } else if status.is_client_error() {
          ResolveOutcome::PermanentFailure(format!("http {}", status.as_u16()))
        } else {
          // Whatever URL the chain ended on is the canonical form.
          ResolveOutcome::Resolved(response.url().to_string())
        }
      }
      Err(e) if e.is_timeout() => {
        ResolveOutcome::TransientFailure("timeout".into())
      }
      Err(e) if e.is_redirect() => {
        ResolveOutcome::PermanentFailure("too_many_redirects".into())
      }
      Err(e) if e.is_connect() => {
        ResolveOutcome::TransientFailure("connection failed".into())
      }
      Err(e) if e.is_builder() => {
        ResolveOutcome::PermanentFailure(format!("malformed url: {e}"))
      }
      Err(e) => ResolveOutcome::TransientFailure(e.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn schemeless_urls_default_to_http() {
    assert_eq!(request_url("www.example.com/x"), "http://www.example.com/x");
    assert_eq!(request_url("https://example.com"), "https://example.com");
  }
}
