use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::types::Params;
use super::RemoteSource;
use crate::config::{Config, ServerConfig};

const CLIENT_AGENT: &str = "aurora-cache terminal client";

/// AURORA REST server reached over HTTPS.
///
/// Every method is a JSON `POST` to `<server>/<method>`.
#[derive(Clone)]
pub struct HttpSource {
  client: reqwest::Client,
  base: Url,
  credentials: Option<(String, String)>,
}

impl HttpSource {
  pub fn new(server: &ServerConfig) -> Result<Self> {
    let mut raw = server.url.trim().to_string();
    if !raw.contains("://") {
      raw = format!("https://{}", raw);
    }
    if !raw.ends_with('/') {
      raw.push('/');
    }
    let base = Url::parse(&raw).map_err(|e| eyre!("Invalid server url {}: {}", server.url, e))?;

    let client = reqwest::Client::builder()
      .user_agent(concat!("aurora-cache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let credentials = match (&server.authtype, Config::get_authstr()) {
      (Some(authtype), Some(authstr)) => Some((authtype.clone(), authstr)),
      _ => None,
    };

    Ok(Self {
      client,
      base,
      credentials,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }
}

#[async_trait]
impl RemoteSource for HttpSource {
  async fn call(&self, method: &str, params: &Params) -> Result<Value> {
    let url = self
      .base
      .join(method)
      .map_err(|e| eyre!("Invalid method name {}: {}", method, e))?;

    let mut body =
      serde_json::to_value(params).map_err(|e| eyre!("Failed to encode params: {}", e))?;
    if let Value::Object(map) = &mut body {
      map.insert("CLIENT_AGENT".into(), CLIENT_AGENT.into());
      map.insert("CLIENT_VERSION".into(), env!("CARGO_PKG_VERSION").into());
      if let Some((authtype, authstr)) = &self.credentials {
        map
          .entry("authtype")
          .or_insert_with(|| authtype.clone().into());
        map
          .entry("authstr")
          .or_insert_with(|| authstr.clone().into());
      }
    }

    debug!(%url, "POST");
    let response = self
      .client
      .post(url)
      .json(&body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach {}: {}", self.base, e))?;

    response
      .json::<Value>()
      .await
      .map_err(|e| eyre!("Failed to read {} response: {}", method, e))
  }
}
