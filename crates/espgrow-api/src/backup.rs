// HTTP side-channel for configuration backup and restore.
//
// The controller serves these next to the WebSocket endpoint. A backup is
// the raw device, rule and sensor collections exactly as stored; restore
// replaces all three and the controller re-broadcasts them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::Error;

const BACKUP_PATH: &str = "/api/config/backup";
const RESTORE_PATH: &str = "/api/config/restore";

/// Full configuration snapshot as stored on the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub devices: Vec<Value>,
    pub rules: Vec<Value>,
    pub sensors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the backup/restore endpoints.
#[derive(Debug, Clone)]
pub struct BackupClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BackupClient {
    /// Build a client for the controller behind `ws_url`.
    pub fn new(ws_url: &Url, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("espgrow/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: http_base_url(ws_url)?,
        })
    }

    /// Build from an existing `reqwest::Client` and HTTP base URL.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Download the controller's configuration.
    pub async fn backup(&self) -> Result<ConfigBundle, Error> {
        let url = self.base_url.join(BACKUP_PATH)?;
        tracing::debug!(url = %url, "fetching config backup");

        let resp = self.http.get(url).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Replace the controller's configuration with `bundle`.
    pub async fn restore(&self, bundle: &ConfigBundle) -> Result<(), Error> {
        let url = self.base_url.join(RESTORE_PATH)?;
        tracing::info!(
            url = %url,
            devices = bundle.devices.len(),
            rules = bundle.rules.len(),
            sensors = bundle.sensors.len(),
            "restoring config"
        );

        let resp = self.http.post(url).json(bundle).send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);

    Err(Error::Http {
        status: status.as_u16(),
        message,
    })
}

/// `ws://host:port/ws` -> `http://host:port/`, `wss` -> `https`.
pub fn http_base_url(ws_url: &Url) -> Result<Url, Error> {
    let scheme = match ws_url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(Error::WebSocketConnect(format!(
                "unsupported URL scheme '{other}'"
            )));
        }
    };

    let host = ws_url.host_str().ok_or(url::ParseError::EmptyHost)?;
    let base = match ws_url.port() {
        Some(port) => format!("{scheme}://{host}:{port}/"),
        None => format!("{scheme}://{host}/"),
    };
    Ok(Url::parse(&base)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_from_ws() {
        let ws = Url::parse("ws://192.168.1.40/ws").unwrap();
        assert_eq!(http_base_url(&ws).unwrap().as_str(), "http://192.168.1.40/");
    }

    #[test]
    fn base_url_keeps_port_and_upgrades_tls() {
        let ws = Url::parse("wss://grow.local:8443/ws").unwrap();
        assert_eq!(
            http_base_url(&ws).unwrap().as_str(),
            "https://grow.local:8443/"
        );
    }

    #[test]
    fn base_url_rejects_other_schemes() {
        let ws = Url::parse("mqtt://broker/ws").unwrap();
        assert!(http_base_url(&ws).is_err());
    }
}
