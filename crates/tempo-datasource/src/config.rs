// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Per-datasource settings, deserialized from the opaque JSON object the
/// plugin host stores for each configured datasource instance.
///
/// The host owns validation of the settings (including that `url` is
/// present); this model only reads them.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TempoDatasourceSettings {
    /// Base URL of the Tempo-compatible backend.
    pub url: String,
    #[serde(default)]
    pub basic_auth: bool,
    #[serde(default)]
    pub basic_auth_user: String,
    #[serde(default)]
    pub basic_auth_password: String,
    /// Forward the signed-in user's OAuth credential to the backend.
    #[serde(default)]
    pub oauth_pass_thru: bool,
    /// Optional HTTPS proxy for outbound backend calls.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Timeout applied to each backend request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl TempoDatasourceSettings {
    /// Parses the plugin host's settings JSON.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::TempoDatasourceSettings;

    #[test]
    fn test_parse_minimal_settings() {
        let settings =
            TempoDatasourceSettings::from_json(r#"{"url": "http://tempo:3200"}"#).unwrap();
        assert_eq!(settings.url, "http://tempo:3200");
        assert!(!settings.basic_auth);
        assert!(!settings.oauth_pass_thru);
        assert_eq!(settings.proxy_url, None);
        assert_eq!(settings.request_timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_settings() {
        let raw = r#"{
            "url": "https://tempo.example.com",
            "basicAuth": true,
            "basicAuthUser": "viewer",
            "basicAuthPassword": "hunter2",
            "oauthPassThru": true,
            "proxyUrl": "https://proxy.internal:3128",
            "requestTimeoutSecs": 5
        }"#;
        let settings = TempoDatasourceSettings::from_json(raw).unwrap();
        assert!(settings.basic_auth);
        assert_eq!(settings.basic_auth_user, "viewer");
        assert_eq!(settings.basic_auth_password, "hunter2");
        assert!(settings.oauth_pass_thru);
        assert_eq!(
            settings.proxy_url.as_deref(),
            Some("https://proxy.internal:3128")
        );
        assert_eq!(settings.request_timeout_secs, 5);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = r#"{"url": "http://tempo:3200", "tlsSkipVerify": true}"#;
        assert!(TempoDatasourceSettings::from_json(raw).is_ok());
    }

    #[test]
    fn test_missing_url_is_an_error() {
        assert!(TempoDatasourceSettings::from_json(r#"{"basicAuth": false}"#).is_err());
    }
}
