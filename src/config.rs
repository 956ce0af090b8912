//! Connection settings for the upstream services.
//!
//! Each group is a clap `Args` struct so the binaries can flatten them into
//! their own CLI; every flag also reads from the environment.

use clap::Args;

use crate::error::{Error, Result};

pub const DEFAULT_ACRCLOUD_HOST: &str = "identify-eu-west-1.acrcloud.com";
pub const DEFAULT_BASE44_API_URL: &str = "https://app.base44.com/api";
pub const DEFAULT_BASE44_APP_ID: &str = "691a4d96d819355b52c063f3";

/// ACRCloud identification credentials
#[derive(Args, Debug, Clone, Default)]
pub struct AcrCloudConfig {
    #[arg(long = "acrcloud-host", env = "ACRCLOUD_HOST", default_value = DEFAULT_ACRCLOUD_HOST)]
    pub host: String,

    #[arg(long = "acrcloud-access-key", env = "ACRCLOUD_ACCESS_KEY", default_value = "", hide_env_values = true)]
    pub access_key: String,

    #[arg(long = "acrcloud-access-secret", env = "ACRCLOUD_ACCESS_SECRET", default_value = "", hide_env_values = true)]
    pub access_secret: String,

    /// Request timeout in seconds
    #[arg(id = "acrcloud_timeout", long = "acrcloud-timeout", default_value = "30")]
    pub timeout_secs: u64,
}

impl AcrCloudConfig {
    /// Both keys are required before any identify call.
    pub fn validate(&self) -> Result<()> {
        if self.access_key.is_empty() || self.access_secret.is_empty() {
            return Err(Error::Config(
                "ACRCloud not configured: set ACRCLOUD_ACCESS_KEY and ACRCLOUD_ACCESS_SECRET".into(),
            ));
        }
        if self.host.is_empty() {
            return Err(Error::Config("ACRCLOUD_HOST is empty".into()));
        }
        Ok(())
    }

    pub fn identify_url(&self) -> String {
        format!("https://{}{}", self.host, crate::acrcloud::IDENTIFY_URI)
    }
}

/// Base44 catalog endpoint
#[derive(Args, Debug, Clone)]
pub struct Base44Config {
    #[arg(long = "base44-api-url", env = "BASE44_API_URL", default_value = DEFAULT_BASE44_API_URL)]
    pub api_url: String,

    #[arg(long = "base44-app-id", env = "BASE44_APP_ID", default_value = DEFAULT_BASE44_APP_ID)]
    pub app_id: String,

    /// Request timeout in seconds
    #[arg(id = "base44_timeout", long = "base44-timeout", default_value = "10")]
    pub timeout_secs: u64,
}

impl Default for Base44Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BASE44_API_URL.to_string(),
            app_id: DEFAULT_BASE44_APP_ID.to_string(),
            timeout_secs: 10,
        }
    }
}

impl Base44Config {
    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() || self.app_id.is_empty() {
            return Err(Error::Config("BASE44_API_URL and BASE44_APP_ID must be set".into()));
        }
        Ok(())
    }

    /// `{api}/apps/{app}/entities/{entity}`
    pub fn entity_url(&self, entity: &str) -> String {
        format!(
            "{}/apps/{}/entities/{}",
            self.api_url.trim_end_matches('/'),
            self.app_id,
            entity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acrcloud_requires_keys() {
        let mut config = AcrCloudConfig {
            host: DEFAULT_ACRCLOUD_HOST.to_string(),
            timeout_secs: 30,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.access_key = "key".into();
        config.access_secret = "secret".into();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.identify_url(),
            "https://identify-eu-west-1.acrcloud.com/v1/identify"
        );
    }

    #[test]
    fn test_entity_url() {
        let config = Base44Config {
            api_url: "https://app.base44.com/api/".into(),
            ..Default::default()
        };
        assert_eq!(
            config.entity_url("Track"),
            "https://app.base44.com/api/apps/691a4d96d819355b52c063f3/entities/Track"
        );
    }
}
