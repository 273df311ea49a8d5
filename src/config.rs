use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;

use crate::error::StoreError;

pub const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";
pub const DEFAULT_EVENTS_TABLE: &str = "Funnel Events";

/// Upstream store settings. Values are only checked when a request needs
/// them, so a missing key fails that request and nothing else.
#[derive(Debug, Clone, Args)]
pub struct StoreConfig {
    #[arg(long, env = "AIRTABLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "AIRTABLE_BASE_ID")]
    pub base_id: Option<String>,

    /// Name of the people table
    #[arg(long, env = "AIRTABLE_TABLE_NAME")]
    pub people_table: Option<String>,

    #[arg(long, env = "AIRTABLE_EVENTS_TABLE", default_value = DEFAULT_EVENTS_TABLE)]
    pub events_table: String,

    #[arg(long, env = "AIRTABLE_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

/// Validated view of [`StoreConfig`].
#[derive(Debug, Clone, Copy)]
pub struct StoreCredentials<'a> {
    pub api_key: &'a str,
    pub base_id: &'a str,
    pub people_table: &'a str,
    pub events_table: &'a str,
    pub api_url: &'a str,
}

impl StoreConfig {
    pub fn require(&self) -> Result<StoreCredentials<'_>, StoreError> {
        let api_key = required(self.api_key.as_deref(), "AIRTABLE_API_KEY")?;
        let base_id = required(self.base_id.as_deref(), "AIRTABLE_BASE_ID")?;
        let people_table = required(self.people_table.as_deref(), "AIRTABLE_TABLE_NAME")?;

        Ok(StoreCredentials {
            api_key,
            base_id,
            people_table,
            events_table: &self.events_table,
            api_url: self.api_url.trim_end_matches('/'),
        })
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, StoreError> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(StoreError::Config(format!("{name} must be set"))),
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    #[arg(long, env = "DASHBOARD_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    #[arg(long, env = "DASHBOARD_REFRESH_SECS", default_value_t = 30)]
    pub refresh_interval_secs: u64,
}

impl ServeConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>, base_id: Option<&str>, table: Option<&str>) -> StoreConfig {
        StoreConfig {
            api_key: api_key.map(str::to_string),
            base_id: base_id.map(str::to_string),
            people_table: table.map(str::to_string),
            events_table: DEFAULT_EVENTS_TABLE.to_string(),
            api_url: format!("{DEFAULT_API_URL}/"),
        }
    }

    #[test]
    fn complete_config_is_accepted() {
        let config = config(Some("key"), Some("app123"), Some("People"));
        let creds = config.require().unwrap();
        assert_eq!(creds.base_id, "app123");
        assert_eq!(creds.people_table, "People");
        assert_eq!(creds.events_table, "Funnel Events");
        assert_eq!(creds.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn missing_values_name_the_variable() {
        let err = config(None, Some("app"), Some("People")).require().unwrap_err();
        assert!(err.to_string().contains("AIRTABLE_API_KEY"));

        let err = config(Some("key"), Some("  "), Some("People")).require().unwrap_err();
        assert!(err.to_string().contains("AIRTABLE_BASE_ID"));

        let err = config(Some("key"), Some("app"), None).require().unwrap_err();
        assert!(matches!(err, StoreError::Config(ref msg) if msg.contains("AIRTABLE_TABLE_NAME")));
    }
}
