use std::env;

/// Which `DataSource` the process runs against. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    Remote,
    Fixture,
}

impl std::str::FromStr for DataSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(DataSourceKind::Remote),
            "fixture" => Ok(DataSourceKind::Fixture),
            other => Err(anyhow::anyhow!("Unknown DATA_SOURCE: {other}")),
        }
    }
}

/// What to do with a queue item whose recipient or delivery address is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndeliverablePolicy {
    /// Log a skip and leave the item queued.
    #[default]
    LeaveQueued,
    /// Move the item to `failed` with the reason as its error.
    MarkFailed,
}

impl std::str::FromStr for UndeliverablePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "leave-queued" => Ok(UndeliverablePolicy::LeaveQueued),
            "mark-failed" => Ok(UndeliverablePolicy::MarkFailed),
            other => Err(anyhow::anyhow!("Unknown UNDELIVERABLE_POLICY: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_source: DataSourceKind,
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    // FCM HTTP v1 (optional; pushes are logged and dropped without it)
    pub fcm_project_id: Option<String>,
    pub fcm_access_token: Option<String>,
    // SMTP (optional)
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub retention_days: i64,
    pub sweep_interval_hours: u64,
    pub undeliverable_policy: UndeliverablePolicy,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let data_source: DataSourceKind = env::var("DATA_SOURCE")
            .unwrap_or_else(|_| "fixture".into())
            .parse()?;
        let database_url = match data_source {
            DataSourceKind::Remote => Some(required("DATABASE_URL")?),
            DataSourceKind::Fixture => env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
        };

        Ok(Self {
            data_source,
            database_url,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_seconds: env::var("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "3600".into())
                .parse()?,
            fcm_project_id: env::var("FCM_PROJECT_ID").ok().filter(|s| !s.is_empty()),
            fcm_access_token: env::var("FCM_ACCESS_TOKEN").ok().filter(|s| !s.is_empty()),
            smtp_host: env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()),
            smtp_port: env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()),
            smtp_username: env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty()),
            smtp_password: env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty()),
            smtp_from: env::var("SMTP_FROM").ok().filter(|s| !s.is_empty()),
            retention_days: env::var("RETENTION_DAYS")
                .unwrap_or_else(|_| "30".into())
                .parse()?,
            sweep_interval_hours: env::var("SWEEP_INTERVAL_HOURS")
                .unwrap_or_else(|_| "24".into())
                .parse()?,
            undeliverable_policy: env::var("UNDELIVERABLE_POLICY")
                .unwrap_or_else(|_| "leave-queued".into())
                .parse()?,
            admin_email: env::var("ADMIN_EMAIL").ok().filter(|s| !s.is_empty()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Defaults used by tests and local tooling; no external services configured.
    pub fn local(jwt_secret: &str) -> Self {
        Self {
            data_source: DataSourceKind::Fixture,
            database_url: None,
            host: "127.0.0.1".into(),
            port: 8080,
            jwt_secret: jwt_secret.into(),
            jwt_expiry_seconds: 3600,
            fcm_project_id: None,
            fcm_access_token: None,
            smtp_host: None,
            smtp_port: None,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
            retention_days: 30,
            sweep_interval_hours: 24,
            undeliverable_policy: UndeliverablePolicy::LeaveQueued,
            admin_email: None,
            admin_password: None,
        }
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_and_source_names() {
        assert_eq!("mark-failed".parse::<UndeliverablePolicy>().unwrap(), UndeliverablePolicy::MarkFailed);
        assert_eq!(" Leave-Queued ".parse::<UndeliverablePolicy>().unwrap(), UndeliverablePolicy::LeaveQueued);
        assert!("retry".parse::<UndeliverablePolicy>().is_err());
        assert_eq!("REMOTE".parse::<DataSourceKind>().unwrap(), DataSourceKind::Remote);
    }
}
