use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;
use sqlx::postgres::PgConnectOptions;
use url::Url;

use crate::error::ConfigError;
use crate::pool::PoolConfig;

pub const MAX_QUERY_LEN: usize = 200;
pub const STATEMENT_SEPARATOR: char = ';';

// Fixed budgets for the shutdown steps that aren't worth a knob.
const PUSH_STOP_GRACE: Duration = Duration::from_secs(5);
const POOL_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "DB_URL", default = "postgres://localhost:5432/postgres")]
    pub database_url: String,

    #[envconfig(from = "DB_USER")]
    pub database_user: Option<String>,

    #[envconfig(from = "DB_PASSWORD")]
    pub database_password: Option<String>,

    #[envconfig(from = "DB_POOL_SIZE", default = "2")]
    pub pool_size: u32,

    #[envconfig(from = "DB_MIN_IDLE", default = "1")]
    pub pool_min_idle: u32,

    #[envconfig(from = "DB_CONNECT_TIMEOUT_SECS", default = "30")]
    pub connect_timeout_secs: u64,

    #[envconfig(from = "DB_IDLE_TIMEOUT_SECS", default = "600")]
    pub idle_timeout_secs: u64,

    #[envconfig(from = "DB_MAX_LIFETIME_SECS", default = "1800")]
    pub max_lifetime_secs: u64,

    #[envconfig(from = "DB_QUERY", default = "SELECT 1")]
    pub query: String,

    #[envconfig(from = "INTERVAL_SECONDS", default = "30")]
    pub interval_secs: u64,

    #[envconfig(from = "READINESS_TIMEOUT_SECS", default = "3")]
    pub readiness_timeout_secs: u64,

    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "HEALTH_PORT", default = "8080")]
    pub health_port: u16,

    #[envconfig(from = "METRICS_PORT", default = "9090")]
    pub metrics_port: u16,

    #[envconfig(from = "METRICS_PUSHGATEWAY_URL")]
    pub pushgateway_url: Option<String>,

    #[envconfig(from = "METRICS_PERSIST_FILE")]
    pub persist_file: Option<String>,

    #[envconfig(from = "METRICS_PUSH_INTERVAL_SECS", default = "60")]
    pub push_interval_secs: u64,

    #[envconfig(from = "METRICS_PUSH_JOB", default = "db-health-check")]
    pub push_job: String,

    #[envconfig(from = "SHUTDOWN_GRACE_SECS", default = "30")]
    pub shutdown_grace_secs: u64,

    #[envconfig(from = "LISTENER_DRAIN_SECS", default = "10")]
    pub listener_drain_secs: u64,

    #[envconfig(from = "LOG_JSON", default = "false")]
    pub log_json: bool,
}

/// Everything the core needs, validated. Built once at startup, immutable afterwards.
pub struct Settings {
    pub probe: ProbeConfig,
    pub schedule: ScheduleConfig,
    pub pool: PoolConfig,
    pub push: PushConfig,
    pub listeners: ListenerConfig,
    pub shutdown: ShutdownConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::init_from_env()?)
    }

    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let probe = ProbeConfig::new(&self.query, self.readiness_timeout_secs)?;

        let schedule = ScheduleConfig {
            interval: Duration::from_secs(self.interval_secs),
        };

        if self.pool_size == 0 {
            return Err(ConfigError::ZeroValue("DB_POOL_SIZE"));
        }
        let mut connect_options = PgConnectOptions::from_str(&self.database_url)
            .map_err(ConfigError::InvalidDatabaseUrl)?;
        if let Some(user) = non_blank(&self.database_user) {
            connect_options = connect_options.username(user);
        }
        if let Some(password) = non_blank(&self.database_password) {
            connect_options = connect_options.password(password);
        }
        let pool = PoolConfig {
            connect_options,
            max_connections: self.pool_size,
            min_connections: self.pool_min_idle.min(self.pool_size),
            acquire_timeout: Duration::from_secs(self.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_lifetime: Duration::from_secs(self.max_lifetime_secs),
        };

        let gateway_url = match non_blank(&self.pushgateway_url) {
            Some(raw) => Some(parse_gateway_url(raw)?),
            None => None,
        };
        if self.push_interval_secs == 0 {
            return Err(ConfigError::ZeroValue("METRICS_PUSH_INTERVAL_SECS"));
        }
        let push = PushConfig {
            gateway_url,
            file: non_blank(&self.persist_file).map(PathBuf::from),
            job: self.push_job.clone(),
            interval: Duration::from_secs(self.push_interval_secs),
        };

        let listeners = ListenerConfig {
            host: self.host.clone(),
            health_port: self.health_port,
            metrics_port: self.metrics_port,
        };

        let shutdown = ShutdownConfig {
            scheduler_grace: Duration::from_secs(self.shutdown_grace_secs),
            listener_drain: Duration::from_secs(self.listener_drain_secs),
            push_grace: PUSH_STOP_GRACE,
            pool_close: POOL_CLOSE_TIMEOUT,
        };

        Ok(Settings {
            probe,
            schedule,
            pool,
            push,
            listeners,
            shutdown,
        })
    }

    /// The connection URL with credentials replaced, safe to log.
    pub fn masked_database_url(&self) -> String {
        mask_url(&self.database_url)
    }
}

/// The probe query and the timeout applied to bounded readiness pings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    query: String,
    timeout: Duration,
}

impl ProbeConfig {
    /// Trims `query` and rejects it when empty, longer than [`MAX_QUERY_LEN`] characters or
    /// containing a statement separator.
    pub fn new(query: &str, timeout_secs: u64) -> Result<Self, ConfigError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ConfigError::EmptyQuery);
        }
        let len = query.chars().count();
        if len > MAX_QUERY_LEN {
            return Err(ConfigError::QueryTooLong {
                len,
                max: MAX_QUERY_LEN,
            });
        }
        if query.contains(STATEMENT_SEPARATOR) {
            return Err(ConfigError::QueryHasSeparator);
        }
        if timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("READINESS_TIMEOUT_SECS"));
        }

        Ok(Self {
            query: query.to_owned(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Delay between the end of one probe and the start of the next. Zero runs back-to-back.
    pub interval: Duration,
}

#[derive(Clone, Debug)]
pub struct PushConfig {
    pub gateway_url: Option<Url>,
    pub file: Option<PathBuf>,
    pub job: String,
    pub interval: Duration,
}

impl PushConfig {
    /// The push timer only runs when at least one destination is configured.
    pub fn is_enabled(&self) -> bool {
        self.gateway_url.is_some() || self.file.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ListenerConfig {
    pub host: String,
    pub health_port: u16,
    pub metrics_port: u16,
}

impl ListenerConfig {
    pub fn health_bind(&self) -> String {
        format!("{}:{}", self.host, self.health_port)
    }

    pub fn metrics_bind(&self) -> String {
        format!("{}:{}", self.host, self.metrics_port)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ShutdownConfig {
    /// How long an in-flight scheduled probe may run on after shutdown starts.
    pub scheduler_grace: Duration,
    /// How long listeners get to finish in-flight requests.
    pub listener_drain: Duration,
    pub push_grace: Duration,
    pub pool_close: Duration,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_gateway_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedPushUrl(mask_url(raw)));
    }
    Ok(url)
}

fn mask_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return "<unparseable url>".to_owned();
    };
    if url.password().is_some() {
        // Only fails for cannot-be-a-base URLs, which carry no password anyway.
        drop(url.set_password(Some("***")));
    }
    let has_secret_param = url
        .query_pairs()
        .any(|(k, _)| k.eq_ignore_ascii_case("password"));
    if has_secret_param {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("password") {
                    (k.into_owned(), "***".to_owned())
                } else {
                    (k.into_owned(), v.into_owned())
                }
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}
