use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "STUDYGROUPD_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Local,
    Firebase,
}

impl Backend {
    fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "firebase" => Ok(Backend::Firebase),
            other => Err(anyhow!("unknown backend: {}", other)),
        }
    }
}

/// On-disk shape. Every field is optional; missing ones take defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    backend: Option<Backend>,
    data_dir: Option<PathBuf>,
    database_url: Option<String>,
    api_key: Option<String>,
    request_timeout_ms: Option<u64>,
    retry_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
    log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub log_level: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(2_000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            backend: Backend::Local,
            data_dir: PathBuf::from("studygroup-data"),
            database_url: None,
            api_key: None,
            request_timeout: retry.timeout,
            retry,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the file named by `STUDYGROUPD_CONFIG`, then
    /// individual environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var_os(CONFIG_ENV) {
            Some(p) => Self::from_file(Path::new(&p))?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.to_string_lossy()))?;
        Self::from_json(&text)
            .with_context(|| format!("invalid config file {}", path.to_string_lossy()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let cf: ConfigFile = serde_json::from_str(text)?;
        let mut cfg = Self::default();
        if let Some(b) = cf.backend {
            cfg.backend = b;
        }
        if let Some(d) = cf.data_dir {
            cfg.data_dir = d;
        }
        cfg.database_url = cf.database_url.or(cfg.database_url);
        cfg.api_key = cf.api_key.or(cfg.api_key);
        if let Some(ms) = cf.request_timeout_ms {
            cfg.set_timeout_ms(ms);
        }
        if let Some(n) = cf.retry_attempts {
            cfg.retry.attempts = n;
        }
        if let Some(ms) = cf.retry_base_delay_ms {
            cfg.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = cf.retry_max_delay_ms {
            cfg.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(l) = cf.log_level {
            cfg.log_level = l;
        }
        Ok(cfg)
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(b) = get("STUDYGROUPD_BACKEND") {
            self.backend = Backend::parse(&b)?;
        }
        if let Some(d) = get("STUDYGROUPD_DATA_DIR") {
            self.data_dir = PathBuf::from(d);
        }
        if let Some(u) = get("STUDYGROUPD_DATABASE_URL") {
            self.database_url = Some(u);
        }
        if let Some(k) = get("STUDYGROUPD_API_KEY") {
            self.api_key = Some(k);
        }
        if let Some(ms) = get("STUDYGROUPD_TIMEOUT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .with_context(|| format!("STUDYGROUPD_TIMEOUT_MS is not a number: {}", ms))?;
            self.set_timeout_ms(ms);
        }
        if let Some(l) = get("STUDYGROUPD_LOG") {
            self.log_level = l;
        }
        Ok(())
    }

    fn set_timeout_ms(&mut self, ms: u64) {
        self.request_timeout = Duration::from_millis(ms);
        self.retry.timeout = self.request_timeout;
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.backend == Backend::Firebase {
            if self.database_url.is_none() {
                return Err(anyhow!("firebase backend requires databaseUrl"));
            }
            if self.api_key.is_none() {
                return Err(anyhow!("firebase backend requires apiKey"));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("requestTimeoutMs must be positive"));
        }
        Ok(())
    }
}
