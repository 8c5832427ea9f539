use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    /// Base URL of the retrieval gateway that performs the authenticated
    /// profile/listing fetches.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum spacing between item fetches, before jitter.
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,
    /// Persist `processed_items` to the job row every N items.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: i64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            timeout_secs: default_timeout_secs(),
            min_delay_secs: default_min_delay_secs(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

fn default_gateway_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_min_delay_secs() -> u64 {
    3
}
fn default_checkpoint_every() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Maximum job-units processed per calendar day.
    #[serde(default = "default_daily_quota")]
    pub daily_quota: u32,
    /// Maximum jobs pulled per dispatch tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Enrollment dedup window in days.
    #[serde(default = "default_dedup_days")]
    pub dedup_days: u32,
    #[serde(default = "default_tick_minutes")]
    pub tick_minutes: u64,
    /// Uniform inter-job delay bounds in seconds.
    #[serde(default = "default_job_delay_min_secs")]
    pub job_delay_min_secs: u64,
    #[serde(default = "default_job_delay_max_secs")]
    pub job_delay_max_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_quota: default_daily_quota(),
            batch_size: default_batch_size(),
            dedup_days: default_dedup_days(),
            tick_minutes: default_tick_minutes(),
            job_delay_min_secs: default_job_delay_min_secs(),
            job_delay_max_secs: default_job_delay_max_secs(),
        }
    }
}

fn default_daily_quota() -> u32 {
    200
}
fn default_batch_size() -> u32 {
    10
}
fn default_dedup_days() -> u32 {
    7
}
fn default_tick_minutes() -> u64 {
    30
}
fn default_job_delay_min_secs() -> u64 {
    5
}
fn default_job_delay_max_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifyConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_classify_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_secs")]
    pub batch_delay_secs: u64,
    #[serde(default = "default_account_delay_secs")]
    pub account_delay_secs: u64,
    /// Accounts picked up per `process_pending` pass.
    #[serde(default = "default_pending_limit")]
    pub pending_limit: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_analysis_interval_secs")]
    pub analysis_interval_secs: u64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            batch_size: default_classify_batch_size(),
            batch_delay_secs: default_batch_delay_secs(),
            account_delay_secs: default_account_delay_secs(),
            pending_limit: default_pending_limit(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            analysis_interval_secs: default_analysis_interval_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_classify_batch_size() -> usize {
    20
}
fn default_batch_delay_secs() -> u64 {
    1
}
fn default_account_delay_secs() -> u64 {
    5
}
fn default_pending_limit() -> i64 {
    5
}
fn default_max_retries() -> u32 {
    5
}
fn default_analysis_interval_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    /// Newline-delimited file of proxy URLs. No file means every request
    /// goes out on a direct connection.
    #[serde(default)]
    pub list_path: Option<PathBuf>,
    #[serde(default = "default_reload_floor")]
    pub reload_floor: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            list_path: None,
            reload_floor: default_reload_floor(),
        }
    }
}

fn default_reload_floor() -> usize {
    3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.scheduler.daily_quota == 0 {
        anyhow::bail!("scheduler.daily_quota must be > 0");
    }
    if config.scheduler.batch_size == 0 {
        anyhow::bail!("scheduler.batch_size must be > 0");
    }
    if config.scheduler.job_delay_min_secs > config.scheduler.job_delay_max_secs {
        anyhow::bail!("scheduler.job_delay_min_secs must be <= job_delay_max_secs");
    }
    if config.classify.batch_size == 0 {
        anyhow::bail!("classify.batch_size must be > 0");
    }
    if config.classify.pending_limit < 1 {
        anyhow::bail!("classify.pending_limit must be >= 1");
    }
    if config.crawler.checkpoint_every < 1 {
        anyhow::bail!("crawler.checkpoint_every must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: Config = toml::from_str("[db]\npath = \"data/sociograph.sqlite\"\n").unwrap();
        assert_eq!(cfg.scheduler.daily_quota, 200);
        assert_eq!(cfg.scheduler.batch_size, 10);
        assert_eq!(cfg.scheduler.dedup_days, 7);
        assert_eq!(cfg.classify.batch_size, 20);
        assert_eq!(cfg.proxy.reload_floor, 3);
        assert_eq!(cfg.crawler.min_delay_secs, 3);
    }

    #[test]
    fn delay_bounds_validated() {
        let toml = r#"
[db]
path = "data/sociograph.sqlite"

[scheduler]
job_delay_min_secs = 20
job_delay_max_secs = 10
"#;
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), toml).unwrap();
        let err = load_config(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("job_delay_min_secs"));
    }
}
