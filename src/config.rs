use crate::error::{Result, ScoutError};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_STAGEHAND_API_URL: &str = "https://api.stagehand.browserbase.com/v1";

/// Runtime configuration, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub browserbase_api_key: Option<String>,
    pub browserbase_project_id: Option<String>,
    pub model_api_key: Option<String>,
    pub model_name: String,
    pub model_base_url: Option<String>,
    pub stagehand_api_url: String,
    /// Listings returned when the caller gives no limit
    pub default_limit: u32,
    /// Largest caller-facing limit
    pub max_limit: u32,
    /// Fetch window bounds for the extraction call
    pub fetch_window_min: u32,
    pub fetch_window_max: u32,
    /// Per-call timeout for the browser service
    pub request_timeout: Duration,
    /// Budget for one whole extraction run, retries included
    pub run_timeout: Duration,
}

/// Credentials every run needs before touching the browser service
#[derive(Debug, Clone)]
pub struct Credentials {
    pub browserbase_api_key: String,
    pub browserbase_project_id: String,
    pub model_api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browserbase_api_key: None,
            browserbase_project_id: None,
            model_api_key: None,
            model_name: DEFAULT_MODEL.to_string(),
            model_base_url: None,
            stagehand_api_url: DEFAULT_STAGEHAND_API_URL.to_string(),
            default_limit: 3,
            max_limit: 25,
            fetch_window_min: 25,
            fetch_window_max: 50,
            request_timeout: Duration::from_secs(120),
            run_timeout: Duration::from_secs(600),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            browserbase_api_key: non_empty_var("BROWSERBASE_API_KEY"),
            browserbase_project_id: non_empty_var("BROWSERBASE_PROJECT_ID"),
            model_api_key: non_empty_var("OPENAI_API_KEY")
                .or_else(|| non_empty_var("CONVEX_OPENAI_API_KEY")),
            model_name: non_empty_var("STAGEHAND_MODEL").unwrap_or(defaults.model_name),
            model_base_url: non_empty_var("OPENAI_BASE_URL"),
            stagehand_api_url: non_empty_var("STAGEHAND_API_URL")
                .unwrap_or(defaults.stagehand_api_url),
            default_limit: parsed_var("SCOUT_DEFAULT_LIMIT")?.unwrap_or(defaults.default_limit),
            max_limit: parsed_var("SCOUT_MAX_LIMIT")?.unwrap_or(defaults.max_limit),
            fetch_window_min: parsed_var("SCOUT_FETCH_MIN")?.unwrap_or(defaults.fetch_window_min),
            fetch_window_max: parsed_var("SCOUT_FETCH_MAX")?.unwrap_or(defaults.fetch_window_max),
            request_timeout: parsed_var("SCOUT_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            run_timeout: parsed_var("SCOUT_RUN_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.run_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.fetch_window_min == 0 || self.fetch_window_min > self.fetch_window_max {
            return Err(ScoutError::Config(format!(
                "fetch window bounds {}..{} are invalid",
                self.fetch_window_min, self.fetch_window_max
            )));
        }
        if self.max_limit == 0 || self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ScoutError::Config(format!(
                "default limit {} must be within 1..={}",
                self.default_limit, self.max_limit
            )));
        }
        Ok(())
    }

    /// Resolve the required credentials; a missing one is fatal
    pub fn credentials(&self) -> Result<Credentials> {
        let browserbase_api_key = required(&self.browserbase_api_key, "BROWSERBASE_API_KEY")?;
        let browserbase_project_id =
            required(&self.browserbase_project_id, "BROWSERBASE_PROJECT_ID")?;
        let model_api_key = required(
            &self.model_api_key,
            "OPENAI_API_KEY (or CONVEX_OPENAI_API_KEY)",
        )?;

        Ok(Credentials {
            browserbase_api_key,
            browserbase_project_id,
            model_api_key,
        })
    }

    /// Caller-facing result limit, defaulted and clamped to 1..=max_limit
    pub fn result_limit(&self, requested: Option<u32>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit) as usize
    }

    /// Raw cards to request from the page, wider than the result limit to
    /// absorb filtering loss. An absent limit asks for the full window.
    pub fn fetch_window(&self, requested: Option<u32>) -> usize {
        match requested {
            Some(limit) => limit
                .max(1)
                .clamp(self.fetch_window_min, self.fetch_window_max) as usize,
            None => self.fetch_window_max as usize,
        }
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ScoutError::Config(format!("Missing {} environment variable", name)))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ScoutError::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(None),
    }
}
