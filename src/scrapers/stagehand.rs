use crate::config::{Config, Credentials};
use crate::error::{Result, ScoutError};
use crate::scrapers::traits::{BrowserAutomation, BrowserLauncher, BrowserSessionInfo};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Remote browser client for a Stagehand-compatible session API
pub struct StagehandClient {
    client: Client,
    api_url: String,
    credentials: Credentials,
    model_name: String,
    model_base_url: Option<String>,
    session_id: RwLock<Option<String>>,
    messages: Mutex<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default = "default_success")]
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartData {
    session_id: Option<String>,
    session_url: Option<String>,
    debug_url: Option<String>,
}

impl StagehandClient {
    pub fn new(
        api_url: impl Into<String>,
        credentials: Credentials,
        model_name: impl Into<String>,
        model_base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rental-scout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScoutError::Automation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            credentials,
            model_name: model_name.into(),
            model_base_url,
            session_id: RwLock::new(None),
            messages: Mutex::new(Vec::new()),
        })
    }

    /// Resume an existing remote session on `init`
    pub fn with_session(self, session_id: Option<&str>) -> Self {
        *self.session_id.write() = session_id.map(str::to_string);
        self
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    fn session_path(&self, action: &str) -> Result<String> {
        let session_id = self.session_id().ok_or_else(|| {
            ScoutError::Automation(format!("cannot {} before the session is initialized", action))
        })?;
        Ok(format!("/sessions/{}/{}", session_id, action))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<Option<T>> {
        let url = format!("{}{}", self.api_url, path);
        debug!(%url, "Calling browser service");

        let response = self
            .client
            .post(&url)
            .header("x-bb-api-key", &self.credentials.browserbase_api_key)
            .header("x-bb-project-id", &self.credentials.browserbase_project_id)
            .header("x-model-api-key", &self.credentials.model_api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%url, %status, "Browser service returned an error status");
            return Err(ScoutError::Automation(format!(
                "{} returned {}: {}",
                path,
                status,
                text.trim()
            )));
        }

        let parsed: ApiResponse<T> = response.json().await.map_err(|e| {
            ScoutError::Automation(format!("{} returned an unreadable body: {}", path, e))
        })?;

        if !parsed.success {
            return Err(ScoutError::Automation(format!(
                "{} failed: {}",
                path,
                parsed.message.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        if let Some(message) = parsed.message.as_deref().map(str::trim) {
            if !message.is_empty() {
                let category = path.rsplit('/').next().unwrap_or("general");
                self.messages
                    .lock()
                    .push(format!("Agent {}: {}", category, message));
            }
        }

        Ok(parsed.data)
    }
}

#[async_trait]
impl BrowserAutomation for StagehandClient {
    async fn init(&self) -> Result<BrowserSessionInfo> {
        let mut body = json!({ "modelName": self.model_name });
        if let Some(base_url) = &self.model_base_url {
            body["modelBaseUrl"] = json!(base_url);
        }
        if let Some(existing) = self.session_id() {
            body["browserbaseSessionID"] = json!(existing);
        }

        let data: StartData = self
            .post("/sessions/start", body)
            .await?
            .ok_or_else(|| ScoutError::Automation("session start returned no data".to_string()))?;

        let session_id = data.session_id.or_else(|| self.session_id());
        *self.session_id.write() = session_id.clone();

        Ok(BrowserSessionInfo {
            session_id,
            session_url: data.session_url,
            debug_url: data.debug_url,
        })
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let path = self.session_path("navigate")?;
        self.post::<Value>(&path, json!({ "url": url })).await?;
        Ok(())
    }

    async fn act(&self, instruction: &str) -> Result<()> {
        let path = self.session_path("act")?;
        self.post::<Value>(&path, json!({ "action": instruction })).await?;
        Ok(())
    }

    async fn extract(&self, instruction: &str, schema: &Value) -> Result<Value> {
        let path = self.session_path("extract")?;
        let data = self
            .post::<Value>(
                &path,
                json!({ "instruction": instruction, "schemaDefinition": schema }),
            )
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    async fn evaluate(&self, script: &str, args: Value) -> Result<Value> {
        let path = self.session_path("evaluate")?;
        let data = self
            .post::<Value>(&path, json!({ "expression": script, "args": args }))
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    async fn close(&self) -> Result<()> {
        if self.session_id().is_none() {
            return Ok(());
        }
        let path = self.session_path("end")?;
        self.post::<Value>(&path, json!({})).await?;
        Ok(())
    }

    fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock())
    }
}

/// Launches HTTP clients against the configured browser service
pub struct StagehandLauncher {
    config: Config,
}

impl StagehandLauncher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl BrowserLauncher for StagehandLauncher {
    fn launch(
        &self,
        credentials: &Credentials,
        session_id: Option<&str>,
    ) -> Result<Box<dyn BrowserAutomation>> {
        let client = StagehandClient::new(
            self.config.stagehand_api_url.clone(),
            credentials.clone(),
            self.config.model_name.clone(),
            self.config.model_base_url.clone(),
            self.config.request_timeout,
        )?
        .with_session(session_id);

        Ok(Box::new(client))
    }
}
