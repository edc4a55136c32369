use crate::config::Credentials;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// What the remote browser reports after initialization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowserSessionInfo {
    pub session_id: Option<String>,
    /// Embeddable live view of the session
    pub session_url: Option<String>,
    pub debug_url: Option<String>,
}

/// A model-driven remote browser page.
///
/// Every call is a suspension point and may fail; failures are handled by the
/// extraction workflow's retry loop.
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Start (or resume) the remote session
    async fn init(&self) -> Result<BrowserSessionInfo>;

    async fn goto(&self, url: &str) -> Result<()>;

    /// Perform a natural-language action on the page
    async fn act(&self, instruction: &str) -> Result<()>;

    /// Schema-constrained extraction of page content
    async fn extract(&self, instruction: &str, schema: &Value) -> Result<Value>;

    /// Run a DOM script in the page and return its JSON result
    async fn evaluate(&self, script: &str, args: Value) -> Result<Value>;

    async fn close(&self) -> Result<()>;

    /// Progress lines the controller reported since the last call, oldest
    /// first, formatted for the run transcript
    fn take_messages(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Creates one browser client per workflow attempt
pub trait BrowserLauncher: Send + Sync {
    /// Build a client, resuming `session_id` when a pooled session is reused
    fn launch(
        &self,
        credentials: &Credentials,
        session_id: Option<&str>,
    ) -> Result<Box<dyn BrowserAutomation>>;
}
