#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rental_scout::config::{Config, Credentials};
use rental_scout::error::{Result, ScoutError};
use rental_scout::scrapers::{BrowserAutomation, BrowserLauncher, BrowserSessionInfo};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared record of what the fake browsers were asked to do
#[derive(Default)]
pub struct FakeState {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub resumed: Mutex<Vec<Option<String>>>,
    pub visited: Mutex<Vec<String>>,
    pub actions: Mutex<Vec<String>>,
    /// Launch numbers (1-based) whose extract call fails
    pub failing_extracts: Mutex<HashSet<usize>>,
    pub hang_on_extract: Mutex<bool>,
    pub listings: Mutex<Value>,
    pub page_html: Mutex<Option<String>>,
}

impl FakeState {
    pub fn with_listings(listings: Value) -> Arc<Self> {
        let state = Arc::new(Self::default());
        *state.listings.lock() = listings;
        state
    }

    pub fn fail_extract_on(&self, launch: usize) {
        self.failing_extracts.lock().insert(launch);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct FakeLauncher {
    pub state: Arc<FakeState>,
}

impl BrowserLauncher for FakeLauncher {
    fn launch(&self, _: &Credentials, session_id: Option<&str>) -> Result<Box<dyn BrowserAutomation>> {
        let launch = self.state.launches.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.resumed.lock().push(session_id.map(str::to_string));
        Ok(Box::new(FakeBrowser {
            state: self.state.clone(),
            launch,
            session_id: session_id
                .map(str::to_string)
                .unwrap_or_else(|| format!("sess-{}", launch)),
            reported: Mutex::new(Vec::new()),
        }))
    }
}

struct FakeBrowser {
    state: Arc<FakeState>,
    launch: usize,
    session_id: String,
    reported: Mutex<Vec<String>>,
}

#[async_trait]
impl BrowserAutomation for FakeBrowser {
    async fn init(&self) -> Result<BrowserSessionInfo> {
        Ok(BrowserSessionInfo {
            session_id: Some(self.session_id.clone()),
            session_url: Some(format!("https://live.example.test/{}", self.session_id)),
            debug_url: None,
        })
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.state.visited.lock().push(url.to_string());
        Ok(())
    }

    async fn act(&self, instruction: &str) -> Result<()> {
        self.state.actions.lock().push(instruction.to_string());
        let action_no = self.state.actions.lock().len();
        self.reported
            .lock()
            .push(format!("Agent act: completed action {}", action_no));
        Ok(())
    }

    async fn extract(&self, _: &str, schema: &Value) -> Result<Value> {
        assert!(schema["properties"]["listings"].is_object());

        let hang = *self.state.hang_on_extract.lock();
        if hang {
            std::future::pending::<()>().await;
        }
        let fail = self.state.failing_extracts.lock().contains(&self.launch);
        if fail {
            return Err(ScoutError::Extraction("page closed during extraction".to_string()));
        }
        Ok(json!({ "listings": self.state.listings.lock().clone() }))
    }

    async fn evaluate(&self, _: &str, _: Value) -> Result<Value> {
        match self.state.page_html.lock().clone() {
            Some(html) => Ok(Value::String(html)),
            None => Err(ScoutError::Automation("evaluate unavailable".to_string())),
        }
    }

    async fn close(&self) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut *self.reported.lock())
    }
}

pub fn config_with_credentials() -> Config {
    Config {
        browserbase_api_key: Some("bb-key".to_string()),
        browserbase_project_id: Some("bb-project".to_string()),
        model_api_key: Some("sk-test".to_string()),
        ..Config::default()
    }
}

pub fn card(title: &str, price: &str, image: Option<&str>) -> Value {
    json!({
        "title": title,
        "price": price,
        "address": format!("{} Street, Jersey City, NJ", title),
        "imageUrl": image,
    })
}
