//! Extraction workflow: one run drives a pooled remote browser through the
//! results page, extracts listing cards, normalizes and filters them.
//!
//! Each attempt acquires a session, prepares the page, extracts, normalizes,
//! backfills images, filters and truncates, then releases the session. A
//! failed attempt discards its session and the next one starts fresh.

use crate::config::{Config, Credentials};
use crate::error::{Result, ScoutError};
use crate::models::{
    ExtractedListing, ExtractionPayload, ExtractionRequest, ExtractionResult,
    MAX_EXTRACTED_LISTINGS,
};
use crate::run_log::{LogSink, RunLogger};
use crate::scrapers::browser::{
    backfill_images, forward_agent_messages, prepare_results_view,
};
use crate::scrapers::filter::{filter_listings, FilterOutcome};
use crate::scrapers::normalize::normalize_listings;
use crate::scrapers::traits::{BrowserAutomation, BrowserLauncher};
use crate::scrapers::types::{extraction_instruction, SearchParams};
use crate::session_pool::{SessionHandle, SessionPool};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Attempts per run, each with its own browser session
pub const MAX_ATTEMPTS: usize = 2;

const START_MESSAGE: &str = "Starting browser session...";

/// Everything an attempt needs that does not depend on the session
struct RunPlan {
    params: SearchParams,
    search_url: String,
    filter_instructions: Vec<String>,
    instruction: String,
    schema: Value,
    fetch_window: usize,
    result_limit: usize,
}

pub struct ExtractionWorkflow {
    config: Config,
    launcher: Arc<dyn BrowserLauncher>,
    pool: SessionPool,
    log_sink: Option<Arc<dyn LogSink>>,
}

impl ExtractionWorkflow {
    pub fn new(config: Config, launcher: Arc<dyn BrowserLauncher>, pool: SessionPool) -> Self {
        Self {
            config,
            launcher,
            pool,
            log_sink: None,
        }
    }

    /// Persist thread-scoped progress logs to `sink`
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run an extraction bounded by the configured run timeout
    pub async fn run(&self, request: &ExtractionRequest) -> Result<ExtractionResult> {
        let token = CancellationToken::new();
        let timeout = self.config.run_timeout;

        let timer = tokio::spawn({
            let token = token.clone();
            async move {
                tokio::time::sleep(timeout).await;
                token.cancel();
            }
        });

        let result = self.run_with_cancellation(request, token).await;
        timer.abort();

        // Only the timer holds this token
        match result {
            Err(ScoutError::Cancelled) => Err(ScoutError::Timeout(timeout.as_secs())),
            other => other,
        }
    }

    /// Run an extraction that stops promptly once `token` is cancelled.
    ///
    /// A cancelled attempt's session is discarded, never released, since its
    /// page state is unknown.
    pub async fn run_with_cancellation(
        &self,
        request: &ExtractionRequest,
        token: CancellationToken,
    ) -> Result<ExtractionResult> {
        let credentials = self.config.credentials()?;
        let plan = self.plan(request)?;

        let logger = RunLogger::new(
            self.log_sink.clone(),
            request.thread_id.clone(),
            request.run_id.clone(),
        );
        logger.start_run_if_needed(Some(START_MESSAGE));

        info!(
            run_id = %logger.run_id(),
            url = %plan.search_url,
            fetch_window = plan.fetch_window,
            limit = plan.result_limit,
            "Starting extraction run"
        );

        let result = self.attempt_loop(&credentials, &plan, &logger, &token).await;
        logger.finish().await;
        result
    }

    fn plan(&self, request: &ExtractionRequest) -> Result<RunPlan> {
        let params = SearchParams::from_request(request);
        let fetch_window = self.config.fetch_window(request.limit);
        let schema = serde_json::to_value(schemars::schema_for!(ExtractionPayload))
            .map_err(|e| ScoutError::Extraction(format!("schema generation failed: {}", e)))?;

        Ok(RunPlan {
            search_url: params.search_url(),
            filter_instructions: params.filter_instructions(),
            instruction: extraction_instruction(fetch_window),
            schema,
            fetch_window,
            result_limit: self.config.result_limit(request.limit),
            params,
        })
    }

    async fn attempt_loop(
        &self,
        credentials: &Credentials,
        plan: &RunPlan,
        logger: &RunLogger,
        token: &CancellationToken,
    ) -> Result<ExtractionResult> {
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if token.is_cancelled() {
                return Err(ScoutError::Cancelled);
            }

            let mut handle = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    logger.record_log("Extraction cancelled while waiting for a browser session");
                    return Err(ScoutError::Cancelled);
                }
                handle = self.pool.acquire() => handle,
            };
            match (&handle.session_id, handle.reused) {
                (Some(session_id), true) => {
                    logger.record_log(format!("Reusing browser session {}", session_id))
                }
                _ => logger
                    .record_log("No reusable browser session available; a new one will be created"),
            }

            let browser = match self.launcher.launch(credentials, handle.session_id.as_deref()) {
                Ok(browser) => browser,
                Err(e) => {
                    let e = self.fail_attempt(attempt, &handle, None, e, logger).await;
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                    continue;
                }
            };

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = self.attempt(browser.as_ref(), &mut handle, plan, logger) => Some(result),
            };

            match outcome {
                Some(Ok(result)) => return Ok(result),
                Some(Err(e)) => {
                    let e = self
                        .fail_attempt(attempt, &handle, Some(browser.as_ref()), e, logger)
                        .await;
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
                None => {
                    logger.record_log("Extraction cancelled; discarding browser session");
                    self.discard(&handle, logger).await;
                    close_quietly(browser.as_ref()).await;
                    return Err(ScoutError::Cancelled);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ScoutError::Automation("extraction failed".to_string())))
    }

    async fn attempt(
        &self,
        browser: &dyn BrowserAutomation,
        handle: &mut SessionHandle,
        plan: &RunPlan,
        logger: &RunLogger,
    ) -> Result<ExtractionResult> {
        let init = browser.init().await?;
        forward_agent_messages(browser, logger);
        let session_id = init
            .session_id
            .clone()
            .or_else(|| handle.session_id.clone())
            .ok_or_else(|| {
                ScoutError::Automation("browser service did not return a session id".to_string())
            })?;
        logger.record_log(format!("Session ID: {}", session_id));
        handle.session_id = Some(session_id.clone());

        let live_view_url = init
            .session_url
            .clone()
            .or_else(|| init.debug_url.clone())
            .unwrap_or_default();

        prepare_results_view(
            browser,
            &plan.search_url,
            &plan.filter_instructions,
            plan.fetch_window,
            logger,
        )
        .await?;

        let raw = browser.extract(&plan.instruction, &plan.schema).await;
        forward_agent_messages(browser, logger);
        let raw = raw?;
        let extracted = parse_extraction(raw, plan.fetch_window)?;
        logger.record_log("Extracted listing cards from the page");

        for listing in &extracted {
            match &listing.image_url {
                Some(url) => logger.record_log(format!("Extracted image URL: {}", url)),
                None => logger.record_log(format!("No image URL extracted for: {}", listing.title)),
            }
        }

        let mut normalized = normalize_listings(&extracted);
        if normalized.iter().any(|l| l.image_url.is_none()) {
            logger.record_log("Attempting to backfill missing image URLs from the DOM");
            backfill_images(browser, &mut normalized, logger).await;
        }
        for listing in normalized.iter().filter(|l| l.image_url.is_none()) {
            logger.record_log(format!("Listing missing image: {}", listing.title));
        }

        let extracted_count = normalized.len();
        let FilterOutcome { filtered, rejected } = filter_listings(normalized, &plan.params);
        for entry in &rejected {
            let reasons: Vec<String> = entry
                .reasons
                .iter()
                .map(|r| format!("{:?}: {}", r.kind, r.detail))
                .collect();
            debug!(
                title = %entry.listing.title,
                price = entry.listing.price,
                reasons = ?reasons,
                "Listing filtered out"
            );
        }

        let rejected_count = rejected.len();
        let listings: Vec<_> = filtered.into_iter().take(plan.result_limit).collect();
        info!(
            extracted = extracted_count,
            returned = listings.len(),
            rejected = rejected_count,
            "Normalized listings"
        );
        logger.record_log(format!(
            "Normalized {} listings, returning {}",
            extracted_count,
            listings.len()
        ));

        match self.pool.release(handle, &session_id).await {
            Ok(()) => logger.record_log(format!(
                "Marked browser session {} available for reuse",
                session_id
            )),
            Err(e) => {
                warn!(error = %e, session_id = %session_id, "Failed to release session");
                logger.record_log(format!("Could not return session {} to the pool", session_id));
            }
        }

        Ok(ExtractionResult {
            live_view_url,
            session_id: Some(session_id),
            debug_url: init.debug_url,
            filtered_count: listings.len(),
            listings,
            extracted_count,
            rejected_count,
            logs: logger.all_logs(),
        })
    }

    async fn fail_attempt(
        &self,
        attempt: usize,
        handle: &SessionHandle,
        browser: Option<&dyn BrowserAutomation>,
        error: ScoutError,
        logger: &RunLogger,
    ) -> ScoutError {
        let retrying = attempt < MAX_ATTEMPTS && error.is_retryable();
        error!(attempt, retrying, error = %error, "Extraction attempt failed");
        logger.record_log(format!(
            "Extraction error{}: {}",
            if retrying { ", retrying with a new session" } else { "" },
            error
        ));

        self.discard(handle, logger).await;
        if let Some(browser) = browser {
            close_quietly(browser).await;
        }
        error
    }

    async fn discard(&self, handle: &SessionHandle, logger: &RunLogger) {
        match self.pool.discard(handle).await {
            Ok(()) if handle.record_id.is_some() => logger.record_log(format!(
                "Discarded browser session record {}",
                handle.session_id.as_deref().unwrap_or("unknown")
            )),
            Ok(()) => {}
            Err(e) => warn!(error = %e, "Failed to discard session record"),
        }
    }
}

async fn close_quietly(browser: &dyn BrowserAutomation) {
    if let Err(e) = browser.close().await {
        debug!(error = %e, "Ignoring browser close failure");
    }
}

/// Decode the extraction payload card by card. Cards that are malformed or
/// lack a title or price are dropped; only a payload that is neither a
/// listing array nor an object holding one is an error.
fn parse_extraction(raw: Value, fetch_window: usize) -> Result<Vec<ExtractedListing>> {
    let cards = match raw {
        Value::Array(items) => items,
        Value::Object(mut fields) => match fields.remove("listings") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(ScoutError::Extraction(format!(
                    "expected a listings array, got {}",
                    other
                )))
            }
        },
        other => {
            return Err(ScoutError::Extraction(format!(
                "expected an object or array payload, got {}",
                other
            )))
        }
    };

    let total = cards.len();
    let listings: Vec<ExtractedListing> = cards
        .iter()
        .filter_map(ExtractedListing::from_card)
        .filter(ExtractedListing::is_usable)
        .take(fetch_window.min(MAX_EXTRACTED_LISTINGS))
        .collect();

    if listings.len() < total {
        debug!(total, kept = listings.len(), "Dropped unusable or excess cards");
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_extraction_object() {
        let listings = parse_extraction(
            json!({ "listings": [
                { "title": "A", "price": "$1,000" },
                { "title": "", "price": "$1,100" },
                { "title": "C", "price": "  " }
            ]}),
            25,
        )
        .unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].title, "A");
    }

    #[test]
    fn test_parse_extraction_bare_array_and_cap() {
        let items: Vec<Value> = (0..80)
            .map(|i| json!({ "title": format!("L{}", i), "price": "$1" }))
            .collect();
        assert_eq!(parse_extraction(Value::Array(items.clone()), 25).unwrap().len(), 25);
        assert_eq!(parse_extraction(Value::Array(items), 50).unwrap().len(), 50);
    }

    #[test]
    fn test_parse_extraction_skips_malformed_cards() {
        let listings = parse_extraction(
            json!([
                { "title": "Good One", "price": "$1,500" },
                { "title": null, "price": "$1,700" },
                { "title": "Numeric", "price": 1700 },
                { "title": "No Price", "price": null },
                42,
                "not a card"
            ]),
            25,
        )
        .unwrap();

        let titles: Vec<&str> = listings.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, ["Good One", "Numeric"]);
        assert_eq!(listings[1].price, "1700");
        assert!(parse_extraction(json!({}), 25).unwrap().is_empty());
        assert!(parse_extraction(json!({ "listings": "none" }), 25).is_err());
    }

    #[test]
    fn test_parse_extraction_rejects_garbage() {
        let err = parse_extraction(Value::Null, 25).unwrap_err();
        assert!(err.is_retryable());
        assert!(parse_extraction(json!("listings"), 25).is_err());
    }

    #[test]
    fn test_plan_uses_request() {
        let workflow = ExtractionWorkflow::new(
            Config::default(),
            Arc::new(NoLauncher),
            SessionPool::new(Arc::new(crate::session_pool::InMemorySessionStore::new())),
        );
        let plan = workflow
            .plan(&ExtractionRequest {
                query: Some("Hoboken, NJ".to_string()),
                max_price: Some(3_000),
                limit: Some(5),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(plan.search_url, "https://www.apartments.com/hoboken-nj/under-3000/");
        assert_eq!(plan.fetch_window, 25);
        assert_eq!(plan.result_limit, 5);
        assert!(plan.instruction.contains("up to 25"));
        assert!(plan.schema["properties"]["listings"].is_object());
    }

    struct NoLauncher;

    impl BrowserLauncher for NoLauncher {
        fn launch(&self, _: &Credentials, _: Option<&str>) -> Result<Box<dyn BrowserAutomation>> {
            Err(ScoutError::Automation("no browser".to_string()))
        }
    }
}
