//! Search entry point used by the conversational agent.
//!
//! Wraps an extraction run, turns the listings into agent-facing results and
//! stores them for display. Failures are reported through the run log and an
//! empty result so the agent can tell the user nothing was found.

use crate::error::{Result, ScoutError};
use crate::listings::{ListingInput, ListingStore};
use crate::models::{Bedrooms, ExtractionRequest, NormalizedListing};
use crate::run_log::LogSink;
use crate::scrapers::types::sanitize_slug;
use crate::scrapers::workflow::ExtractionWorkflow;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// Thread id used when the agent runs outside a conversation
pub const PUBLIC_THREAD: &str = "public";

const DEFAULT_SEARCH_LIMIT: u32 = 3;

/// Arguments the agent supplies when searching
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SearchEstateArgs {
    /// City or neighborhood to search
    #[validate(length(min = 1))]
    pub query: String,
    /// Upper bound for monthly rent in USD
    #[validate(range(min = 1))]
    pub max_price: Option<u32>,
    pub bedrooms: Option<Bedrooms>,
    pub pets: Option<bool>,
    /// Maximum listings to return
    #[validate(range(min = 1, max = 25))]
    pub limit: Option<u32>,
}

/// Listing as narrated back to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEstateResult {
    pub title: String,
    pub price: i64,
    pub address: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
}

pub struct SearchEstate {
    workflow: Arc<ExtractionWorkflow>,
    listings: Arc<dyn ListingStore>,
    logs: Arc<dyn LogSink>,
}

impl SearchEstate {
    pub fn new(
        workflow: Arc<ExtractionWorkflow>,
        listings: Arc<dyn ListingStore>,
        logs: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            workflow,
            listings,
            logs,
        }
    }

    /// Run a search for the agent. Only invalid arguments are errors; a
    /// failed extraction yields an empty list.
    pub async fn search(
        &self,
        args: &SearchEstateArgs,
        thread_id: Option<&str>,
    ) -> Result<Vec<SearchEstateResult>> {
        args.validate()
            .map_err(|e| ScoutError::InvalidRequest(e.to_string()))?;

        let limit = args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT) as usize;
        let shared_tags = shared_tags(args.pets, args.bedrooms);
        let storage_thread = thread_id.unwrap_or(PUBLIC_THREAD);
        let run_id = format!("{}-{}", storage_thread, Utc::now().timestamp_millis());

        let request = ExtractionRequest {
            query: Some(args.query.trim().to_string()),
            location_slug: Some(sanitize_slug(&args.query)),
            max_price: args.max_price,
            bedrooms: args.bedrooms,
            pets: args.pets,
            limit: Some(limit as u32),
            thread_id: thread_id.map(str::to_string),
            run_id: Some(run_id.clone()),
        };

        let result = match self.workflow.run(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Listing extraction failed");
                self.append(thread_id, &run_id, format!("Extraction failed: {}", e))
                    .await;
                return Ok(Vec::new());
            }
        };

        let listings: Vec<&NormalizedListing> = result.listings.iter().take(limit).collect();
        info!(
            extracted = result.extracted_count,
            filtered = result.filtered_count,
            rejected = result.rejected_count,
            returned = listings.len(),
            "Search finished"
        );

        self.append(
            thread_id,
            &run_id,
            format!(
                "Agent run complete. Returning {} listing{}.",
                listings.len(),
                if listings.len() == 1 { "" } else { "s" }
            ),
        )
        .await;

        if listings.is_empty() {
            self.append(
                thread_id,
                &run_id,
                "No listings matched the filters. Let the user know nothing was found.".to_string(),
            )
            .await;
            return Ok(Vec::new());
        }

        let results: Vec<SearchEstateResult> = listings
            .into_iter()
            .map(|listing| to_search_result(listing, &shared_tags))
            .collect();

        self.display_listings(storage_thread, &results).await?;
        Ok(results)
    }

    /// Persist listings the agent wants shown in the UI
    pub async fn display_listings(
        &self,
        thread_id: &str,
        results: &[SearchEstateResult],
    ) -> Result<String> {
        let inputs: Vec<ListingInput> = results
            .iter()
            .map(|r| ListingInput {
                title: r.title.clone(),
                address: r.address.clone(),
                price: r.price,
                image_url: r.image_url.clone(),
            })
            .collect();

        self.listings.record_listings(thread_id, &inputs).await?;
        Ok(format!(
            "Stored {} listing{} for display.",
            inputs.len(),
            if inputs.len() == 1 { "" } else { "s" }
        ))
    }

    async fn append(&self, thread_id: Option<&str>, run_id: &str, message: String) {
        let Some(thread_id) = thread_id else {
            return;
        };
        if let Err(e) = self.logs.append_logs(thread_id, run_id, &[message]).await {
            warn!(error = %e, "Failed to append search log");
        }
    }
}

/// Tags derived from the search filters, shared by every result
pub fn shared_tags(pets: Option<bool>, bedrooms: Option<Bedrooms>) -> Vec<String> {
    let mut tags = Vec::new();
    if pets == Some(true) {
        tags.push("pets_ok".to_string());
    }
    match bedrooms {
        Some(b) if b.is_studio() => tags.push("studio".to_string()),
        Some(b) => tags.push(format!("{}br", b.count())),
        None => {}
    }
    tags
}

pub fn to_search_result(listing: &NormalizedListing, shared_tags: &[String]) -> SearchEstateResult {
    let price_label = if listing.price_raw.trim().is_empty() {
        format!("${}", listing.price)
    } else {
        listing.price_raw.trim().to_string()
    };
    let address = listing
        .address
        .clone()
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "Address not provided".to_string());
    let bed_label = listing.beds.map(|beds| match beds {
        0 => "Studio".to_string(),
        n => format!("{} BR", n),
    });

    let mut tags = shared_tags.to_vec();
    tags.push(listing.source.as_str().to_string());
    match listing.beds {
        Some(0) => tags.push("studio".to_string()),
        Some(n) => tags.push(format!("{}br", n)),
        None => {}
    }

    let mut summary = format!("{} — {} • {}", listing.title, price_label, address);
    if let Some(beds) = bed_label {
        summary.push_str(&format!(" • {}", beds));
    }

    SearchEstateResult {
        title: listing.title.clone(),
        price: listing.price,
        address,
        summary,
        tags,
        image_url: listing.image_url.clone(),
    }
}
