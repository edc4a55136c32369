use crate::error::Result;
use crate::models::NormalizedListing;
use crate::run_log::RunLogger;
use crate::scrapers::normalize::sanitize_external_image;
use crate::scrapers::traits::BrowserAutomation;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

const DISMISS_OVERLAYS: &str =
    "Close any popups or overlays so that the listings grid and map are both visible.";

const CARD_SELECTOR: &str =
    r#"[data-test="placard"], [data-test="property-card"], article, [role="listitem"]"#;

const OUTER_HTML_SCRIPT: &str = "() => document.documentElement.outerHTML";

fn scroll_instruction(fetch_window: usize) -> String {
    format!(
        "Scroll the listings panel slowly through multiple screens, pausing after each movement \
         so new property cards can load. Keep going until either the bottom is reached or roughly \
         {} unique property cards have appeared, then scroll back near the top leaving several \
         cards visible.",
        fetch_window
    )
}

/// Drive the results page into an extractable state: navigate, clear
/// overlays, apply filters in order, then scroll to load more cards.
///
/// Any failing step aborts the preparation; the caller decides on retries.
pub async fn prepare_results_view(
    browser: &dyn BrowserAutomation,
    search_url: &str,
    filter_instructions: &[String],
    fetch_window: usize,
    logger: &RunLogger,
) -> Result<()> {
    info!(url = %search_url, "Navigating to search results");
    logger.record_log(format!("Navigating to {}", search_url));
    browser.goto(search_url).await?;
    forward_agent_messages(browser, logger);

    browser.act(DISMISS_OVERLAYS).await?;
    forward_agent_messages(browser, logger);
    logger.record_log("Ensuring map and results are visible");

    for step in filter_instructions {
        logger.record_log(step);
        browser.act(step).await?;
        forward_agent_messages(browser, logger);
    }

    browser.act(&scroll_instruction(fetch_window)).await?;
    forward_agent_messages(browser, logger);
    logger.record_log("Scrolling through results to load more listings");

    Ok(())
}

/// Copy whatever the browser controller reported into the run transcript
pub fn forward_agent_messages(browser: &dyn BrowserAutomation, logger: &RunLogger) {
    for message in browser.take_messages() {
        logger.record_log(message);
    }
}

/// Fill in missing image URLs from the rendered page.
///
/// Each listing without an image is matched to the first card whose text
/// contains its title. Recovered URLs go through the same sanitization as
/// extracted ones. Failures are logged and otherwise ignored.
pub async fn backfill_images(
    browser: &dyn BrowserAutomation,
    listings: &mut [NormalizedListing],
    logger: &RunLogger,
) {
    let titles: Vec<String> = listings
        .iter()
        .filter(|l| l.image_url.is_none())
        .map(|l| l.title.clone())
        .collect();

    if titles.is_empty() {
        return;
    }

    let html = match browser.evaluate(OUTER_HTML_SCRIPT, Value::Null).await {
        Ok(Value::String(html)) => html,
        Ok(other) => {
            logger.record_log(format!(
                "Image backfill failed: page returned {} instead of HTML",
                json_kind(&other)
            ));
            return;
        }
        Err(e) => {
            logger.record_log(format!("Image backfill failed: {}", e));
            return;
        }
    };

    let resolved = find_card_images(&html, &titles);
    debug!(requested = titles.len(), found = resolved.len(), "Image backfill lookup");

    for listing in listings.iter_mut().filter(|l| l.image_url.is_none()) {
        let candidate = resolved.get(&listing.title).map(String::as_str);
        if let Some(url) = sanitize_external_image(candidate) {
            listing.image_url = Some(url);
            logger.record_log(format!("Backfilled image for {}", listing.title));
        }
    }
}

/// Map each title to the image of the first card mentioning it
pub fn find_card_images(html: &str, titles: &[String]) -> HashMap<String, String> {
    let document = Html::parse_document(html);
    let mut images = HashMap::new();

    let (Ok(card_selector), Ok(img_selector)) =
        (Selector::parse(CARD_SELECTOR), Selector::parse("img"))
    else {
        return images;
    };

    let cards: Vec<(ElementRef, String)> = document
        .select(&card_selector)
        .map(|card| (card, card.text().collect::<String>().to_lowercase()))
        .collect();

    for title in titles {
        let lowered = title.to_lowercase();
        let Some((card, _)) = cards.iter().find(|(_, text)| text.contains(&lowered)) else {
            continue;
        };
        let Some(img) = card.select(&img_selector).next() else {
            continue;
        };

        let attrs = img.value();
        let src = attrs
            .attr("src")
            .or_else(|| attrs.attr("data-src"))
            .or_else(|| attrs.attr("data-original"));
        if let Some(src) = src {
            images.insert(title.clone(), src.to_string());
        }
    }

    images
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
