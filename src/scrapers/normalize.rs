//! Turns raw extracted cards into typed listings.
//!
//! Every function here is total: unparseable text degrades to a default
//! (price 0, no bedroom count, no image) rather than an error.

use crate::models::{ExtractedListing, NormalizedListing, Source};
use crate::scrapers::types::SEARCH_BASE_URL;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Registrable domains that, along with their subdomains, may serve images
pub const TRUSTED_IMAGE_DOMAINS: [&str; 2] = ["apartments.com", "aptcdn.com"];

static PRICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d,.]*").expect("valid price regex"));

static BEDROOM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:bed|br|bedroom)").expect("valid bedroom regex")
});

pub fn normalize_listings(listings: &[ExtractedListing]) -> Vec<NormalizedListing> {
    listings.iter().map(normalize_listing).collect()
}

pub fn normalize_listing(listing: &ExtractedListing) -> NormalizedListing {
    let address = listing.address.as_deref().map(str::trim).map(str::to_string);
    let bed_text = format!("{} {}", listing.title, address.as_deref().unwrap_or(""));

    NormalizedListing {
        title: listing.title.trim().to_string(),
        address,
        price: parse_price(&listing.price),
        price_raw: listing.price.clone(),
        beds: parse_bedroom_count(&bed_text),
        image_url: sanitize_external_image(listing.image_url.as_deref()),
        source: Source::ApartmentsCom,
    }
}

/// First numeric run in the text, grouping commas dropped, rounded to whole
/// dollars. "$1,800/mo" -> 1800, "Call for pricing" -> 0.
pub fn parse_price(text: &str) -> i64 {
    let Some(run) = PRICE_RE.find(text) else {
        return 0;
    };

    let digits = run.as_str().replace(',', "");
    // Only the first decimal point is meaningful: "1.500.00" reads as 1.5
    let numeric = match digits.match_indices('.').nth(1) {
        Some((second_dot, _)) => &digits[..second_dot],
        None => digits.as_str(),
    };

    match numeric.parse::<f64>() {
        Ok(value) if value.is_finite() => value.round() as i64,
        _ => 0,
    }
}

/// Best-effort bedroom count from free text; a studio counts as 0
pub fn parse_bedroom_count(text: &str) -> Option<u32> {
    let lowered = text.to_lowercase();
    if lowered.contains("studio") {
        return Some(0);
    }

    let captures = BEDROOM_RE.captures(&lowered)?;
    let value = captures.get(1)?.as_str().parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value.round() as u32)
    } else {
        None
    }
}

/// Resolve an image URL against the site and keep it only when it is served
/// over http(s) from an allowed host and is not a placeholder.
pub fn sanitize_external_image(image_url: Option<&str>) -> Option<String> {
    let raw = image_url.map(str::trim).filter(|u| !u.is_empty())?;

    let base = Url::parse(SEARCH_BASE_URL).ok()?;
    let resolved = base.join(raw).ok()?;

    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }

    let text = resolved.as_str().to_lowercase();
    if text.contains("placeholder") || text.contains("example.com") {
        return None;
    }

    let host = resolved.host_str()?.to_lowercase();
    if is_allowed_image_host(&host) {
        Some(resolved.to_string())
    } else {
        None
    }
}

fn is_allowed_image_host(host: &str) -> bool {
    TRUSTED_IMAGE_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
}
