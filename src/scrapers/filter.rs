use crate::models::{NormalizedListing, RejectedListing, RejectionKind, RejectionReason};
use crate::scrapers::types::SearchParams;

/// Order-preserving partition of listings into accepted and rejected
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub filtered: Vec<NormalizedListing>,
    pub rejected: Vec<RejectedListing>,
}

/// Apply the caller's constraints to normalized listings.
///
/// A price of 0 means the price text was unparseable, not that the unit is
/// free, so it never triggers a price rejection.
pub fn filter_listings(listings: Vec<NormalizedListing>, params: &SearchParams) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for listing in listings {
        let mut reasons = Vec::new();

        if let Some(max_price) = params.max_price {
            if listing.price > 0 && listing.price > i64::from(max_price) {
                reasons.push(RejectionReason {
                    kind: RejectionKind::Price,
                    detail: format!(
                        "Listing price ${} exceeds max ${}",
                        format_usd(listing.price),
                        format_usd(i64::from(max_price))
                    ),
                });
            }
        }

        if reasons.is_empty() {
            outcome.filtered.push(listing);
        } else {
            outcome.rejected.push(RejectedListing { listing, reasons });
        }
    }

    outcome
}

/// 1234567 -> "1,234,567"
fn format_usd(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
