use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Most raw cards a single extraction call may return
pub const MAX_EXTRACTED_LISTINGS: usize = 50;

/// Source of the rental listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Source {
    #[serde(rename = "apartments.com")]
    ApartmentsCom,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::ApartmentsCom => "apartments.com",
        }
    }
}

/// Bedroom filter: either a studio or a minimum bedroom count.
///
/// A studio and a count of zero describe the same unit, so they compare equal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "BedroomsRepr", into = "BedroomsRepr")]
pub enum Bedrooms {
    Studio,
    Count(u32),
}

impl Bedrooms {
    /// Bedroom count, with a studio counting as zero
    pub fn count(&self) -> u32 {
        match self {
            Bedrooms::Studio => 0,
            Bedrooms::Count(n) => *n,
        }
    }

    pub fn is_studio(&self) -> bool {
        self.count() == 0
    }
}

impl PartialEq for Bedrooms {
    fn eq(&self, other: &Self) -> bool {
        self.count() == other.count()
    }
}

impl Eq for Bedrooms {}

impl fmt::Display for Bedrooms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bedrooms::Studio => write!(f, "studio"),
            Bedrooms::Count(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for Bedrooms {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("studio") {
            return Ok(Bedrooms::Studio);
        }
        trimmed
            .parse::<u32>()
            .map(Bedrooms::Count)
            .map_err(|_| format!("expected \"studio\" or a bedroom count, got {:?}", s))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BedroomsRepr {
    Count(u32),
    Label(String),
}

impl TryFrom<BedroomsRepr> for Bedrooms {
    type Error = String;

    fn try_from(repr: BedroomsRepr) -> Result<Self, Self::Error> {
        match repr {
            BedroomsRepr::Count(n) => Ok(Bedrooms::Count(n)),
            BedroomsRepr::Label(label) => label.parse(),
        }
    }
}

impl From<Bedrooms> for BedroomsRepr {
    fn from(bedrooms: Bedrooms) -> Self {
        match bedrooms {
            Bedrooms::Studio => BedroomsRepr::Label("studio".to_string()),
            Bedrooms::Count(n) => BedroomsRepr::Count(n),
        }
    }
}

/// Input to one extraction run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    /// Free-text location, e.g. "Jersey City, NJ"
    pub query: Option<String>,
    /// Canonical "city-state" slug, preferred over `query` when usable
    pub location_slug: Option<String>,
    /// Monthly rent ceiling in USD
    pub max_price: Option<u32>,
    pub bedrooms: Option<Bedrooms>,
    /// Only pet-friendly listings when true
    pub pets: Option<bool>,
    /// Listings to return (1-25)
    pub limit: Option<u32>,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
}

/// Raw listing card as returned by the extraction model.
///
/// Untrusted: none of these fields are guaranteed to be machine-parseable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedListing {
    #[serde(default)]
    #[schemars(length(min = 1))]
    pub title: String,
    /// Displayed monthly price text, e.g. "$1,800/mo"
    #[serde(default)]
    #[schemars(length(min = 1))]
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 1))]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(url)]
    pub image_url: Option<String>,
}

impl ExtractedListing {
    /// Cards without a title or price text carry nothing worth normalizing
    pub fn is_usable(&self) -> bool {
        !self.title.trim().is_empty() && !self.price.trim().is_empty()
    }

    /// Lenient decode of one model-produced card. Nulls and non-text values
    /// count as missing; a numeric price becomes its decimal text. Returns
    /// `None` for anything that is not an object.
    pub fn from_card(card: &Value) -> Option<Self> {
        let fields = card.as_object()?;
        let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
        let price = match fields.get("price") {
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => text("price"),
        };

        Some(Self {
            title: text("title").unwrap_or_default(),
            price: price.unwrap_or_default(),
            address: text("address").filter(|a| !a.trim().is_empty()),
            image_url: text("imageUrl").filter(|u| !u.trim().is_empty()),
        })
    }
}

impl From<&NormalizedListing> for ExtractedListing {
    fn from(listing: &NormalizedListing) -> Self {
        Self {
            title: listing.title.clone(),
            price: listing.price_raw.clone(),
            address: listing.address.clone(),
            image_url: listing.image_url.clone(),
        }
    }
}

/// Shape requested from the schema-constrained extraction call
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ExtractionPayload {
    #[serde(default)]
    #[schemars(length(max = 50))]
    pub listings: Vec<ExtractedListing>,
}

/// Validated, typed listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedListing {
    pub title: String,
    pub address: Option<String>,
    /// Monthly rent in USD, 0 when the price text could not be parsed
    pub price: i64,
    /// Price text as displayed on the site
    pub price_raw: String,
    /// Inferred bedroom count, 0 for a studio
    pub beds: Option<u32>,
    pub image_url: Option<String>,
    pub source: Source,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RejectionKind {
    Price,
    Location,
    Bedrooms,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectionReason {
    #[serde(rename = "type")]
    pub kind: RejectionKind,
    pub detail: String,
}

/// Listing excluded by the constraint filter, with at least one reason
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedListing {
    pub listing: NormalizedListing,
    pub reasons: Vec<RejectionReason>,
}

/// Payload returned by a successful extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub live_view_url: String,
    pub session_id: Option<String>,
    pub debug_url: Option<String>,
    pub listings: Vec<NormalizedListing>,
    pub extracted_count: usize,
    pub filtered_count: usize,
    pub rejected_count: usize,
    pub logs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_card_is_lenient() {
        let numeric = ExtractedListing::from_card(&json!({ "title": "Numeric", "price": 1700 }))
            .unwrap();
        assert_eq!(numeric.price, "1700");
        assert!(numeric.is_usable());

        let null_title =
            ExtractedListing::from_card(&json!({ "title": null, "price": "$1,700" })).unwrap();
        assert!(!null_title.is_usable());

        let odd = ExtractedListing::from_card(&json!({
            "title": "Odd", "price": "$900", "address": ["1 Main"], "imageUrl": 7
        }))
        .unwrap();
        assert_eq!(odd.address, None);
        assert_eq!(odd.image_url, None);

        assert!(ExtractedListing::from_card(&json!("a string")).is_none());
    }

    #[test]
    fn test_studio_equals_zero_bedrooms() {
        assert_eq!(Bedrooms::Studio, Bedrooms::Count(0));
        assert_ne!(Bedrooms::Studio, Bedrooms::Count(1));
        assert!(Bedrooms::Count(0).is_studio());
    }

    #[test]
    fn test_bedrooms_from_json() {
        let studio: Bedrooms = serde_json::from_value(json!("studio")).unwrap();
        assert!(matches!(studio, Bedrooms::Studio));

        let two: Bedrooms = serde_json::from_value(json!(2)).unwrap();
        assert!(matches!(two, Bedrooms::Count(2)));

        assert!(serde_json::from_value::<Bedrooms>(json!("loft")).is_err());
        assert_eq!(serde_json::to_value(Bedrooms::Studio).unwrap(), json!("studio"));
    }

    #[test]
    fn test_bedrooms_from_str() {
        assert!(matches!("Studio".parse::<Bedrooms>(), Ok(Bedrooms::Studio)));
        assert!(matches!("3".parse::<Bedrooms>(), Ok(Bedrooms::Count(3))));
        assert!("-1".parse::<Bedrooms>().is_err());
    }

    #[test]
    fn test_extraction_payload_tolerates_missing_fields() {
        let payload: ExtractionPayload = serde_json::from_value(json!({
            "listings": [
                {"title": "The Ellipse", "price": "$2,100/mo", "imageUrl": null},
                {"price": "$1,900"}
            ]
        }))
        .unwrap();
        assert_eq!(payload.listings.len(), 2);
        assert!(payload.listings[0].is_usable());
        assert!(!payload.listings[1].is_usable());

        let empty: ExtractionPayload = serde_json::from_value(json!({})).unwrap();
        assert!(empty.listings.is_empty());
    }

    #[test]
    fn test_extraction_schema_bounds() {
        let schema = serde_json::to_value(schemars::schema_for!(ExtractionPayload)).unwrap();
        assert_eq!(schema["properties"]["listings"]["maxItems"], json!(50));
        let text = schema.to_string();
        assert!(text.contains("imageUrl"));
        assert!(!text.contains("image_url"));
    }
}
