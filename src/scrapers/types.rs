use crate::models::{Bedrooms, ExtractionRequest};
use serde::{Deserialize, Serialize};

/// Location searched when the request carries no usable location text
pub const DEFAULT_LOCATION_SLUG: &str = "jersey-city-nj";

/// Search results live under `{SEARCH_BASE_URL}/{slug}/`
pub const SEARCH_BASE_URL: &str = "https://www.apartments.com";

/// Search parameters derived from an extraction request.
///
/// Doubles as the constraint set for filtering extracted listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Canonical "city-state" slug
    pub location_slug: String,
    /// Maximum monthly rent (USD)
    pub max_price: Option<u32>,
    pub bedrooms: Option<Bedrooms>,
    pub pets: Option<bool>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            location_slug: DEFAULT_LOCATION_SLUG.to_string(),
            max_price: None,
            bedrooms: None,
            pets: None,
        }
    }
}

impl SearchParams {
    /// Resolve the slug from the request, preferring the explicit slug over
    /// the free-text query and falling back to the default location
    pub fn from_request(request: &ExtractionRequest) -> Self {
        let location_slug = [request.location_slug.as_deref(), request.query.as_deref()]
            .into_iter()
            .flatten()
            .map(sanitize_slug)
            .find(|slug| !slug.is_empty())
            .unwrap_or_else(|| DEFAULT_LOCATION_SLUG.to_string());

        Self {
            location_slug,
            max_price: request.max_price,
            bedrooms: request.bedrooms,
            pets: request.pets,
        }
    }

    /// Search URL with an optional price-ceiling segment rounded down to the
    /// nearest hundred
    pub fn search_url(&self) -> String {
        let slug = if self.location_slug.is_empty() {
            DEFAULT_LOCATION_SLUG
        } else {
            self.location_slug.as_str()
        };

        match self.max_price.map(|p| p / 100 * 100) {
            Some(rounded) if rounded > 0 => {
                format!("{}/{}/under-{}/", SEARCH_BASE_URL, slug, rounded)
            }
            _ => format!("{}/{}/", SEARCH_BASE_URL, slug),
        }
    }

    /// Natural-language filter steps for the page, bedrooms before pets
    pub fn filter_instructions(&self) -> Vec<String> {
        let mut steps = Vec::new();

        if let Some(bedrooms) = self.bedrooms {
            let (option_label, descriptor) = if bedrooms.is_studio() {
                ("Studio+".to_string(), "studio (0 bedroom)".to_string())
            } else {
                let n = bedrooms.count();
                (format!("{}+", n), format!("{}-bedroom", n))
            };
            steps.push(
                "Click the \"Beds/Baths\" filter button above the results so the beds selector popup stays open."
                    .to_string(),
            );
            steps.push(format!(
                "Inside the Beds/Baths popup, select the \"{}\" option so only {} listings remain, then apply or close the beds filter and wait for the list to refresh.",
                option_label, descriptor
            ));
        }

        if self.pets == Some(true) {
            steps.push(
                "Enable any pets-allowed filter so the results only include pet-friendly properties and wait for the list to update."
                    .to_string(),
            );
        }

        steps
    }
}

/// Instruction for the schema-constrained extraction call
pub fn extraction_instruction(fetch_window: usize) -> String {
    format!(
        "Extract the rental listing cards currently visible on the page (aim for up to {}). \
         For each, provide only the title, displayed monthly price text, the street address, \
         and the primary image URL (if available).",
        fetch_window
    )
}

/// Lowercase, drop punctuation, and hyphenate whitespace
pub fn sanitize_slug(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '/' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '_' || c == '-' {
            pending_hyphen = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_slug() {
        assert_eq!(sanitize_slug("Jersey City, NJ"), "jersey-city-nj");
        assert_eq!(sanitize_slug("  --hoboken__nj-- "), "hoboken-nj");
        assert_eq!(sanitize_slug("new   york ny"), "new-york-ny");
        assert_eq!(sanitize_slug("!!!"), "");
    }

    #[test]
    fn test_slug_resolution_order() {
        let request = ExtractionRequest {
            query: Some("Hoboken, NJ".to_string()),
            location_slug: Some("jersey-city-nj".to_string()),
            ..Default::default()
        };
        assert_eq!(SearchParams::from_request(&request).location_slug, "jersey-city-nj");

        let request = ExtractionRequest {
            query: Some("Hoboken, NJ".to_string()),
            location_slug: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(SearchParams::from_request(&request).location_slug, "hoboken-nj");

        let request = ExtractionRequest {
            query: Some("???".to_string()),
            ..Default::default()
        };
        assert_eq!(
            SearchParams::from_request(&request).location_slug,
            DEFAULT_LOCATION_SLUG
        );
    }

    #[test]
    fn test_search_url_rounds_price_down() {
        let params = SearchParams {
            location_slug: "hoboken-nj".to_string(),
            max_price: Some(2_450),
            ..Default::default()
        };
        assert_eq!(
            params.search_url(),
            "https://www.apartments.com/hoboken-nj/under-2400/"
        );
    }

    #[test]
    fn test_search_url_without_usable_price() {
        let params = SearchParams {
            max_price: Some(99),
            ..Default::default()
        };
        assert_eq!(params.search_url(), "https://www.apartments.com/jersey-city-nj/");
    }

    #[test]
    fn test_filter_instructions_order() {
        let params = SearchParams {
            bedrooms: Some(Bedrooms::Count(2)),
            pets: Some(true),
            ..Default::default()
        };
        let steps = params.filter_instructions();
        assert_eq!(steps.len(), 3);
        assert!(steps[0].contains("Beds/Baths"));
        assert!(steps[1].contains("\"2+\""));
        assert!(steps[2].contains("pets-allowed"));
    }

    #[test]
    fn test_studio_filter_instruction() {
        for bedrooms in [Bedrooms::Studio, Bedrooms::Count(0)] {
            let params = SearchParams {
                bedrooms: Some(bedrooms),
                ..Default::default()
            };
            let steps = params.filter_instructions();
            assert!(steps[1].contains("Studio+"));
        }
    }

    #[test]
    fn test_no_filters_no_instructions() {
        let params = SearchParams {
            pets: Some(false),
            ..Default::default()
        };
        assert!(params.filter_instructions().is_empty());
    }
}
