//! Pure extraction over rendered page content. No I/O happens here: the
//! fetcher hands in HTML, and these functions either pull out detail-page
//! URLs or build a [`ListingRecord`] field by field.
//!
//! Every field matcher is best-effort. A miss leaves the sentinel in
//! place; only a missing title rejects the whole page.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::error::ExtractError;
use crate::models::ListingRecord;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());

/// Lexical markers of a detail-page href, as opposed to a search page.
const DETAIL_MARKERS: [&str; 5] = ["bhk", "bedroom", "independent", "flat", "apartment"];
const LISTING_ID_MARKER: &str = "spid-";
const SEARCH_MARKER: &str = "/search/";

/// Collect detail-page URLs from a rendered listing page: every href that
/// looks like a listing, absolutized against `base`, deduplicated with
/// first-seen-wins ordering.
pub fn listing_urls(html: &str, base: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base_url = Url::parse(base).ok();
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for anchor in document.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !is_detail_href(href) {
            continue;
        }
        let Some(absolute) = absolutize(href, base_url.as_ref()) else {
            continue;
        };
        if seen.insert(absolute.clone()) {
            urls.push(absolute);
        }
    }
    urls
}

fn is_detail_href(href: &str) -> bool {
    let lower = href.to_lowercase();
    lower.contains(LISTING_ID_MARKER)
        && DETAIL_MARKERS.iter().any(|marker| lower.contains(marker))
        && !lower.contains(SEARCH_MARKER)
}

fn absolutize(href: &str, base: Option<&Url>) -> Option<String> {
    if href.starts_with("http") {
        return Some(href.to_string());
    }
    base?.join(href).ok().map(String::from)
}

/// Build a record from a rendered detail page. The title (from the first
/// `h1`) is mandatory; everything else falls back to the sentinel.
pub fn detail_record(html: &str, url: &str) -> Result<ListingRecord, ExtractError> {
    let document = Html::parse_document(html);
    let mut record = ListingRecord::empty(url);

    let title = document
        .select(&TITLE)
        .next()
        .map(|h1| h1.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    if title.chars().count() < 3 {
        return Err(ExtractError::MissingTitle);
    }
    record.title = title;

    let text = flatten_text(&document);
    for field in FIELD_MATCHERS {
        if let Some(value) = (field.matcher)(&text) {
            *(field.slot)(&mut record) = value;
        }
    }
    Ok(record)
}

fn flatten_text(document: &Html) -> String {
    document.root_element().text().collect::<Vec<_>>().join("\n")
}

/// One optional field: a pattern over the flattened page text and the
/// record slot it fills. Applied uniformly, each independently testable.
struct FieldMatcher {
    matcher: fn(&str) -> Option<String>,
    slot: fn(&mut ListingRecord) -> &mut String,
}

static FIELD_MATCHERS: &[FieldMatcher] = &[
    FieldMatcher { matcher: match_price, slot: |r| &mut r.price },
    FieldMatcher { matcher: match_bedrooms, slot: |r| &mut r.bedrooms },
    FieldMatcher { matcher: match_bathrooms, slot: |r| &mut r.bathrooms },
    FieldMatcher { matcher: match_balconies, slot: |r| &mut r.balconies },
    FieldMatcher { matcher: match_carpet_area, slot: |r| &mut r.carpet_area },
    FieldMatcher { matcher: match_rate_per_sqft, slot: |r| &mut r.rate_per_sqft },
    FieldMatcher { matcher: match_deposit, slot: |r| &mut r.deposit },
    FieldMatcher { matcher: match_furnishing, slot: |r| &mut r.furnishing },
    FieldMatcher { matcher: match_location, slot: |r| &mut r.location },
    FieldMatcher { matcher: match_address, slot: |r| &mut r.address },
    FieldMatcher { matcher: match_posted_by, slot: |r| &mut r.posted_by },
    FieldMatcher { matcher: match_posted_date, slot: |r| &mut r.posted_date },
    FieldMatcher { matcher: match_available_from, slot: |r| &mut r.available_from },
    FieldMatcher { matcher: match_property_type, slot: |r| &mut r.property_type },
];

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"₹\s*[\d,.\s]+(?:/month|per month|/yr|annual|Month)?").unwrap());
static BEDROOMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:BHK|Bedroom|bed)").unwrap());
static BATHROOMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:Bathroom|bath)").unwrap());
static BALCONIES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*Balcon").unwrap());
static CARPET_AREA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([\d,]+)\s*(?:sq\.?\s*ft|sqft|Carpet Area)").unwrap());
static RATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)₹\s*([\d,]+)\s*(?:per|/)\s*sq\.?\s*ft").unwrap());
static DEPOSIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:Deposit|Advance)[:\s]*(₹[\d,\s]+)").unwrap());
static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:RWA|Block|Sector|Flat|House|Society|Building|Phase)[^\n]{5,100}").unwrap()
});
static POSTED_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:Posted|Listed)\s*(?:on)?\s*(\d{1,2}\s*(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[^\n]{0,20})",
    )
    .unwrap()
});
static AVAILABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)Available\s*(?:from)?[:\s]*(\d{1,2}\s*(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec))",
    )
    .unwrap()
});

/// Keyword heuristics tried in priority order: most specific area first.
const LOCATION_KEYWORDS: [&str; 6] =
    ["Paschim Vihar", "West Delhi", "Delhi", "Nagar", "Sector", "Phase"];
static LOCATION_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    LOCATION_KEYWORDS
        .iter()
        .map(|keyword| Regex::new(&format!(r"(?i){}[^\n]*", regex::escape(keyword))).unwrap())
        .collect()
});

fn match_price(text: &str) -> Option<String> {
    PRICE_RE.find(text).map(|m| m.as_str().trim().to_string())
}

fn match_bedrooms(text: &str) -> Option<String> {
    first_group(&BEDROOMS_RE, text)
}

fn match_bathrooms(text: &str) -> Option<String> {
    first_group(&BATHROOMS_RE, text)
}

fn match_balconies(text: &str) -> Option<String> {
    first_group(&BALCONIES_RE, text)
}

fn match_carpet_area(text: &str) -> Option<String> {
    first_group(&CARPET_AREA_RE, text).map(|area| format!("{area} sq.ft"))
}

fn match_rate_per_sqft(text: &str) -> Option<String> {
    first_group(&RATE_RE, text).map(|rate| format!("₹{rate}"))
}

fn match_deposit(text: &str) -> Option<String> {
    first_group(&DEPOSIT_RE, text).map(|d| d.replace('\n', " ").trim().to_string())
}

fn match_furnishing(text: &str) -> Option<String> {
    if text.contains("Semi-Furnished") {
        Some("Semi-Furnished".to_string())
    } else if text.contains("Unfurnished") {
        Some("Unfurnished".to_string())
    } else if text.contains("Furnished") {
        Some("Furnished".to_string())
    } else {
        None
    }
}

fn match_location(text: &str) -> Option<String> {
    LOCATION_RES
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| truncate_chars(m.as_str().trim(), 80))
}

fn match_address(text: &str) -> Option<String> {
    ADDRESS_RE
        .find(text)
        .map(|m| truncate_chars(m.as_str().trim(), 100))
}

fn match_posted_by(text: &str) -> Option<String> {
    if text.contains("Dealer") {
        Some("Dealer".to_string())
    } else if text.contains("Owner") {
        Some("Owner".to_string())
    } else {
        None
    }
}

fn match_posted_date(text: &str) -> Option<String> {
    first_group(&POSTED_DATE_RE, text).map(|d| d.trim().to_string())
}

fn match_available_from(text: &str) -> Option<String> {
    if text.to_lowercase().contains("immediate") {
        return Some("Immediate".to_string());
    }
    first_group(&AVAILABLE_RE, text).map(|d| d.trim().to_string())
}

fn match_property_type(text: &str) -> Option<String> {
    if text.contains("Independent") {
        Some("Independent".to_string())
    } else if text.contains("Apartment") || text.contains("Flat") {
        Some("Apartment/Flat".to_string())
    } else if text.contains("Villa") {
        Some("Villa".to_string())
    } else {
        None
    }
}

fn first_group(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
