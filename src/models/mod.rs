use std::collections::HashMap;

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Placeholder written for any field the extractor could not determine.
/// Keeping every column populated gives the exported table a stable schema.
pub const SENTINEL: &str = "N/A";

/// Fixed column set of the persisted table, in serialization order.
pub const COLUMNS: [&str; 21] = [
    "Property_Title",
    "Location",
    "Address",
    "Price",
    "Rate_per_sqft",
    "Deposit",
    "Property_Type",
    "Room_Type",
    "Bedrooms",
    "Bathrooms",
    "Balconies",
    "Furnishing",
    "Carpet_Area",
    "Available_From",
    "Available_For",
    "Posted_By",
    "Posted_Date",
    "Rating",
    "Nearby_Places",
    "Scraped_Date",
    "Property_URL",
];

/// One scraped rental listing. Created by the extractor from a single
/// detail page and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    #[serde(rename = "Property_Title")]
    pub title: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Price")]
    pub price: String,
    #[serde(rename = "Rate_per_sqft")]
    pub rate_per_sqft: String,
    #[serde(rename = "Deposit")]
    pub deposit: String,
    #[serde(rename = "Property_Type")]
    pub property_type: String,
    #[serde(rename = "Room_Type")]
    pub room_type: String,
    #[serde(rename = "Bedrooms")]
    pub bedrooms: String,
    #[serde(rename = "Bathrooms")]
    pub bathrooms: String,
    #[serde(rename = "Balconies")]
    pub balconies: String,
    #[serde(rename = "Furnishing")]
    pub furnishing: String,
    #[serde(rename = "Carpet_Area")]
    pub carpet_area: String,
    #[serde(rename = "Available_From")]
    pub available_from: String,
    #[serde(rename = "Available_For")]
    pub available_for: String,
    #[serde(rename = "Posted_By")]
    pub posted_by: String,
    #[serde(rename = "Posted_Date")]
    pub posted_date: String,
    #[serde(rename = "Rating")]
    pub rating: String,
    #[serde(rename = "Nearby_Places")]
    pub nearby_places: String,
    #[serde(rename = "Scraped_Date")]
    pub scraped_date: String,
    #[serde(rename = "Property_URL")]
    pub url: String,
}

impl ListingRecord {
    /// A record with every field at the sentinel, stamped with the
    /// source URL and the current local time.
    pub fn empty(url: &str) -> Self {
        let na = || SENTINEL.to_string();
        Self {
            title: na(),
            location: na(),
            address: na(),
            price: na(),
            rate_per_sqft: na(),
            deposit: na(),
            property_type: na(),
            room_type: na(),
            bedrooms: na(),
            bathrooms: na(),
            balconies: na(),
            furnishing: na(),
            carpet_area: na(),
            available_from: na(),
            available_for: na(),
            posted_by: na(),
            posted_date: na(),
            rating: na(),
            nearby_places: na(),
            scraped_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            url: url.to_string(),
        }
    }

    /// Identity used to spot the same real-world listing across runs.
    pub fn natural_key(&self) -> (String, String) {
        (self.title.clone(), self.location.clone())
    }

    /// Field values in [`COLUMNS`] order.
    pub fn to_row(&self) -> Vec<&str> {
        vec![
            &self.title,
            &self.location,
            &self.address,
            &self.price,
            &self.rate_per_sqft,
            &self.deposit,
            &self.property_type,
            &self.room_type,
            &self.bedrooms,
            &self.bathrooms,
            &self.balconies,
            &self.furnishing,
            &self.carpet_area,
            &self.available_from,
            &self.available_for,
            &self.posted_by,
            &self.posted_date,
            &self.rating,
            &self.nearby_places,
            &self.scraped_date,
            &self.url,
        ]
    }

    /// Rebuild a record from a CSV row, coercing it to the fixed column
    /// set. Columns missing from the header or left blank come back as
    /// the sentinel, so old exports with fewer fields still load.
    pub fn from_row(headers: &csv::StringRecord, row: &csv::StringRecord) -> Self {
        let by_name: HashMap<&str, &str> = headers.iter().zip(row.iter()).collect();
        let get = |name: &str| -> String {
            match by_name.get(name) {
                Some(v) if !v.trim().is_empty() => (*v).to_string(),
                _ => SENTINEL.to_string(),
            }
        };
        Self {
            title: get("Property_Title"),
            location: get("Location"),
            address: get("Address"),
            price: get("Price"),
            rate_per_sqft: get("Rate_per_sqft"),
            deposit: get("Deposit"),
            property_type: get("Property_Type"),
            room_type: get("Room_Type"),
            bedrooms: get("Bedrooms"),
            bathrooms: get("Bathrooms"),
            balconies: get("Balconies"),
            furnishing: get("Furnishing"),
            carpet_area: get("Carpet_Area"),
            available_from: get("Available_From"),
            available_for: get("Available_For"),
            posted_by: get("Posted_By"),
            posted_date: get("Posted_Date"),
            rating: get("Rating"),
            nearby_places: get("Nearby_Places"),
            scraped_date: get("Scraped_Date"),
            url: get("Property_URL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_is_all_sentinel_except_url_and_timestamp() {
        let record = ListingRecord::empty("https://example.com/p/spid-1");
        assert_eq!(record.title, SENTINEL);
        assert_eq!(record.nearby_places, SENTINEL);
        assert_eq!(record.url, "https://example.com/p/spid-1");
        assert_ne!(record.scraped_date, SENTINEL);
    }

    #[test]
    fn row_round_trip_preserves_fields() {
        let mut record = ListingRecord::empty("https://example.com/p/spid-2");
        record.title = "2 BHK Flat".to_string();
        record.location = "Paschim Vihar".to_string();
        record.price = "₹ 25,000".to_string();

        let headers = csv::StringRecord::from(COLUMNS.to_vec());
        let row = csv::StringRecord::from(record.to_row());
        let loaded = ListingRecord::from_row(&headers, &row);
        assert_eq!(loaded, record);
    }

    #[test]
    fn from_row_coerces_missing_columns_to_sentinel() {
        let headers = csv::StringRecord::from(vec!["Property_Title", "Location"]);
        let row = csv::StringRecord::from(vec!["3 BHK Apartment", "Delhi"]);
        let loaded = ListingRecord::from_row(&headers, &row);
        assert_eq!(loaded.title, "3 BHK Apartment");
        assert_eq!(loaded.location, "Delhi");
        assert_eq!(loaded.price, SENTINEL);
        assert_eq!(loaded.url, SENTINEL);
    }

    #[test]
    fn blank_values_load_as_sentinel() {
        let headers = csv::StringRecord::from(COLUMNS.to_vec());
        let mut values = vec![""; COLUMNS.len()];
        values[0] = "1 BHK Independent Floor";
        let row = csv::StringRecord::from(values);
        let loaded = ListingRecord::from_row(&headers, &row);
        assert_eq!(loaded.title, "1 BHK Independent Floor");
        assert_eq!(loaded.location, SENTINEL);
    }
}
