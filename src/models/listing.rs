use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column holding the identity key of a listing.
pub const URL_COLUMN: &str = "URL";

/// Canonical column order of a listing row.
pub const LISTING_COLUMNS: [&str; 6] = [
    "address",
    URL_COLUMN,
    "size",
    "energy_label",
    "price",
    "timestamp",
];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One observed property listing. `url` is the sole identity key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    pub address: String,
    pub url: String,
    /// Display text as shown by the source, never parsed.
    pub price: String,
    pub size: Option<String>,
    pub energy_label: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl Listing {
    /// Row values in `LISTING_COLUMNS` order. Absent optionals become empty strings.
    pub fn to_row(&self) -> Vec<(&'static str, String)> {
        vec![
            ("address", self.address.clone()),
            (URL_COLUMN, self.url.clone()),
            ("size", self.size.clone().unwrap_or_default()),
            ("energy_label", self.energy_label.clone().unwrap_or_default()),
            ("price", self.price.clone()),
            ("timestamp", format_timestamp(&self.observed_at)),
        ]
    }

    /// Rebuilds a listing from a stored row. Rows without a url or with an
    /// unreadable timestamp yield `None`.
    pub fn from_row(header: &[String], row: &[String]) -> Option<Listing> {
        let get = |column: &str| -> &str {
            header
                .iter()
                .position(|h| h == column)
                .and_then(|i| row.get(i))
                .map(|v| v.as_str())
                .unwrap_or("")
        };
        let non_empty = |value: &str| -> Option<String> {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        let url = non_empty(get(URL_COLUMN))?;
        let observed_at = parse_timestamp(get("timestamp"))?;

        Some(Listing {
            address: get("address").to_string(),
            url,
            price: get("price").to_string(),
            size: non_empty(get("size")),
            energy_label: non_empty(get("energy_label")),
            observed_at,
        })
    }
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts the sheet format as well as RFC 3339.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
