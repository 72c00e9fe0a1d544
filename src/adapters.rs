//! Built-in source definitions for the listing sites the watcher ships with.

use crate::models::{ExtractionRules, FieldRule, Readiness, SourceConfig};

pub const PRESETS: [&str; 2] = ["pararius", "vbo"];

pub const PARARIUS_SEARCH_URL: &str =
    "https://www.pararius.nl/koopwoningen/amsterdam/0-500000/2-slaapkamers/50m2/sinds-3";
pub const VBO_SEARCH_URL: &str = "https://www.vbo.nl/koopwoningen?q=Amsterdam&straal=&koopprijs_van=&koopprijs_tot=450000&aantal_kamers=3&oppervlakte=50m&toon_aanbod_sinds=3+d";

/// Looks up a preset by name, optionally pointed at a different search url.
pub fn preset(name: &str, url: Option<&str>) -> Option<SourceConfig> {
    match name {
        "pararius" => Some(pararius(url)),
        "vbo" => Some(vbo(url)),
        _ => None,
    }
}

pub fn default_sources() -> Vec<SourceConfig> {
    vec![pararius(None), vbo(None)]
}

pub fn pararius(url: Option<&str>) -> SourceConfig {
    SourceConfig {
        name: "pararius".to_string(),
        url: url.unwrap_or(PARARIUS_SEARCH_URL).to_string(),
        base_url: Some("https://www.pararius.nl".to_string()),
        readiness: Readiness::Selector {
            selector: "div[class='page__row page__row--search-list']".to_string(),
        },
        rules: ExtractionRules {
            item: "li[class='search-list__item search-list__item--listing']".to_string(),
            address: FieldRule::text(
                "a[class='listing-search-item__link listing-search-item__link--title']",
            ),
            url: FieldRule::attr(
                Some("a[class='listing-search-item__link listing-search-item__link--depiction']"),
                "href",
            ),
            price: FieldRule::text("div[class='listing-search-item__price']"),
            size: Some(FieldRule::text(
                "li[class='illustrated-features__item illustrated-features__item--surface-area']",
            )),
            energy_label: None,
        },
    }
}

pub fn vbo(url: Option<&str>) -> SourceConfig {
    SourceConfig {
        name: "vbo".to_string(),
        url: url.unwrap_or(VBO_SEARCH_URL).to_string(),
        base_url: Some("https://www.vbo.nl".to_string()),
        readiness: Readiness::Selector {
            selector: "a.propertyLink".to_string(),
        },
        rules: ExtractionRules {
            item: "a[class='propertyLink']".to_string(),
            address: FieldRule::text("span.street"),
            // The listing root is the link itself.
            url: FieldRule::attr(None, "href"),
            price: FieldRule::text("span.price"),
            size: Some(FieldRule::labeled("li", "Woonoppervlakte")),
            energy_label: Some(FieldRule::text("span.energielabel")),
        },
    }
}
