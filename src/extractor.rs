use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{ExtractionRules, FieldRule, Listing, RawMarkup, SourceConfig};
use crate::utils::error::{ExtractionError, RuleError};

/// Listings read from one page, plus the items that had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub listings: Vec<Listing>,
    pub errors: Vec<ExtractionError>,
}

impl Extraction {
    /// Number of listing roots found on the page, well-formed or not.
    pub fn item_count(&self) -> usize {
        self.listings.len() + self.errors.len()
    }
}

enum CompiledRule {
    Text {
        selector: Selector,
        pattern: Option<Regex>,
    },
    Attr {
        selector: Option<Selector>,
        attr: String,
    },
    Labeled {
        selector: Selector,
        label: String,
        separator: String,
    },
}

/// Extraction rules of one source, compiled once and applied to its markup.
pub struct RecordExtractor {
    source_name: String,
    base_url: Url,
    item: Selector,
    address: CompiledRule,
    url: CompiledRule,
    price: CompiledRule,
    size: Option<CompiledRule>,
    energy_label: Option<CompiledRule>,
}

impl RecordExtractor {
    pub fn for_source(source: &SourceConfig) -> Result<Self, RuleError> {
        Self::new(&source.name, source.base_url(), &source.rules)
    }

    pub fn new(source_name: &str, base_url: &str, rules: &ExtractionRules) -> Result<Self, RuleError> {
        let base_url = Url::parse(base_url).map_err(|e| RuleError::InvalidBaseUrl {
            source_name: source_name.to_string(),
            url: base_url.to_string(),
            message: e.to_string(),
        })?;
        let compile = |rule: &FieldRule| compile_rule(source_name, rule);

        Ok(Self {
            source_name: source_name.to_string(),
            base_url,
            item: parse_selector(source_name, &rules.item)?,
            address: compile(&rules.address)?,
            url: compile(&rules.url)?,
            price: compile(&rules.price)?,
            size: rules.size.as_ref().map(compile).transpose()?,
            energy_label: rules.energy_label.as_ref().map(compile).transpose()?,
        })
    }

    /// Reads every listing on the page in document order. Every listing gets
    /// the same `observed_at`; malformed items are reported and skipped.
    pub fn extract(&self, html: &str, observed_at: DateTime<Utc>) -> Extraction {
        let document = Html::parse_document(html);
        let mut extraction = Extraction::default();

        for (index, item) in document.select(&self.item).enumerate() {
            match self.extract_item(index + 1, item, observed_at) {
                Ok(listing) => extraction.listings.push(listing),
                Err(e) => {
                    tracing::debug!(source = %self.source_name, "skipping listing: {}", e);
                    extraction.errors.push(e);
                }
            }
        }

        extraction
    }

    pub fn extract_markup(&self, markup: &RawMarkup, observed_at: DateTime<Utc>) -> Extraction {
        self.extract(&markup.html, observed_at)
    }

    fn extract_item(
        &self,
        index: usize,
        item: ElementRef<'_>,
        observed_at: DateTime<Utc>,
    ) -> Result<Listing, ExtractionError> {
        let missing = |field: &'static str| ExtractionError::MissingField {
            source_name: self.source_name.clone(),
            index,
            field,
        };

        let address = apply_rule(&self.address, item).ok_or_else(|| missing("address"))?;
        let raw_url = apply_rule(&self.url, item).ok_or_else(|| missing("url"))?;
        let url = self
            .base_url
            .join(&raw_url)
            .map_err(|e| ExtractionError::InvalidUrl {
                source_name: self.source_name.clone(),
                index,
                raw: raw_url.clone(),
                cause: e.to_string(),
            })?;

        Ok(Listing {
            address,
            url: url.to_string(),
            price: apply_rule(&self.price, item).unwrap_or_default(),
            size: self.size.as_ref().and_then(|rule| apply_rule(rule, item)),
            energy_label: self
                .energy_label
                .as_ref()
                .and_then(|rule| apply_rule(rule, item)),
            observed_at,
        })
    }
}

fn parse_selector(source_name: &str, selector: &str) -> Result<Selector, RuleError> {
    Selector::parse(selector).map_err(|e| RuleError::InvalidSelector {
        source_name: source_name.to_string(),
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

fn compile_rule(source_name: &str, rule: &FieldRule) -> Result<CompiledRule, RuleError> {
    Ok(match rule {
        FieldRule::Text { selector, pattern } => CompiledRule::Text {
            selector: parse_selector(source_name, selector)?,
            pattern: pattern
                .as_deref()
                .map(|p| {
                    Regex::new(p).map_err(|e| RuleError::InvalidPattern {
                        source_name: source_name.to_string(),
                        pattern: p.to_string(),
                        message: e.to_string(),
                    })
                })
                .transpose()?,
        },
        FieldRule::Attr { selector, attr } => CompiledRule::Attr {
            selector: selector
                .as_deref()
                .map(|s| parse_selector(source_name, s))
                .transpose()?,
            attr: attr.clone(),
        },
        FieldRule::Labeled {
            selector,
            label,
            separator,
        } => CompiledRule::Labeled {
            selector: parse_selector(source_name, selector)?,
            label: label.clone(),
            separator: separator.clone(),
        },
    })
}

/// Empty results count as absent.
fn apply_rule(rule: &CompiledRule, item: ElementRef<'_>) -> Option<String> {
    let value = match rule {
        CompiledRule::Text { selector, pattern } => {
            let text = item.select(selector).next().map(element_text)?;
            match pattern {
                Some(re) => {
                    let captures = re.captures(&text)?;
                    captures
                        .get(1)
                        .or_else(|| captures.get(0))
                        .map(|m| m.as_str().trim().to_string())?
                }
                None => text,
            }
        }
        CompiledRule::Attr { selector, attr } => {
            let element = match selector {
                Some(selector) => item.select(selector).next()?,
                None => item,
            };
            element.value().attr(attr)?.trim().to_string()
        }
        CompiledRule::Labeled {
            selector,
            label,
            separator,
        } => item
            .select(selector)
            .map(element_text)
            .find(|text| text.contains(label.as_str()))
            .and_then(|text| {
                text.split_once(separator.as_str())
                    .map(|(_, value)| value.trim().to_string())
            })?,
    };

    (!value.is_empty()).then_some(value)
}

/// Text content with runs of whitespace collapsed to single spaces.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
