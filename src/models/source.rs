use serde::{Deserialize, Serialize};

/// One listing site: where to go, when the page is ready, and how to read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    /// Base for resolving relative listing links. Defaults to `url`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub readiness: Readiness,
    pub rules: ExtractionRules,
}

impl SourceConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(&self.url)
    }
}

/// Condition the rendered page must satisfy before its markup is captured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Readiness {
    /// An element matching the CSS selector is present.
    Selector { selector: String },
    /// Navigation finished; nothing else to wait for.
    #[default]
    Loaded,
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Readiness::Selector { selector } => write!(f, "selector `{}`", selector),
            Readiness::Loaded => write!(f, "page load"),
        }
    }
}

/// Maps a rendered listing page onto canonical listing fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionRules {
    /// Selector for the root element of each listing.
    pub item: String,
    pub address: FieldRule,
    pub url: FieldRule,
    pub price: FieldRule,
    #[serde(default)]
    pub size: Option<FieldRule>,
    #[serde(default)]
    pub energy_label: Option<FieldRule>,
}

/// How to read one field relative to a listing's root element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRule {
    /// Text of the first descendant matching `selector`, optionally narrowed
    /// by a regex (first capture group if present, else the whole match).
    Text {
        selector: String,
        #[serde(default)]
        pattern: Option<String>,
    },
    /// Attribute of the first descendant matching `selector`, or of the
    /// listing root itself when no selector is given.
    Attr {
        #[serde(default)]
        selector: Option<String>,
        attr: String,
    },
    /// Text after `separator` in the first descendant matching `selector`
    /// whose text contains `label`.
    Labeled {
        selector: String,
        label: String,
        #[serde(default = "default_separator")]
        separator: String,
    },
}

fn default_separator() -> String {
    ":".to_string()
}

impl FieldRule {
    pub fn text(selector: &str) -> Self {
        FieldRule::Text {
            selector: selector.to_string(),
            pattern: None,
        }
    }

    pub fn attr(selector: Option<&str>, attr: &str) -> Self {
        FieldRule::Attr {
            selector: selector.map(str::to_string),
            attr: attr.to_string(),
        }
    }

    pub fn labeled(selector: &str, label: &str) -> Self {
        FieldRule::Labeled {
            selector: selector.to_string(),
            label: label.to_string(),
            separator: default_separator(),
        }
    }

    /// Selectors referenced by this rule, for validation.
    pub fn selectors(&self) -> Vec<&str> {
        match self {
            FieldRule::Text { selector, .. } | FieldRule::Labeled { selector, .. } => {
                vec![selector.as_str()]
            }
            FieldRule::Attr { selector, .. } => selector.iter().map(|s| s.as_str()).collect(),
        }
    }
}
