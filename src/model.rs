use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static VARIANT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_-]+)(?:\.([A-Za-z0-9_-]+))?$").expect("valid variant regex")
});

/// A catalogue name with an optional culture suffix, e.g. `messages.ru`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub catalogue: String,
    pub culture: Option<String>,
}

impl Variant {
    /// Parse `<catalogue>` or `<catalogue>.<culture>`. Returns `None` for
    /// anything else (empty parts, extra dots, whitespace).
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = VARIANT_RE.captures(raw)?;
        Some(Self {
            catalogue: caps[1].to_string(),
            culture: caps.get(2).map(|m| m.as_str().to_string()),
        })
    }

    /// Culture of the variant, or `fallback` when the name is bare.
    pub fn culture_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.culture.as_deref().unwrap_or(fallback)
    }

    /// `<catalogue>.<culture>` using `fallback` for bare names.
    pub fn qualified(&self, fallback: &str) -> String {
        format!("{}.{}", self.catalogue, self.culture_or(fallback))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.culture {
            Some(culture) => write!(f, "{}.{}", self.catalogue, culture),
            None => f.write_str(&self.catalogue),
        }
    }
}

/// Rules deciding which variants may be created and looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPolicy {
    /// Language written into `catalogue.source_lang` for new catalogues.
    pub source_lang: String,
    pub cultures: Vec<String>,
    /// Names never created on demand, matched against the raw and the
    /// culture-qualified form.
    pub reserved: Vec<String>,
}

impl Default for VariantPolicy {
    fn default() -> Self {
        Self {
            source_lang: "en".into(),
            cultures: ["ru", "ua", "is", "cn"].map(String::from).to_vec(),
            reserved: ["messages", "messages.en", "site", "site.en"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl VariantPolicy {
    pub fn allows_culture(&self, culture: &str) -> bool {
        self.cultures.iter().any(|c| c == culture)
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.iter().any(|r| r == name)
    }
}

/// One translation unit as returned by `load_data`, keyed by its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub target: String,
    pub id: i64,
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Malformed,
    Reserved,
    UnsupportedCulture(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Malformed => f.write_str("malformed variant"),
            RejectReason::Reserved => f.write_str("reserved catalogue name"),
            RejectReason::UnsupportedCulture(c) => write!(f, "unsupported culture {c}"),
        }
    }
}

/// Outcome of `is_valid_source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCheck {
    Existing(i64),
    Created(i64),
    Rejected(RejectReason),
}

impl SourceCheck {
    pub fn is_usable(&self) -> bool {
        !matches!(self, SourceCheck::Rejected(_))
    }

    pub fn catalogue_id(&self) -> Option<i64> {
        match self {
            SourceCheck::Existing(id) | SourceCheck::Created(id) => Some(*id),
            SourceCheck::Rejected(_) => None,
        }
    }
}

/// A stored catalogue name split into base name and culture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueName {
    pub name: String,
    pub culture: Option<String>,
}

impl CatalogueName {
    pub fn split(full: &str) -> Self {
        let mut parts = full.split('.');
        let name = parts.next().unwrap_or_default().to_string();
        let culture = parts.next().map(str::to_string);
        Self { name, culture }
    }
}

/// Catalogue snapshot used by exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueExport {
    pub name: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub messages: std::collections::BTreeMap<String, Message>,
}
