//! List filters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which cases a list request should match.
///
/// Empty vectors mean "no constraint". The service decides what an empty
/// status list means for closed cases; `include_closed` is passed through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseFilter {
    pub statuses: Vec<String>,
    pub severities: Vec<String>,
    pub products: Vec<String>,
    pub accounts: Vec<String>,
    pub keyword: Option<String>,
    pub group: Option<String>,
    pub owner: Option<String>,
    pub created_since: Option<NaiveDate>,
    pub created_until: Option<NaiveDate>,
    pub include_closed: bool,
}

impl CaseFilter {
    pub fn is_empty(&self) -> bool {
        *self == CaseFilter::default()
    }

    /// Query parameters for the list endpoint, without paging.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        for status in &self.statuses {
            pairs.push(("status", status.clone()));
        }
        for severity in &self.severities {
            pairs.push(("severity", severity.clone()));
        }
        for product in &self.products {
            pairs.push(("product", product.clone()));
        }
        for account in &self.accounts {
            pairs.push(("account", account.clone()));
        }
        if let Some(keyword) = self.keyword.as_deref().filter(|k| !k.is_empty()) {
            pairs.push(("keyword", keyword.to_string()));
        }
        if let Some(group) = self.group.as_deref().filter(|g| !g.is_empty()) {
            pairs.push(("group", group.to_string()));
        }
        if let Some(owner) = self.owner.as_deref().filter(|o| !o.is_empty()) {
            pairs.push(("owner", owner.to_string()));
        }
        if let Some(since) = self.created_since {
            pairs.push(("createdSince", since.format("%Y-%m-%d").to_string()));
        }
        if let Some(until) = self.created_until {
            pairs.push(("createdUntil", until.format("%Y-%m-%d").to_string()));
        }
        if self.include_closed {
            pairs.push(("includeClosed", "true".to_string()));
        }
        pairs
    }

    /// One-line description for headers and manifests.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.statuses.is_empty() {
            parts.push(format!("status={}", self.statuses.join("|")));
        }
        if !self.severities.is_empty() {
            parts.push(format!("severity={}", self.severities.join("|")));
        }
        if !self.products.is_empty() {
            parts.push(format!("product={}", self.products.join("|")));
        }
        if !self.accounts.is_empty() {
            parts.push(format!("account={}", self.accounts.join("|")));
        }
        if let Some(keyword) = &self.keyword {
            parts.push(format!("keyword={}", keyword));
        }
        if let Some(group) = &self.group {
            parts.push(format!("group={}", group));
        }
        if let Some(owner) = &self.owner {
            parts.push(format!("owner={}", owner));
        }
        if let Some(since) = self.created_since {
            parts.push(format!("since={}", since));
        }
        if let Some(until) = self.created_until {
            parts.push(format!("until={}", until));
        }
        if self.include_closed {
            parts.push("include-closed".to_string());
        }
        if parts.is_empty() {
            "all cases".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// User-facing status words mapped onto the service's status strings.
///
/// The vocabulary belongs to the service owner, so it comes from
/// configuration. Words without an alias pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<String>>")]
pub struct StatusAliases(BTreeMap<String, Vec<String>>);

impl From<BTreeMap<String, Vec<String>>> for StatusAliases {
    fn from(aliases: BTreeMap<String, Vec<String>>) -> Self {
        Self::new(aliases)
    }
}

impl StatusAliases {
    pub fn new(aliases: BTreeMap<String, Vec<String>>) -> Self {
        let normalized = aliases
            .into_iter()
            .map(|(word, statuses)| (word.trim().to_lowercase(), statuses))
            .collect();
        Self(normalized)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Configured words, sorted.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Expand each word; duplicates are dropped, first occurrence wins.
    pub fn expand(&self, words: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for word in words {
            let trimmed = word.trim();
            if trimmed.is_empty() {
                continue;
            }
            let expansion = match self.0.get(&trimmed.to_lowercase()) {
                Some(statuses) => statuses.clone(),
                None => vec![trimmed.to_string()],
            };
            for status in expansion {
                if !out.contains(&status) {
                    out.push(status);
                }
            }
        }
        out
    }
}

/// Split a comma separated flag value into trimmed, non-empty parts.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
