//! Case data model.
//!
//! Every type here is an immutable snapshot of what the service returned.
//! A later fetch produces a new value; nothing is patched in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally assigned, stable case identifier (the service's case number).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CaseId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for CaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A support case. List responses fill the summary fields only; the detail
/// endpoint fills the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Case {
    #[serde(alias = "caseNumber")]
    pub id: CaseId,
    pub summary: String,
    pub description: String,
    pub status: String,
    pub severity: String,
    pub product: String,
    pub version: String,
    #[serde(rename = "type")]
    pub case_type: String,
    pub account_number: String,
    pub account_name: String,
    pub contact_name: String,
    pub contact_email: String,
    pub owner: String,
    #[serde(alias = "createdDate")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(alias = "lastModifiedDate")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(alias = "closedDate")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Case {
    /// Product and version as one display string.
    pub fn product_line(&self) -> String {
        match (self.product.is_empty(), self.version.is_empty()) {
            (true, _) => String::new(),
            (false, true) => self.product.clone(),
            (false, false) => format!("{} {}", self.product, self.version),
        }
    }
}

/// One entry in a case conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub author_email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub text: String,
    /// `false` means internal (not visible to the customer).
    pub public: bool,
}

/// File metadata for something attached to a case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Content identifier used for download.
    pub id: String,
    pub filename: String,
    pub description: Option<String>,
    pub size: u64,
    pub mime_type: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Part of a bundle that may be missing from a partial fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundlePart {
    Comments,
    Attachments,
}

impl BundlePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundlePart::Comments => "comments",
            BundlePart::Attachments => "attachments",
        }
    }
}

/// A piece of a bundle that failed to load, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleGap {
    pub part: BundlePart,
    pub reason: String,
}

/// A case with its comments (oldest first) and attachments.
///
/// A bundle whose comments or attachments could not be fetched is still
/// usable; the failure is recorded in `gaps` and never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBundle {
    pub case: Case,
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<BundleGap>,
}

impl CaseBundle {
    /// A complete bundle. Comments are put into oldest-first order.
    pub fn complete(case: Case, comments: Vec<Comment>, attachments: Vec<Attachment>) -> Self {
        let mut bundle = Self {
            case,
            comments,
            attachments,
            gaps: Vec::new(),
        };
        bundle.order_comments();
        bundle
    }

    pub fn id(&self) -> &CaseId {
        &self.case.id
    }

    pub fn is_partial(&self) -> bool {
        !self.gaps.is_empty()
    }

    pub fn is_missing(&self, part: BundlePart) -> bool {
        self.gaps.iter().any(|gap| gap.part == part)
    }

    /// Record that `part` could not be loaded.
    pub fn mark_missing(&mut self, part: BundlePart, reason: impl Into<String>) {
        if !self.is_missing(part) {
            self.gaps.push(BundleGap {
                part,
                reason: reason.into(),
            });
        }
    }

    fn order_comments(&mut self) {
        // Stable sort: undated comments lead, ties keep service order.
        self.comments.sort_by_key(|comment| comment.created_at);
    }
}

/// One page of list results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<Case>,
    /// Offset of the first item in the full result set.
    #[serde(default)]
    pub offset: usize,
    /// Total size of the result set as known when the page was served.
    #[serde(alias = "totalCount")]
    pub total: usize,
}

/// What a search hit points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitKind {
    Case,
    Solution,
    #[default]
    Article,
}

impl HitKind {
    /// Lenient parse of the service's document kind; unknown kinds are
    /// articles.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "case" | "support case" => HitKind::Case,
            "solution" => HitKind::Solution,
            _ => HitKind::Article,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HitKind::Case => "case",
            HitKind::Solution => "solution",
            HitKind::Article => "article",
        }
    }
}

/// One result of a free-text search across cases and the knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub kind: HitKind,
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}
