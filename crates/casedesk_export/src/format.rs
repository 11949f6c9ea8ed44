//! Rendering a [`CaseBundle`] into a document.
//!
//! Markdown goes through a `tera` template fed with pre-formatted strings,
//! so custom templates never need formatting filters of their own. JSON is
//! the bundle itself, pretty-printed.

use casedesk_api::{Attachment, CaseBundle, Comment};
use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tera::{Context, Tera};
use thiserror::Error;

const TEMPLATE_NAME: &str = "case.md";

/// Separator between cases in a combined markdown document.
pub const COMBINED_SEPARATOR: &str = "\n\n---\n\n";

pub const DEFAULT_TEMPLATE: &str = r#"# Case {{ case.id }}: {{ case.summary }}
{% if missing %}
> **Partial export:** {{ missing | join(sep=", ") }} could not be fetched.
{% endif %}
## Metadata

| Field | Value |
|-------|-------|
| Case Number | {{ case.id }} |
| Status | {{ case.status }} |
| Severity | {{ case.severity }} |
| Product | {{ case.product }} |
| Type | {{ case.case_type }} |
| Created | {{ case.created }} |
| Last Updated | {{ case.updated }} |
{%- if case.closed %}
| Closed | {{ case.closed }} |
{%- endif %}
| Owner | {{ case.owner }} |
| Contact | {{ case.contact }} |
| Account | {{ case.account }} |

## Summary

{{ case.summary }}

## Description

{{ case.description }}

## Conversation
{% for comment in comments %}
### Comment {{ comment.number }}
**From:** {{ comment.author }}{% if comment.author_email %} ({{ comment.author_email }}){% endif %}
**Date:** {{ comment.date }}
**Type:** {{ comment.visibility }}

{{ comment.text }}

---
{% endfor %}
{% if attachments %}
## Attachments

| Filename | Size | ID | Uploaded |
|----------|------|----|----------|
{% for attachment in attachments -%}
| {{ attachment.filename }} | {{ attachment.size }} | {{ attachment.id_short }} | {{ attachment.uploaded }} |
{% endfor %}
{% endif %}
---
*Exported by casedesk on {{ exported_at }}*
"#;

#[derive(Debug, Clone, Error)]
pub enum FormatError {
    #[error("invalid template: {0}")]
    Template(String),

    #[error("failed to read template {path}: {message}")]
    TemplateFile { path: String, message: String },

    #[error("failed to render case {case}: {message}")]
    Render { case: String, message: String },

    #[error("failed to serialize case {case}: {message}")]
    Json { case: String, message: String },
}

/// Output document kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!(
                "unknown format '{}', expected 'markdown' or 'json'",
                other
            )),
        }
    }
}

/// Turns bundles into documents. Cheap to share between tasks.
pub struct Formatter {
    format: ExportFormat,
    tera: Tera,
    html: HtmlCleaner,
}

impl Formatter {
    pub fn new(format: ExportFormat) -> Result<Self, FormatError> {
        Self::with_template(format, DEFAULT_TEMPLATE)
    }

    /// Use `template` instead of the built-in markdown template.
    pub fn with_template(format: ExportFormat, template: &str) -> Result<Self, FormatError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(TEMPLATE_NAME, template)
            .map_err(|e| FormatError::Template(error_chain(&e)))?;
        Ok(Self {
            format,
            tera,
            html: HtmlCleaner::new()?,
        })
    }

    pub fn from_template_file(format: ExportFormat, path: &Path) -> Result<Self, FormatError> {
        let template =
            std::fs::read_to_string(path).map_err(|e| FormatError::TemplateFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Self::with_template(format, &template)
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// `case.md` or `case.json`.
    pub fn case_file_name(&self) -> String {
        format!("case.{}", self.format.extension())
    }

    /// `all-cases.md` or `all-cases.json`.
    pub fn combined_file_name(&self) -> String {
        format!("all-cases.{}", self.format.extension())
    }

    pub fn render(&self, bundle: &CaseBundle) -> Result<String, FormatError> {
        self.render_at(bundle, Utc::now())
    }

    pub fn render_at(
        &self,
        bundle: &CaseBundle,
        exported_at: DateTime<Utc>,
    ) -> Result<String, FormatError> {
        match self.format {
            ExportFormat::Markdown => {
                let view = DocumentView::new(bundle, exported_at, &self.html);
                let context = Context::from_serialize(&view).map_err(|e| FormatError::Render {
                    case: bundle.id().to_string(),
                    message: error_chain(&e),
                })?;
                self.tera
                    .render(TEMPLATE_NAME, &context)
                    .map_err(|e| FormatError::Render {
                        case: bundle.id().to_string(),
                        message: error_chain(&e),
                    })
            }
            ExportFormat::Json => {
                serde_json::to_string_pretty(bundle).map_err(|e| FormatError::Json {
                    case: bundle.id().to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Join rendered documents, in the order given, into one document.
    pub fn combine(&self, documents: &[String]) -> String {
        match self.format {
            ExportFormat::Markdown => documents.join(COMBINED_SEPARATOR),
            ExportFormat::Json => {
                if documents.is_empty() {
                    "[]\n".to_string()
                } else {
                    format!("[\n{}\n]\n", documents.join(",\n"))
                }
            }
        }
    }
}

/// Tera hides the useful part of an error in its source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[derive(Serialize)]
struct DocumentView {
    case: CaseView,
    comments: Vec<CommentView>,
    attachments: Vec<AttachmentView>,
    missing: Vec<&'static str>,
    exported_at: String,
}

#[derive(Serialize)]
struct CaseView {
    id: String,
    summary: String,
    status: String,
    severity: String,
    product: String,
    case_type: String,
    created: String,
    updated: String,
    closed: Option<String>,
    owner: String,
    contact: String,
    account: String,
    description: String,
}

#[derive(Serialize)]
struct CommentView {
    number: usize,
    author: String,
    author_email: Option<String>,
    date: String,
    visibility: &'static str,
    text: String,
}

#[derive(Serialize)]
struct AttachmentView {
    filename: String,
    size: String,
    id_short: String,
    uploaded: String,
}

impl DocumentView {
    fn new(bundle: &CaseBundle, exported_at: DateTime<Utc>, html: &HtmlCleaner) -> Self {
        let case = &bundle.case;
        Self {
            case: CaseView {
                id: case.id.to_string(),
                summary: case.summary.clone(),
                status: cell(&case.status),
                severity: cell(&case.severity),
                product: cell(&case.product_line()),
                case_type: cell(&case.case_type),
                created: format_time(case.created_at),
                updated: format_time(case.last_modified),
                closed: case.closed_at.map(|at| format_time(Some(at))),
                owner: cell(&case.owner),
                contact: cell(&with_detail(&case.contact_name, &case.contact_email)),
                account: cell(&with_detail(&case.account_name, &case.account_number)),
                description: html.clean(&case.description),
            },
            comments: bundle
                .comments
                .iter()
                .enumerate()
                .map(|(index, comment)| CommentView::new(index + 1, comment, html))
                .collect(),
            attachments: bundle.attachments.iter().map(AttachmentView::new).collect(),
            missing: bundle.gaps.iter().map(|gap| gap.part.as_str()).collect(),
            exported_at: format_time(Some(exported_at)),
        }
    }
}

impl CommentView {
    fn new(number: usize, comment: &Comment, html: &HtmlCleaner) -> Self {
        Self {
            number,
            author: comment.author.clone(),
            author_email: comment.author_email.clone(),
            date: format_time(comment.created_at),
            visibility: if comment.public { "Public" } else { "Internal" },
            text: html.clean(&comment.text),
        }
    }
}

impl AttachmentView {
    fn new(attachment: &Attachment) -> Self {
        Self {
            filename: cell(&attachment.filename),
            size: format_size(attachment.size),
            id_short: short_id(&attachment.id),
            uploaded: format_time(attachment.created_at),
        }
    }
}

/// Make a value safe inside a markdown table cell.
fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// `"name (detail)"`, or whichever half is present.
fn with_detail(name: &str, detail: &str) -> String {
    match (name.is_empty(), detail.is_empty()) {
        (false, false) => format!("{} ({})", name, detail),
        (false, true) => name.to_string(),
        (true, false) => detail.to_string(),
        (true, true) => String::new(),
    }
}

/// `2026-01-02 03:04:05 UTC`, or `N/A`.
pub fn format_time(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "N/A".to_string(),
    }
}

/// Binary units with one decimal: `512 B`, `1.5 KB`, `2.0 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, prefix)
}

/// Long content ids shortened to their first 8 characters.
pub fn short_id(id: &str) -> String {
    if id.chars().count() > 13 {
        let head: String = id.chars().take(8).collect();
        format!("{}...", head)
    } else {
        id.to_string()
    }
}

/// Converts the HTML fragments the service stores in descriptions and
/// comments into readable markdown-ish text.
struct HtmlCleaner {
    rules: Vec<(Regex, &'static str)>,
    any_tag: Regex,
    entity: Regex,
    blank_runs: Regex,
}

impl HtmlCleaner {
    fn new() -> Result<Self, FormatError> {
        const RULES: &[(&str, &str)] = &[
            (r#"<a\s+href="([^"]+)"[^>]*>([^<]+)</a>"#, "[${2}](${1})"),
            (r"<br\s*/?>", "\n"),
            (r"</?p>", "\n"),
            (r"</?(strong|b)>", "**"),
            (r"</?(em|i)>", "*"),
            (r"</?code>", "`"),
            (r"</?pre>", "\n```\n"),
            (r"<li>", "\n- "),
            (r"</li>", ""),
            (r"</?(ul|ol)>", "\n"),
            (r"<h1>", "\n# "),
            (r"<h2>", "\n## "),
            (r"<h3>", "\n### "),
            (r"</h[1-3]>", "\n"),
            (r"<blockquote>", "\n> "),
            (r"</blockquote>", "\n"),
        ];
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| FormatError::Template(e.to_string()))
        };

        let mut rules = Vec::with_capacity(RULES.len());
        for (pattern, replacement) in RULES {
            rules.push((compile(&format!("(?i){}", pattern))?, *replacement));
        }
        Ok(Self {
            rules,
            any_tag: compile(r"<[^>]+>")?,
            entity: compile(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});")?,
            blank_runs: compile(r"\n{3,}")?,
        })
    }

    fn clean(&self, input: &str) -> String {
        let mut text = input.replace("\r\n", "\n");
        for (pattern, replacement) in &self.rules {
            text = pattern.replace_all(&text, *replacement).into_owned();
        }
        text = self.any_tag.replace_all(&text, "").into_owned();
        // Entities are decoded after tag removal so escaped markup stays visible.
        text = self
            .entity
            .replace_all(&text, |caps: &Captures| decode_entity(&caps[0], &caps[1]))
            .into_owned();
        text = self.blank_runs.replace_all(&text, "\n\n").into_owned();
        text.trim().to_string()
    }
}

fn decode_entity(whole: &str, body: &str) -> String {
    let decoded = if let Some(hex) = body
        .strip_prefix("#x")
        .or_else(|| body.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = body.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        match body {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => None,
        }
    };
    match decoded {
        Some(ch) => ch.to_string(),
        None => whole.to_string(),
    }
}
