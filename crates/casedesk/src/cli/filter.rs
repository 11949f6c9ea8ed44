//! Filter flags shared by `list`, `export cases` and `tui`.

use casedesk_api::{split_list, CaseFilter};
use chrono::NaiveDate;
use clap::Args;

#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Status words or service statuses, comma separated (see [statuses] in config)
    #[arg(long)]
    pub status: Vec<String>,

    /// Severities, comma separated
    #[arg(long)]
    pub severity: Vec<String>,

    /// Products, comma separated
    #[arg(long)]
    pub product: Vec<String>,

    /// Account numbers, comma separated
    #[arg(long)]
    pub account: Vec<String>,

    /// Free-text search
    #[arg(long)]
    pub keyword: Option<String>,

    /// Case group
    #[arg(long)]
    pub group: Option<String>,

    /// Case owner
    #[arg(long)]
    pub owner: Option<String>,

    /// Created on or after (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Created on or before (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// Include closed cases
    #[arg(long)]
    pub include_closed: bool,
}

impl FilterArgs {
    /// Lay these flags over `base`. Flags that were given replace the
    /// base's value for that field.
    pub fn apply_to(&self, mut base: CaseFilter) -> CaseFilter {
        replace_list(&mut base.statuses, &self.status);
        replace_list(&mut base.severities, &self.severity);
        replace_list(&mut base.products, &self.product);
        replace_list(&mut base.accounts, &self.account);
        if self.keyword.is_some() {
            base.keyword = self.keyword.clone();
        }
        if self.group.is_some() {
            base.group = self.group.clone();
        }
        if self.owner.is_some() {
            base.owner = self.owner.clone();
        }
        if self.since.is_some() {
            base.created_since = self.since;
        }
        if self.until.is_some() {
            base.created_until = self.until;
        }
        if self.include_closed {
            base.include_closed = true;
        }
        base
    }
}

fn replace_list(target: &mut Vec<String>, raw: &[String]) {
    let values: Vec<String> = raw.iter().flat_map(|v| split_list(v)).collect();
    if !values.is_empty() {
        *target = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_replace_base_fields() {
        let base = CaseFilter {
            statuses: vec!["open".into()],
            accounts: vec!["1".into()],
            keyword: Some("disk".into()),
            ..Default::default()
        };
        let args = FilterArgs {
            status: vec!["closed, waiting".into()],
            owner: Some("jdoe".into()),
            ..Default::default()
        };
        let filter = args.apply_to(base);
        assert_eq!(filter.statuses, vec!["closed", "waiting"]);
        assert_eq!(filter.accounts, vec!["1"]);
        assert_eq!(filter.keyword.as_deref(), Some("disk"));
        assert_eq!(filter.owner.as_deref(), Some("jdoe"));
    }

    #[test]
    fn test_no_flags_keeps_base() {
        let base = CaseFilter {
            severities: vec!["1".into()],
            ..Default::default()
        };
        assert_eq!(FilterArgs::default().apply_to(base.clone()), base);
    }
}
