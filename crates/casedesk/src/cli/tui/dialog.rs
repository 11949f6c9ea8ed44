//! Modal overlays: help, quick search and the filter editor.

use casedesk_api::{split_list, CaseFilter};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Outcome of feeding a key to a single-line input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextInputResult {
    Committed,
    Cancelled,
    Continue,
    /// Navigation and other keys the field does not consume.
    NotHandled,
}

/// Enter commits, Esc cancels, Ctrl+U clears.
pub fn handle_text_input(key: KeyEvent, input: &mut String) -> TextInputResult {
    match key.code {
        KeyCode::Enter => TextInputResult::Committed,
        KeyCode::Esc => TextInputResult::Cancelled,
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            input.clear();
            TextInputResult::Continue
        }
        KeyCode::Char(c) => {
            input.push(c);
            TextInputResult::Continue
        }
        KeyCode::Backspace => {
            input.pop();
            TextInputResult::Continue
        }
        _ => TextInputResult::NotHandled,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Status,
    Severity,
    Product,
    Account,
    Keyword,
    Owner,
    IncludeClosed,
}

impl FilterField {
    pub const ALL: [FilterField; 7] = [
        FilterField::Status,
        FilterField::Severity,
        FilterField::Product,
        FilterField::Account,
        FilterField::Keyword,
        FilterField::Owner,
        FilterField::IncludeClosed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FilterField::Status => "Status",
            FilterField::Severity => "Severity",
            FilterField::Product => "Product",
            FilterField::Account => "Account",
            FilterField::Keyword => "Keyword",
            FilterField::Owner => "Owner",
            FilterField::IncludeClosed => "Include closed",
        }
    }

    fn index(&self) -> usize {
        FilterField::ALL
            .iter()
            .position(|field| field == self)
            .unwrap_or(0)
    }

    fn step(&self, delta: isize) -> FilterField {
        let len = FilterField::ALL.len() as isize;
        let next = (self.index() as isize + delta).rem_euclid(len);
        FilterField::ALL[next as usize]
    }
}

/// What the app should do after a key reached the filter dialog.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogAction {
    Continue,
    Apply(CaseFilter),
    Cancel,
}

/// Editable copy of a filter. List fields are comma separated.
#[derive(Debug, Clone)]
pub struct FilterDialog {
    base: CaseFilter,
    pub focus: FilterField,
    pub status: String,
    pub severity: String,
    pub product: String,
    pub account: String,
    pub keyword: String,
    pub owner: String,
    pub include_closed: bool,
}

impl FilterDialog {
    pub fn new(filter: &CaseFilter) -> Self {
        Self {
            base: filter.clone(),
            focus: FilterField::Status,
            status: filter.statuses.join(", "),
            severity: filter.severities.join(", "),
            product: filter.products.join(", "),
            account: filter.accounts.join(", "),
            keyword: filter.keyword.clone().unwrap_or_default(),
            owner: filter.owner.clone().unwrap_or_default(),
            include_closed: filter.include_closed,
        }
    }

    /// Text of a field, `None` for the toggle.
    pub fn value(&self, field: FilterField) -> Option<&str> {
        match field {
            FilterField::Status => Some(&self.status),
            FilterField::Severity => Some(&self.severity),
            FilterField::Product => Some(&self.product),
            FilterField::Account => Some(&self.account),
            FilterField::Keyword => Some(&self.keyword),
            FilterField::Owner => Some(&self.owner),
            FilterField::IncludeClosed => None,
        }
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            FilterField::Status => Some(&mut self.status),
            FilterField::Severity => Some(&mut self.severity),
            FilterField::Product => Some(&mut self.product),
            FilterField::Account => Some(&mut self.account),
            FilterField::Keyword => Some(&mut self.keyword),
            FilterField::Owner => Some(&mut self.owner),
            FilterField::IncludeClosed => None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> DialogAction {
        match key.code {
            KeyCode::Tab | KeyCode::Down => {
                self.focus = self.focus.step(1);
                return DialogAction::Continue;
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = self.focus.step(-1);
                return DialogAction::Continue;
            }
            KeyCode::Enter => return DialogAction::Apply(self.to_filter()),
            KeyCode::Esc => return DialogAction::Cancel,
            _ => {}
        }

        if self.focus == FilterField::IncludeClosed {
            if key.code == KeyCode::Char(' ') {
                self.include_closed = !self.include_closed;
            }
            return DialogAction::Continue;
        }
        if let Some(text) = self.focused_text() {
            // Enter and Esc were taken above.
            handle_text_input(key, text);
        }
        DialogAction::Continue
    }

    /// The edited filter. Fields the dialog does not show (group, dates)
    /// carry over unchanged.
    pub fn to_filter(&self) -> CaseFilter {
        let text = |value: &str| Some(value.trim().to_string()).filter(|v| !v.is_empty());
        CaseFilter {
            statuses: split_list(&self.status),
            severities: split_list(&self.severity),
            products: split_list(&self.product),
            accounts: split_list(&self.account),
            keyword: text(&self.keyword),
            owner: text(&self.owner),
            include_closed: self.include_closed,
            ..self.base.clone()
        }
    }
}
