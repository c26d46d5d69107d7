//! Ledger entry model and input validation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracker_config_and_utils::ValidationError;

/// Fixed set of expense categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Food,
    Petrol,
    Salary,
    Transport,
    Shopping,
    Entertainment,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Food,
        Category::Petrol,
        Category::Salary,
        Category::Transport,
        Category::Shopping,
        Category::Entertainment,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Petrol => "Petrol",
            Category::Salary => "Salary",
            Category::Transport => "Transport",
            Category::Shopping => "Shopping",
            Category::Entertainment => "Entertainment",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                ValidationError::new("category", format!("unknown category '{}'", wanted))
            })
    }
}

/// A financial record as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Durable id once the remote store accepted the record, a `local-` sentinel before.
    pub id: String,
    pub amount: Decimal,
    pub description: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
}

/// Prefix of locally assigned ids for records the remote store has not confirmed.
pub const SENTINEL_PREFIX: &str = "local-";

pub fn is_sentinel(id: &str) -> bool {
    id.starts_with(SENTINEL_PREFIX)
}

/// User input for a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub amount: Decimal,
    pub description: String,
    pub category: Category,
    /// Defaults to the time of creation.
    pub created_at: Option<DateTime<Utc>>,
}

impl EntryDraft {
    pub fn new(amount: Decimal, description: impl Into<String>, category: Category) -> Self {
        Self {
            amount,
            description: description.into(),
            category,
            created_at: None,
        }
    }

    /// Check invariants and produce the record to send to the store.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<NewEntry, ValidationError> {
        Ok(NewEntry {
            amount: validate_amount(self.amount)?,
            description: validate_description(&self.description)?,
            category: self.category,
            created_at: self.created_at.unwrap_or(now),
        })
    }
}

/// A validated record without an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub amount: Decimal,
    pub description: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
}

impl NewEntry {
    pub fn with_id(self, id: impl Into<String>) -> LedgerEntry {
        LedgerEntry {
            id: id.into(),
            amount: self.amount,
            description: self.description,
            category: self.category,
            created_at: self.created_at,
        }
    }
}

/// Partial edit of an existing record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub category: Option<Category>,
}

impl EntryPatch {
    pub fn amount(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.description.is_none() && self.category.is_none()
    }

    /// Check invariants of the changed fields. Returns the normalized patch.
    pub fn validate(&self) -> Result<EntryPatch, ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::new("patch", "nothing to update"));
        }
        Ok(EntryPatch {
            amount: self.amount.map(validate_amount).transpose()?,
            description: self
                .description
                .as_deref()
                .map(validate_description)
                .transpose()?,
            category: self.category,
        })
    }

    pub fn apply_to(&self, entry: &LedgerEntry) -> LedgerEntry {
        LedgerEntry {
            id: entry.id.clone(),
            amount: self.amount.unwrap_or(entry.amount),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| entry.description.clone()),
            category: self.category.unwrap_or(entry.category),
            created_at: entry.created_at,
        }
    }
}

fn validate_amount(amount: Decimal) -> Result<Decimal, ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount", "Amount must be greater than 0"));
    }
    Ok(amount.normalize())
}

fn validate_description(description: &str) -> Result<String, ValidationError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("description", "Description is required"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn dec(value: i64) -> Decimal {
        Decimal::from_i64(value).unwrap()
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!("food".parse::<Category>().unwrap(), Category::Food);
        assert_eq!(" ENTERTAINMENT ".parse::<Category>().unwrap(), Category::Entertainment);
        assert_eq!("Bills".parse::<Category>().unwrap_err().field, "category");
    }

    #[test]
    fn test_draft_validation() {
        let now = Utc::now();
        let entry = EntryDraft::new(dec(50), "  Groceries ", Category::Food)
            .validate(now)
            .unwrap();
        assert_eq!(entry.description, "Groceries");
        assert_eq!(entry.created_at, now);

        let err = EntryDraft::new(dec(0), "x", Category::Food).validate(now).unwrap_err();
        assert_eq!(err.field, "amount");
        let err = EntryDraft::new(dec(-5), "x", Category::Food).validate(now).unwrap_err();
        assert_eq!(err.field, "amount");
        let err = EntryDraft::new(dec(5), "   ", Category::Food).validate(now).unwrap_err();
        assert_eq!(err.field, "description");
    }

    #[test]
    fn test_patch_validation_and_apply() {
        assert_eq!(EntryPatch::default().validate().unwrap_err().field, "patch");
        assert_eq!(
            EntryPatch {
                description: Some(" ".into()),
                ..EntryPatch::default()
            }
            .validate()
            .unwrap_err()
            .field,
            "description"
        );

        let entry = EntryDraft::new(dec(10), "Bus", Category::Transport)
            .validate(Utc::now())
            .unwrap()
            .with_id("rec-1");
        let patched = EntryPatch::amount(dec(12)).validate().unwrap().apply_to(&entry);
        assert_eq!(patched.amount, dec(12));
        assert_eq!(patched.description, "Bus");
        assert_eq!(patched.id, "rec-1");
    }

    #[test]
    fn test_sentinel_ids() {
        assert!(is_sentinel("local-123"));
        assert!(!is_sentinel("-NxAbc"));
    }
}
