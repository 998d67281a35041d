use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payment state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Failed,
    Paid,
}

impl TransactionStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Failed, Self::Paid];

    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Paid => "paid",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Failed => "Failed",
            Self::Paid => "Paid",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            "paid" => Ok(Self::Paid),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Note category ("Kategori Catatan") used to classify cashier reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCategory {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cashier report ("Laporan Kasir") filed under a note category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashierReport {
    pub id: i64,
    pub note_category_id: i64,
    pub report_date: NaiveDate,
    pub description: String,
    /// Whole rupiah.
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sale or payment record ("Transaksi").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// Whole rupiah.
    pub total: i64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Predicate applied to the transaction list. `status: None` selects every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    pub fn all() -> Self {
        Self { status: None }
    }

    pub fn with_status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    /// Evaluates the predicate against an already loaded record.
    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.status
            .map(|status| transaction.status == status)
            .unwrap_or(true)
    }
}

/// Per-field validation messages keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("invalid input: {}", summarize(.fields))]
pub struct ValidationErrors {
    pub fields: BTreeMap<String, String>,
}

fn summarize(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields.insert(field.to_string(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

fn required(errors: &mut ValidationErrors, field: &str, value: &str, max_len: usize) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(field, "wajib diisi");
    } else if trimmed.chars().count() > max_len {
        errors.add(field, format!("maksimal {max_len} karakter"));
    }
    trimmed.to_string()
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

fn non_negative(errors: &mut ValidationErrors, field: &str, value: i64) {
    if value < 0 {
        errors.add(field, "tidak boleh negatif");
    }
}

/// Form payload for creating or editing a note category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NoteCategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NoteCategoryInput {
    /// Trims the payload and checks required fields.
    pub fn validate(self) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let name = required(&mut errors, "name", &self.name, 255);
        errors.into_result(Self {
            name,
            description: optional(self.description),
        })
    }
}

/// Form payload for creating or editing a cashier report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CashierReportInput {
    pub note_category_id: i64,
    pub report_date: NaiveDate,
    pub description: String,
    pub amount: i64,
}

impl CashierReportInput {
    pub fn validate(self) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.note_category_id <= 0 {
            errors.add("note_category_id", "wajib diisi");
        }
        let description = required(&mut errors, "description", &self.description, 1000);
        non_negative(&mut errors, "amount", self.amount);
        errors.into_result(Self {
            description,
            ..self
        })
    }
}

/// Form payload for creating or editing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionInput {
    pub code: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub total: i64,
    #[serde(default)]
    pub status: TransactionStatus,
}

impl TransactionInput {
    pub fn validate(self) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let code = required(&mut errors, "code", &self.code, 64);
        non_negative(&mut errors, "total", self.total);
        errors.into_result(Self {
            code,
            customer_name: optional(self.customer_name),
            ..self
        })
    }
}
