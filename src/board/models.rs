use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::BoardError;
use crate::schedule::ProductSnapshot;

/// Version label shown for a release that never had one set.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Tables that publish change notifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Releases,
    VersionHistory,
    Customers,
    Modules,
    CustomerModuleVersions,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Releases => "releases",
            Self::VersionHistory => "version_history",
            Self::Customers => "customers",
            Self::Modules => "modules",
            Self::CustomerModuleVersions => "customer_module_versions",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "releases" => Ok(Self::Releases),
            "version_history" => Ok(Self::VersionHistory),
            "customers" => Ok(Self::Customers),
            "modules" => Ok(Self::Modules),
            "customer_module_versions" => Ok(Self::CustomerModuleVersions),
            _ => Err(format!("Invalid table: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub id: i64,
    pub product_name: String,
    pub dev_end_date: NaiveDate,
    pub qa_end_date: NaiveDate,
    pub release_date: NaiveDate,
    pub version: Option<String>,
    pub release_notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Release {
    pub fn version_or_default(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }
}

impl From<&Release> for ProductSnapshot {
    fn from(release: &Release) -> Self {
        Self {
            name: release.product_name.clone(),
            development_date: release.dev_end_date,
            qa_date: release.qa_end_date,
            release_date: release.release_date,
            version: release.version.clone(),
            release_notes: release.release_notes.clone(),
        }
    }
}

/// Validated fields for inserting or replacing a release.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseDraft {
    pub product_name: String,
    pub dev_end_date: NaiveDate,
    pub qa_end_date: NaiveDate,
    pub release_date: NaiveDate,
    pub version: Option<String>,
    pub release_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionHistoryEntry {
    pub id: i64,
    pub release_id: i64,
    pub version: String,
    pub product_name: String,
    pub dev_end_date: NaiveDate,
    pub qa_end_date: NaiveDate,
    pub release_date: NaiveDate,
    pub release_notes: Option<String>,
    pub changed_by: Option<String>,
    pub change_note: Option<String>,
    pub changed_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDraft {
    pub version: String,
    pub product_name: String,
    pub dev_end_date: NaiveDate,
    pub qa_end_date: NaiveDate,
    pub release_date: NaiveDate,
    pub release_notes: Option<String>,
    pub changed_by: Option<String>,
    pub change_note: Option<String>,
}

impl HistoryDraft {
    /// Snapshot a release as it stands after an edit.
    pub fn from_release(
        release: &Release,
        change_note: Option<String>,
        changed_by: Option<String>,
    ) -> Self {
        Self {
            version: release.version_or_default().to_string(),
            product_name: release.product_name.clone(),
            dev_end_date: release.dev_end_date,
            qa_end_date: release.qa_end_date,
            release_date: release.release_date,
            release_notes: release.release_notes.clone(),
            changed_by,
            change_note,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Module {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

/// Which version of a module a customer runs, joined with both parents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerModule {
    pub id: i64,
    pub customer_id: i64,
    pub module_id: i64,
    pub version: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub uploaded_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub customer: Customer,
    pub module: Module,
}

/// Optional fields of a customer module record; blanks are stored as NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerModuleDraft {
    pub version: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub uploaded_by: Option<String>,
}

impl CustomerModuleDraft {
    pub fn new(
        version: Option<String>,
        image_url: Option<String>,
        notes: Option<String>,
        uploaded_by: Option<String>,
    ) -> Self {
        Self {
            version: non_blank(version),
            image_url: non_blank(image_url),
            notes: non_blank(notes),
            uploaded_by: non_blank(uploaded_by),
        }
    }
}

// ── Ingestion helpers ─────────────────────────────────────────────────

/// `None` for absent or whitespace-only strings, the original otherwise.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Trimmed value of a required text field.
pub fn required_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse a calendar date at the ingestion boundary.
///
/// Accepts `YYYY-MM-DD` and full RFC 3339 timestamps (the date part is kept),
/// since date pickers commonly send either.
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, BoardError> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    chrono::DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.date_naive())
        .map_err(|_| BoardError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

/// The three schedule dates, each required and well-formed.
pub fn parse_schedule(
    dev_end_date: Option<&str>,
    qa_end_date: Option<&str>,
    release_date: Option<&str>,
) -> Result<(NaiveDate, NaiveDate, NaiveDate), BoardError> {
    let (Some(dev), Some(qa), Some(release)) = (
        required_text(dev_end_date),
        required_text(qa_end_date),
        required_text(release_date),
    ) else {
        return Err(BoardError::missing_fields());
    };
    Ok((
        parse_date("dev_end_date", &dev)?,
        parse_date("qa_end_date", &qa)?,
        parse_date("release_date", &release)?,
    ))
}
