//! Release schedule evaluation.
//!
//! ## Overview
//!
//! Pure functions that turn stored release data into what the board shows:
//!
//! ```text
//! Vec<ProductSnapshot> ──> build_dashboard(now) ──> Dashboard
//!                              │
//!                              ├─ phase::compute_phase_statuses()  per product
//!                              └─ notes::segment_release_notes()   per product
//! ```
//!
//! Nothing here reads the clock except [`local_now`], and nothing caches a
//! result: statuses drift with time, so callers rebuild the dashboard on
//! every render, change notification or refresh tick.

pub mod notes;
pub mod phase;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub use notes::{NotesBlock, segment_release_notes};
pub use phase::{
    MILESTONE_COUNT, MilestoneKind, MilestoneStatus, PhaseReport, PhaseStatus,
    compute_phase_statuses,
};

/// Immutable view of one product's schedule, rebuilt on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub development_date: NaiveDate,
    pub qa_date: NaiveDate,
    pub release_date: NaiveDate,
    pub version: Option<String>,
    pub release_notes: Option<String>,
}

impl ProductSnapshot {
    pub fn milestone_dates(&self) -> [NaiveDate; MILESTONE_COUNT] {
        [self.development_date, self.qa_date, self.release_date]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneView {
    pub kind: MilestoneKind,
    pub label: String,
    pub label_ko: String,
    pub date: NaiveDate,
    pub display_date: String,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_ko: Option<String>,
}

/// A product card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTimeline {
    pub name: String,
    pub version: Option<String>,
    pub milestones: Vec<MilestoneView>,
    pub completed_count: usize,
    pub total: usize,
    /// Empty when the product has no notes or the notes hold no text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub release_notes: Vec<NotesBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub generated_at: NaiveDateTime,
    pub products: Vec<ProductTimeline>,
}

/// Current local wall-clock time, the reference instant for status derivation.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Long-form Korean date, e.g. `2024년 1월 15일`.
pub fn format_date_ko(date: NaiveDate) -> String {
    date.format("%Y년 %-m월 %-d일").to_string()
}

pub fn build_timeline(snapshot: &ProductSnapshot, now: NaiveDateTime) -> ProductTimeline {
    let report = compute_phase_statuses(snapshot.milestone_dates(), now);

    let milestones = report
        .milestones
        .iter()
        .map(|m| MilestoneView {
            kind: m.kind,
            label: m.kind.label().to_string(),
            label_ko: m.kind.label_ko().to_string(),
            date: m.date,
            display_date: format_date_ko(m.date),
            status: m.status,
            badge_ko: m.status.badge_ko().map(str::to_string),
        })
        .collect();

    ProductTimeline {
        name: snapshot.name.clone(),
        version: snapshot.version.clone(),
        milestones,
        completed_count: report.completed_count,
        total: MILESTONE_COUNT,
        release_notes: segment_release_notes(snapshot.release_notes.as_deref()),
    }
}

/// Evaluate every snapshot against a single instant, preserving input order.
pub fn build_dashboard(snapshots: &[ProductSnapshot], now: NaiveDateTime) -> Dashboard {
    Dashboard {
        generated_at: now,
        products: snapshots.iter().map(|s| build_timeline(s, now)).collect(),
    }
}
