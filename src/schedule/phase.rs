//! Phase status derivation.
//!
//! Maps the three milestone dates of a product and a reference instant to a
//! per-milestone [`PhaseStatus`]. Milestone dates are compared as instants at
//! local midnight, so a milestone dated today is still open at 00:00 and
//! becomes completed one tick later.
//!
//! Input dates are evaluated literally: nothing checks that
//! `development <= qa <= release`, and misordered input can yield a
//! non-monotonic status sequence.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Number of milestones tracked per product.
pub const MILESTONE_COUNT: usize = 3;

/// Fixed identity of a schedule checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    Development,
    Qa,
    Release,
}

impl MilestoneKind {
    /// Evaluation order of the milestones.
    pub const ALL: [MilestoneKind; MILESTONE_COUNT] = [Self::Development, Self::Qa, Self::Release];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Qa => "qa",
            Self::Release => "release",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Development => "Development",
            Self::Qa => "QA",
            Self::Release => "Release",
        }
    }

    /// Label shown on the public board.
    pub fn label_ko(&self) -> &'static str {
        match self {
            Self::Development => "개발 종료",
            Self::Qa => "QA 종료",
            Self::Release => "최종 릴리즈",
        }
    }
}

impl std::fmt::Display for MilestoneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived state of a milestone relative to "now". Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    Completed,
    InProgress,
    Upcoming,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::InProgress => "in-progress",
            Self::Upcoming => "upcoming",
        }
    }

    /// Badge text on the public board; upcoming milestones carry none.
    pub fn badge_ko(&self) -> Option<&'static str> {
        match self {
            Self::Completed => Some("완료"),
            Self::InProgress => Some("진행 중"),
            Self::Upcoming => None,
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluated milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneStatus {
    pub kind: MilestoneKind,
    pub date: NaiveDate,
    pub status: PhaseStatus,
}

/// Result of evaluating a product's three milestones against one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub milestones: [MilestoneStatus; MILESTONE_COUNT],
    pub completed_count: usize,
}

impl PhaseReport {
    pub fn statuses(&self) -> [PhaseStatus; MILESTONE_COUNT] {
        self.milestones.map(|m| m.status)
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Status of a single milestone given the end date of the one before it.
pub fn phase_status(now: NaiveDateTime, date: NaiveDate, prev: Option<NaiveDate>) -> PhaseStatus {
    let end = midnight(date);
    if now > end {
        return PhaseStatus::Completed;
    }

    match prev {
        // First milestone: nothing blocks it, so it is open until its date passes.
        None => PhaseStatus::InProgress,
        Some(prev) if now > midnight(prev) && now <= end => PhaseStatus::InProgress,
        Some(_) => PhaseStatus::Upcoming,
    }
}

/// Evaluate `[development, qa, release]` against `now`.
///
/// Each milestone is judged on its own date and its predecessor's, so the
/// completed count is a plain tally rather than a prefix length.
pub fn compute_phase_statuses(dates: [NaiveDate; MILESTONE_COUNT], now: NaiveDateTime) -> PhaseReport {
    let milestones: [MilestoneStatus; MILESTONE_COUNT] = std::array::from_fn(|i| {
        let prev = i.checked_sub(1).map(|p| dates[p]);
        MilestoneStatus {
            kind: MilestoneKind::ALL[i],
            date: dates[i],
            status: phase_status(now, dates[i], prev),
        }
    });

    let completed_count = milestones
        .iter()
        .filter(|m| m.status == PhaseStatus::Completed)
        .count();

    PhaseReport {
        milestones,
        completed_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn at(y: i32, m: u32, day: u32, h: u32) -> NaiveDateTime {
        d(y, m, day).and_hms_opt(h, 0, 0).unwrap()
    }

    fn schedule() -> [NaiveDate; 3] {
        [d(2024, 1, 1), d(2024, 2, 1), d(2024, 3, 1)]
    }

    #[test]
    fn test_mid_qa_scenario() {
        let report = compute_phase_statuses(schedule(), midnight(d(2024, 1, 15)));
        assert_eq!(
            report.statuses(),
            [
                PhaseStatus::Completed,
                PhaseStatus::InProgress,
                PhaseStatus::Upcoming
            ]
        );
        assert_eq!(report.completed_count, 1);
    }

    #[test]
    fn test_all_completed_after_release() {
        let report = compute_phase_statuses(schedule(), at(2024, 3, 2, 9));
        assert!(report
            .milestones
            .iter()
            .all(|m| m.status == PhaseStatus::Completed));
        assert_eq!(report.completed_count, 3);
    }

    #[test]
    fn test_before_first_date() {
        let report = compute_phase_statuses(schedule(), at(2023, 12, 1, 12));
        assert_eq!(
            report.statuses(),
            [
                PhaseStatus::InProgress,
                PhaseStatus::Upcoming,
                PhaseStatus::Upcoming
            ]
        );
        assert_eq!(report.completed_count, 0);
    }

    #[test]
    fn test_milestone_open_at_its_own_midnight() {
        // Exactly at the development end instant: not yet past it.
        let report = compute_phase_statuses(schedule(), midnight(d(2024, 1, 1)));
        assert_eq!(report.milestones[0].status, PhaseStatus::InProgress);
        assert_eq!(report.milestones[1].status, PhaseStatus::Upcoming);

        // Any later instant that day completes it.
        let report = compute_phase_statuses(schedule(), at(2024, 1, 1, 1));
        assert_eq!(report.milestones[0].status, PhaseStatus::Completed);
        assert_eq!(report.milestones[1].status, PhaseStatus::InProgress);
    }

    #[test]
    fn test_completed_count_monotonic_for_ordered_dates() {
        let dates = schedule();
        let mut previous = 0;
        let mut day = d(2023, 12, 15);
        while day <= d(2024, 3, 15) {
            for hour in [0, 12] {
                let now = day.and_hms_opt(hour, 0, 0).unwrap();
                let count = compute_phase_statuses(dates, now).completed_count;
                assert!(count >= previous, "count dropped on {day} {hour}:00");
                previous = count;
            }
            day = day.succ_opt().unwrap();
        }
        assert_eq!(previous, 3);
    }

    #[test]
    fn test_out_of_order_dates_are_not_corrected() {
        // QA end precedes development end.
        let dates = [d(2024, 3, 1), d(2024, 1, 1), d(2024, 2, 1)];
        let report = compute_phase_statuses(dates, at(2024, 1, 15, 0));
        assert_eq!(
            report.statuses(),
            [
                PhaseStatus::InProgress,
                PhaseStatus::Completed,
                PhaseStatus::InProgress
            ]
        );
        assert_eq!(report.completed_count, 1);
    }

    #[test]
    fn test_kinds_follow_fixed_order() {
        let report = compute_phase_statuses(schedule(), at(2024, 1, 15, 0));
        let kinds: Vec<_> = report.milestones.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, MilestoneKind::ALL.to_vec());
        assert_eq!(report.milestones[2].date, d(2024, 3, 1));
    }

    #[test]
    fn test_status_serde_uses_kebab_case() {
        assert_eq!(
            serde_json::to_string(&PhaseStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(
            serde_json::to_string(&MilestoneKind::Qa).unwrap(),
            "\"qa\""
        );
        assert_eq!(PhaseStatus::Upcoming.badge_ko(), None);
    }
}
