//! Terminal timeline view for `relboard timeline`.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use console::{Emoji, style};
use std::fmt::Write as _;

use relboard::board::db::BoardDb;
use relboard::config::RelboardConfig;
use relboard::schedule::{Dashboard, PhaseStatus, build_dashboard, local_now};

static DONE: Emoji<'_, '_> = Emoji("✅ ", "[x] ");
static ACTIVE: Emoji<'_, '_> = Emoji("▶️  ", "[>] ");
static PENDING: Emoji<'_, '_> = Emoji("⏳ ", "[ ] ");

pub fn cmd_timeline(config: &RelboardConfig, date: Option<NaiveDate>, json: bool) -> Result<()> {
    let db_path = &config.database.path;
    if !db_path.exists() {
        bail!(
            "No release board database at {}. Run 'relboard serve --init' first.",
            db_path.display()
        );
    }

    let db = BoardDb::new(db_path)?;
    let snapshots = db.list_snapshots()?;

    // A given date is evaluated at midday, clear of the midnight boundary.
    let now = match date {
        Some(date) => date
            .and_hms_opt(12, 0, 0)
            .context("Invalid evaluation date")?,
        None => local_now(),
    };
    let dashboard = build_dashboard(&snapshots, now);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&dashboard).context("Failed to serialize dashboard")?
        );
    } else {
        print!("{}", render_timeline(&dashboard));
    }
    Ok(())
}

fn status_marker(status: PhaseStatus) -> String {
    match status {
        PhaseStatus::Completed => format!("{}{}", DONE, style(status.as_str()).green()),
        PhaseStatus::InProgress => format!("{}{}", ACTIVE, style(status.as_str()).yellow().bold()),
        PhaseStatus::Upcoming => format!("{}{}", PENDING, style(status.as_str()).dim()),
    }
}

pub fn render_timeline(dashboard: &Dashboard) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        style(format!(
            "Release timeline as of {}",
            dashboard.generated_at.format("%Y-%m-%d %H:%M")
        ))
        .bold()
    );

    if dashboard.products.is_empty() {
        let _ = writeln!(out, "\nNo releases scheduled.");
        return out;
    }

    for product in &dashboard.products {
        let _ = writeln!(out);
        let version = product.version.as_deref().unwrap_or("-");
        let _ = writeln!(
            out,
            "{}  v{}  [{}/{}]",
            style(&product.name).cyan().bold(),
            version,
            product.completed_count,
            product.total
        );

        for milestone in &product.milestones {
            let _ = writeln!(
                out,
                "  {:<12} {}  {}",
                milestone.label,
                milestone.date,
                status_marker(milestone.status)
            );
        }

        if !product.release_notes.is_empty() {
            let _ = writeln!(out, "  {}", style("Release notes").underlined());
            for block in &product.release_notes {
                for line in block.content.lines() {
                    let _ = writeln!(out, "    {}", line);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use relboard::schedule::ProductSnapshot;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_render_empty_board() {
        let dashboard = build_dashboard(&[], d(2024, 1, 15).and_hms_opt(12, 0, 0).unwrap());
        let text = console::strip_ansi_codes(&render_timeline(&dashboard)).to_string();
        assert!(text.contains("2024-01-15 12:00"));
        assert!(text.contains("No releases scheduled."));
    }

    #[test]
    fn test_render_product_milestones_and_notes() {
        let snapshot = ProductSnapshot {
            name: "Viewer".into(),
            development_date: d(2024, 1, 1),
            qa_date: d(2024, 2, 1),
            release_date: d(2024, 3, 1),
            version: Some("2.0.0".into()),
            release_notes: Some("1. Faster\n   sync".into()),
        };
        let dashboard = build_dashboard(&[snapshot], d(2024, 1, 15).and_hms_opt(12, 0, 0).unwrap());
        let text = console::strip_ansi_codes(&render_timeline(&dashboard)).to_string();

        assert!(text.contains("Viewer  v2.0.0  [1/3]"));
        assert!(text.contains("2024-02-01"));
        assert!(text.contains("in-progress"));
        assert!(text.contains("upcoming"));
        assert!(text.contains("    1. Faster\n    sync"));
    }
}
