//! Terminal rendering of job status.

use chrono::{DateTime, Utc};

use lithybrid_core::JobState;

use crate::types::JobStatus;

/// Width of the progress bar in cells.
pub const BAR_WIDTH: usize = 30;

/// Time left until `expected_end` as `HH:MM:SS`.
///
/// Hours are not wrapped at 24. Once the deadline has passed the countdown
/// reads `00:00:00 (should be done)`.
pub fn format_countdown(expected_end: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (expected_end - now).num_seconds();
    if seconds < 0 {
        return "00:00:00 (should be done)".to_string();
    }
    let (hours, rem) = (seconds / 3600, seconds % 3600);
    format!("{:02}:{:02}:{:02}", hours, rem / 60, rem % 60)
}

/// `[#######-------]  50%`, with `percent` clamped to 0..=100.
pub fn progress_bar(percent: i32, width: usize) -> String {
    let percent = percent.clamp(0, 100) as usize;
    let filled = percent * width / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        percent
    )
}

/// One-line status for the watch loop.
pub fn status_line(status: &JobStatus, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "{:<10} {}",
        status.state.as_str(),
        progress_bar(status.progress, BAR_WIDTH)
    );
    if let Some(ref message) = status.progress_message {
        line.push_str("  ");
        line.push_str(message);
    }
    if !status.state.is_terminal() {
        if let Some(end) = status.expected_end {
            line.push_str(&format!("  ETA {}", format_countdown(end, now)));
        }
    }
    line
}

/// Multi-line report for `lithybrid status` and the end of a watch.
pub fn render_report(status: &JobStatus, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "Job:      {}\nTitle:    {}\nState:    {}\nProgress: {}\n",
        status.job_id,
        status.title,
        status.state,
        progress_bar(status.progress, BAR_WIDTH)
    );
    if let Some(ref message) = status.progress_message {
        out.push_str(&format!("Message:  {}\n", message));
    }
    if status.attempts > 0 {
        out.push_str(&format!("Attempts: {}\n", status.attempts));
    }
    if !status.state.is_terminal() {
        if let Some(end) = status.expected_end {
            out.push_str(&format!("Countdown: {}\n", format_countdown(end, now)));
        }
    }

    match status.state {
        JobState::Failed => {
            if let Some(ref error) = status.error {
                out.push_str(&format!("Error:    {} - {}\n", error.code, error.message));
            }
        }
        JobState::Done => {
            if let Some(ref result) = status.result {
                out.push_str(&format!(
                    "Result:   {} citations from {} papers\n",
                    result.citation_count, result.papers_considered
                ));
                if let Some(ref summary) = result.summary {
                    out.push('\n');
                    out.push_str(summary);
                    out.push('\n');
                }
                if !result.inline {
                    out.push_str(&format!(
                        "\nResult is large; page through {}\n",
                        result.links.citations
                    ));
                }
            }
        }
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn status(state: JobState, progress: i32) -> JobStatus {
        serde_json::from_value(serde_json::json!({
            "job_id": Uuid::nil(),
            "title": "Transformers",
            "limit": 25,
            "state": state,
            "progress": progress,
            "progress_message": "Composing summary from 25 papers",
            "attempts": 1,
            "created_at": at(0),
            "updated_at": at(0),
            "expected_minutes": 5,
            "expected_end": at(300),
        }))
        .unwrap()
    }

    #[test]
    fn test_countdown_formats_hours_minutes_seconds() {
        assert_eq!(format_countdown(at(3725), at(0)), "01:02:05");
        assert_eq!(format_countdown(at(59), at(0)), "00:00:59");
        assert_eq!(format_countdown(at(0), at(0)), "00:00:00");
    }

    #[test]
    fn test_countdown_does_not_wrap_days() {
        assert_eq!(format_countdown(at(90_000), at(0)), "25:00:00");
    }

    #[test]
    fn test_countdown_overdue() {
        assert_eq!(format_countdown(at(0), at(1)), "00:00:00 (should be done)");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 10), "[----------]   0%");
        assert_eq!(progress_bar(50, 10), "[#####-----]  50%");
        assert_eq!(progress_bar(100, 10), "[##########] 100%");
        assert_eq!(progress_bar(140, 4), "[####] 100%");
        assert_eq!(progress_bar(-5, 4), "[----]   0%");
    }

    #[test]
    fn test_status_line_shows_eta_while_running() {
        let line = status_line(&status(JobState::Composing, 60), at(60));
        assert!(line.starts_with("COMPOSING"));
        assert!(line.contains(" 60%"));
        assert!(line.contains("ETA 00:04:00"));
    }

    #[test]
    fn test_report_for_done_job_hides_countdown() {
        let report = render_report(&status(JobState::Done, 100), at(600));
        assert!(report.contains("State:    DONE"));
        assert!(!report.contains("Countdown"));
    }
}
