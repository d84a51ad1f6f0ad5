use std::fmt::Write;

use ansi_term::Colour;
use chrono::{Duration, Local, TimeZone};

use crate::background::{machine::SiteState, storage::entities::TimeData};

/// One line per monitored domain: name, domain, usage against budget and current state.
pub fn format_status(data: &TimeData, today: &str, now_ms: i64) -> String {
    if data.sites.is_empty() {
        return "No domains are monitored\n".into();
    }

    let mut out = String::new();
    for (domain, record) in &data.sites {
        // Counters from an earlier day are already void, the host just hasn't rolled them yet.
        let spent = if record.is_stale(today) {
            0
        } else {
            record.time_spent
        };
        let state = SiteState::of(data, domain, today, now_ms);
        let _ = writeln!(
            out,
            "{}\t{}\t{} / {}\t{}",
            record.display_name(domain),
            domain,
            format_duration(spent),
            format_duration(record.time_limit),
            format_state(&state)
        );
    }
    out
}

pub fn format_state(state: &SiteState) -> String {
    match state {
        SiteState::Unwatched => "not monitored".into(),
        SiteState::Tracking => Colour::Green.paint("active").to_string(),
        SiteState::Blocked => Colour::Red.bold().paint("BLOCKED").to_string(),
        SiteState::Ignored { until } => {
            let until = Local
                .timestamp_millis_opt(*until)
                .single()
                .map(|v| v.format("%H:%M").to_string())
                .unwrap_or_else(|| until.to_string());
            Colour::Yellow.paint(format!("ignored until {until}")).to_string()
        }
    }
}

fn format_duration(ms: u64) -> String {
    let v = Duration::milliseconds(ms as i64);
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}
