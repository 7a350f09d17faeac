// Cache diagnostics panel.
// Renders a CacheStats snapshot for operators.

use chrono::{DateTime, Utc};
use ratatui::{prelude::*, widgets::*};

use crate::cache::CacheStats;

const LABEL_WIDTH: usize = 16;

/// Format a timestamp as relative time (e.g., "2h ago").
pub fn format_relative_time(dt: &DateTime<Utc>) -> String {
    let now = Utc::now();
    let duration = now.signed_duration_since(*dt);

    if duration.num_days() > 0 {
        format!("{}d ago", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{}m ago", duration.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn row(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("  {:<width$}", label, width = LABEL_WIDTH),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn timestamp(dt: Option<&DateTime<Utc>>) -> String {
    dt.map(format_relative_time)
        .unwrap_or_else(|| "-".to_string())
}

/// Lines shown in the stats panel.
pub fn stats_lines(stats: &CacheStats) -> Vec<Line<'static>> {
    let expired_color = if stats.expired_entries > 0 {
        Color::Yellow
    } else {
        Color::White
    };

    let mut lines = vec![
        row("Entries", stats.total_entries.to_string(), Color::White),
        row("Size", stats.size_display(), Color::White),
        row("Expired", stats.expired_entries.to_string(), expired_color),
        row("Devices", stats.devices.to_string(), Color::White),
        row("Oldest", timestamp(stats.oldest_entry.as_ref()), Color::DarkGray),
        row("Newest", timestamp(stats.newest_entry.as_ref()), Color::DarkGray),
    ];

    if !stats.by_data_type.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  By data type",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for (data_type, count) in &stats.by_data_type {
            lines.push(row(data_type, count.to_string(), Color::White));
        }
    }

    lines
}

/// Height needed to show every line plus the border.
pub fn stats_height(stats: &CacheStats) -> u16 {
    (stats_lines(stats).len() + 2).min(u16::MAX as usize) as u16
}

/// Render the stats panel into `area`.
pub fn render_stats(frame: &mut Frame, stats: &CacheStats, area: Rect) {
    let paragraph = Paragraph::new(stats_lines(stats)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Cache ")
            .title_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
    );

    frame.render_widget(paragraph, area);
}
