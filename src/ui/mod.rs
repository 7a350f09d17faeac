// UI module for rendering cache diagnostics.

mod stats;

pub use stats::{format_relative_time, render_stats, stats_height, stats_lines};
