//! UI utilities for table output.

use crossterm::style::Stylize;

/// Calculate display width of a string (accounting for wide chars like emoji).
fn display_width(s: &str) -> usize {
    s.chars().map(|c| if c.is_ascii() { 1 } else { 2 }).sum()
}

/// Print a section header with box drawing characters.
pub fn print_header(title: &str) {
    let inner_width: usize = 58;
    let total_padding = inner_width.saturating_sub(display_width(title));
    let left_pad = total_padding / 2;
    let right_pad = total_padding - left_pad;

    println!();
    println!("{}", format!("╔{}╗", "═".repeat(inner_width)).dark_cyan());
    println!(
        "{}",
        format!("║{}{}{}║", " ".repeat(left_pad), title, " ".repeat(right_pad)).dark_cyan()
    );
    println!("{}", format!("╚{}╝", "═".repeat(inner_width)).dark_cyan());
    println!();
}

/// Print a small section title.
pub fn print_section(title: &str) {
    println!();
    println!("  {} {}", "▸".dark_cyan(), title.white().bold());
    println!("  {}", "─".repeat(50).dark_grey());
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}

/// Print a key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<14} {}", format!("{}:", key).dark_grey(), value);
}

/// Print a spinner-style progress message (use \r to update).
pub fn print_progress(msg: &str) {
    use std::io::Write;
    print!("  {} {}...", "⏳".yellow(), msg);
    let _ = std::io::stdout().flush();
}

pub fn finish_progress_success(msg: &str) {
    println!("\r  {} {}                    ", "✓".green(), msg);
}

pub fn finish_progress_error(msg: &str) {
    println!("\r  {} {}                    ", "✗".red(), msg);
}

/// Format uptime from seconds to human readable string.
pub fn format_uptime(secs: u64) -> String {
    let minutes = secs / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h {}m", days, hours % 24, minutes % 60)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, secs % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// 平台状态字符串着色：systemd 的 active/inactive 与 Windows 的 Running/Stopped
pub fn format_state(state: &str, is_active: bool) -> String {
    if is_active {
        format!("● {}", state).green().to_string()
    } else {
        match state.to_lowercase().as_str() {
            "failed" => format!("✗ {}", state).red().to_string(),
            "inactive" | "stopped" | "dead" => format!("○ {}", state).dark_grey().to_string(),
            _ => format!("? {}", state).yellow().to_string(),
        }
    }
}

/// 日志级别着色（journald 优先级名或 Windows 事件级别名）
pub fn format_level(level: &str) -> String {
    let padded = format!("{:<11}", level);
    match level.to_lowercase().as_str() {
        "emerg" | "alert" | "crit" | "err" | "error" | "critical" => padded.red().to_string(),
        "warning" | "warn" => padded.yellow().to_string(),
        "debug" | "verbose" => padded.dark_grey().to_string(),
        _ => padded,
    }
}

/// Print a table header.
pub fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect::<Vec<_>>()
        .join(" ");
    println!("  {}", header.white().bold());
    let separator: String = columns
        .iter()
        .map(|(_, width)| "─".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    println!("  {}", separator.dark_grey());
}

/// Print an empty state message.
pub fn print_empty(msg: &str) {
    println!();
    println!("  {}", msg.dark_grey().italic());
    println!();
}

/// Print a hint/tip message.
pub fn print_hint(msg: &str) {
    println!("  {} {}", "💡".yellow(), msg.dark_grey());
}

/// 按字符截断，避免切到多字节字符中间
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max.saturating_sub(3)).collect::<String>())
    } else {
        s.to_string()
    }
}
