//! Terminal styling for ladder output
//!
//! Headers carry a `▲` marker and tiers get a fixed accent so the ranking,
//! status and candidate views read alike.

/// ANSI color codes
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

use colors::*;

pub fn style_bold(s: &str) -> String {
    format!("{}{}{}", BOLD, s, RESET)
}

pub fn style_dim(s: &str) -> String {
    format!("{}{}{}", DIM, s, RESET)
}

pub fn style_yellow(s: &str) -> String {
    format!("{}{}{}", YELLOW, s, RESET)
}

pub fn icon_success() -> String {
    format!("{}✓{}", GREEN, RESET)
}

pub fn icon_error() -> String {
    format!("{}✗{}", RED, RESET)
}

pub fn icon_warning() -> String {
    format!("{}⚠{}", YELLOW, RESET)
}

pub fn print_success(msg: &str) {
    println!("{} {}", icon_success(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}{}{}", icon_error(), RED, msg, RESET);
}

pub fn print_warning(msg: &str) {
    println!("{} {}{}{}", icon_warning(), YELLOW, msg, RESET);
}

/// Accent of a tier: gold at the top, fading towards the bottom
pub fn tier_color(tier: u32) -> &'static str {
    match tier {
        1 => YELLOW,
        2 => CYAN,
        3 => GREEN,
        _ => GRAY,
    }
}

/// Same accent for ranking table cells
pub fn tier_cell_color(tier: u32) -> comfy_table::Color {
    match tier {
        1 => comfy_table::Color::Yellow,
        2 => comfy_table::Color::Cyan,
        3 => comfy_table::Color::Green,
        _ => comfy_table::Color::DarkGrey,
    }
}

/// `▲ title ─────` padded to a fixed width
pub fn header_line(title: &str) -> String {
    let rule = "─".repeat(48usize.saturating_sub(title.chars().count()));
    format!("{}{}▲ {}{} {}{}", BOLD, CYAN, title, RESET, style_dim(&rule), RESET)
}

pub fn print_header(title: &str) {
    println!();
    println!("{}", header_line(title));
    println!();
}

pub fn print_section(title: &str) {
    println!();
    println!("  {}{}{}", BOLD, title, RESET);
    println!("  {}", style_dim(&"─".repeat(40)));
}

pub fn print_key_value(key: &str, value: &str) {
    println!("  {}{}:{} {}", GRAY, key, RESET, value);
}

pub fn print_key_value_colored(key: &str, value: &str, color: &str) {
    println!("  {}{}:{} {}{}{}", GRAY, key, RESET, color, value, RESET);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_accents_match() {
        assert_eq!(tier_color(1), YELLOW);
        assert_eq!(tier_cell_color(1), comfy_table::Color::Yellow);
        assert_eq!(tier_color(2), CYAN);
        assert_eq!(tier_color(9), GRAY);
        assert_eq!(tier_cell_color(9), comfy_table::Color::DarkGrey);
    }

    #[test]
    fn test_header_line_width() {
        let plain = |s: String| {
            s.replace(BOLD, "")
                .replace(CYAN, "")
                .replace(DIM, "")
                .replace(RESET, "")
        };
        let short = plain(header_line("Ranking"));
        let long = plain(header_line("Ranking of spring-season"));
        assert!(short.starts_with("▲ Ranking "));
        assert_eq!(short.chars().count(), long.chars().count());
        assert!(plain(header_line(&"x".repeat(80))).ends_with(' '));
    }
}
