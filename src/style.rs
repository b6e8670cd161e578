//! ANSI terminal styling for diagnostics.
//!
//! Thin escape-code wrappers used by the diagnostic renderer. Styling is
//! applied unconditionally; callers that write to a non-terminal sink should
//! disable printing on the logger instead.

/// ANSI escape code styling utilities.
pub struct Style;

impl Style {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const RED: &'static str = "\x1b[31m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const BLUE: &'static str = "\x1b[34m";
    pub const CYAN: &'static str = "\x1b[36m";

    pub fn red(s: &str) -> String {
        format!("{}{}{}", Self::RED, s, Self::RESET)
    }

    pub fn yellow(s: &str) -> String {
        format!("{}{}{}", Self::YELLOW, s, Self::RESET)
    }

    pub fn blue(s: &str) -> String {
        format!("{}{}{}", Self::BLUE, s, Self::RESET)
    }

    pub fn cyan(s: &str) -> String {
        format!("{}{}{}", Self::CYAN, s, Self::RESET)
    }

    pub fn bold_red(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::RED, s, Self::RESET)
    }

    pub fn bold_yellow(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::YELLOW, s, Self::RESET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_reset_at_end() {
        let out = Style::red("divide by zero");
        assert!(out.starts_with("\x1b[31m"));
        assert!(out.ends_with("\x1b[0m"));
    }

    #[test]
    fn bold_variants_stack_codes() {
        let out = Style::bold_yellow("warning");
        assert!(out.contains("\x1b[1m"));
        assert!(out.contains("\x1b[33m"));
    }
}
