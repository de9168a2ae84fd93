//! Catppuccin-flavored terminal palette.
//!
//! Each accent maps onto a plain ANSI color so the output stays readable in
//! terminals without truecolor support.

use colored::{ColoredString, Colorize};

/// Palette accents used for verdicts, run status and labels.
pub trait CatppuccinExt {
    /// Working targets
    fn ctp_green(&self) -> ColoredString;
    /// Failing and invalid targets
    fn ctp_red(&self) -> ColoredString;
    /// Cancellation and warnings
    fn ctp_yellow(&self) -> ColoredString;
    /// Paused runs
    fn peach(&self) -> ColoredString;
    /// Labels and headers
    fn sky(&self) -> ColoredString;
    /// Paths and identifiers
    fn lavender(&self) -> ColoredString;
    /// De-emphasized text
    fn overlay0(&self) -> ColoredString;
}

impl<S: AsRef<str>> CatppuccinExt for S {
    fn ctp_green(&self) -> ColoredString {
        self.as_ref().bright_green()
    }

    fn ctp_red(&self) -> ColoredString {
        self.as_ref().bright_red()
    }

    fn ctp_yellow(&self) -> ColoredString {
        self.as_ref().bright_yellow()
    }

    // Orange has no ANSI slot; plain yellow keeps it apart from warnings.
    fn peach(&self) -> ColoredString {
        self.as_ref().yellow()
    }

    fn sky(&self) -> ColoredString {
        self.as_ref().bright_cyan()
    }

    fn lavender(&self) -> ColoredString {
        self.as_ref().bright_purple()
    }

    fn overlay0(&self) -> ColoredString {
        self.as_ref().bright_black()
    }
}
