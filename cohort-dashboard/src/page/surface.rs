//! Output seam for page controllers.

use crate::types::{ProfileCard, StatTile};
use cohort_core::{PageError, RenderError};
use std::io::Write;
use std::sync::Mutex;

/// Where a page draws. Implementations decide the markup.
pub trait Surface: Send + Sync {
    fn show_loading(&self, page: &str);
    fn show_login_prompt(&self, page: &str);
    /// Generic failure screen with a retry affordance.
    fn show_error(&self, page: &str, error: &PageError);
    fn render_profile(&self, profile: &ProfileCard) -> Result<(), RenderError>;
    fn render_stats(&self, stats: &[StatTile]) -> Result<(), RenderError>;
    fn render_section(&self, section: &str, lines: &[String]) -> Result<(), RenderError>;
    /// Empty/unavailable placeholder for one section.
    fn show_section_fallback(&self, section: &str, error: &RenderError);
}

/// Plain-text surface for terminals and logs.
#[derive(Debug)]
pub struct TerminalSurface<W> {
    out: Mutex<W>,
}

impl TerminalSurface<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, section: &str, text: &str) -> Result<(), RenderError> {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "{}", text).map_err(|err| RenderError::section(section, err.to_string()))
    }

    fn write_lossy(&self, text: &str) {
        let _ = self.write("surface", text);
    }
}

impl<W: Write + Send> Surface for TerminalSurface<W> {
    fn show_loading(&self, page: &str) {
        self.write_lossy(&format!("[{}] loading...", page));
    }

    fn show_login_prompt(&self, page: &str) {
        self.write_lossy(&format!("[{}] please sign in to continue", page));
    }

    fn show_error(&self, page: &str, error: &PageError) {
        self.write_lossy(&format!("[{}] something went wrong: {} (retry)", page, error));
    }

    fn render_profile(&self, profile: &ProfileCard) -> Result<(), RenderError> {
        let mut line = format!("== {} ({}) ==", profile.display_name, profile.role);
        if let Some(headline) = &profile.headline {
            line.push_str(&format!("\n   {}", headline));
        }
        self.write("profile", &line)
    }

    fn render_stats(&self, stats: &[StatTile]) -> Result<(), RenderError> {
        if stats.is_empty() {
            return self.write("stats", "   (no stats yet)");
        }
        let line = stats
            .iter()
            .map(|tile| match &tile.unit {
                Some(unit) => format!("{}: {} {}", tile.label, tile.value, unit),
                None => format!("{}: {}", tile.label, tile.value),
            })
            .collect::<Vec<_>>()
            .join(" | ");
        self.write("stats", &format!("   {}", line))
    }

    fn render_section(&self, section: &str, lines: &[String]) -> Result<(), RenderError> {
        let mut text = format!("-- {} --", section);
        for line in lines {
            text.push_str("\n   ");
            text.push_str(line);
        }
        self.write(section, &text)
    }

    fn show_section_fallback(&self, section: &str, error: &RenderError) {
        self.write_lossy(&format!("-- {} -- unavailable ({})", section, error));
    }
}
