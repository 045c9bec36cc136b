pub mod banner;
pub mod progress;
pub mod tui;

use crate::domain::ParticipantId;

/// Prints the welcome banner for `owner` and applies the neon theme for all later prompts.
/// Call once at startup, after the config is loaded.
pub fn init_ui(owner: &ParticipantId) {
    banner::print_welcome(owner);
    tui::apply_theme();
}
