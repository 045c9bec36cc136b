//! Startup banner: "WORKOUT-SYNC" shaded left to right, like a session going from
//! warm-up (purple) to finish (green), and a line naming who is signed in.

use crate::domain::{ParticipantId, ReminderLabel};
use crossterm::QueueableCommand;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use figlet_rs::FIGfont;
use std::io::{Write, stdout};

/// Neon Purple (#bc13fe).
pub(crate) const NEON_PURPLE: (u8, u8, u8) = (0xbc, 0x13, 0xfe);
/// Cyber Green (#0ff0fc).
pub(crate) const CYBER_GREEN: (u8, u8, u8) = (0x0f, 0xf0, 0xfc);

/// Columns sharing one color. Keeps escape sequences per line low.
const BAND_WIDTH: usize = 4;

/// Color of column `col` in art `width` columns wide.
fn column_color(col: usize, width: usize) -> Color {
    let t = if width <= 1 {
        0.0
    } else {
        col.min(width - 1) as f64 / (width - 1) as f64
    };
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    Color::Rgb {
        r: mix(NEON_PURPLE.0, CYBER_GREEN.0),
        g: mix(NEON_PURPLE.1, CYBER_GREEN.1),
        b: mix(NEON_PURPLE.2, CYBER_GREEN.2),
    }
}

/// Renders `text` with the built-in figlet font. Falls back to the plain text.
fn render_art(text: &str) -> String {
    FIGfont::standard()
        .ok()
        .and_then(|font| font.convert(text).map(|figure| figure.to_string()))
        .unwrap_or_else(|| text.to_string())
}

/// "signed in as <owner>, reminders 30 / 20 / 0 min before start"
fn tagline(owner: &ParticipantId) -> String {
    let offsets: Vec<String> = ReminderLabel::ALL
        .iter()
        .map(|label| label.lead_time().num_minutes().to_string())
        .collect();
    format!(
        "v{}  signed in as {}, reminders {} min before start",
        env!("CARGO_PKG_VERSION"),
        owner,
        offsets.join(" / ")
    )
}

fn queue_banner(out: &mut impl Write, owner: &ParticipantId) -> std::io::Result<()> {
    let art = render_art("WORKOUT-SYNC");
    let width = art.lines().map(|l| l.chars().count()).max().unwrap_or(0);

    for line in art.lines() {
        let chars: Vec<char> = line.chars().collect();
        for (band, chunk) in chars.chunks(BAND_WIDTH).enumerate() {
            out.queue(SetForegroundColor(column_color(band * BAND_WIDTH, width)))?;
            out.queue(Print(chunk.iter().collect::<String>()))?;
        }
        out.queue(ResetColor)?.queue(Print("\r\n"))?;
    }

    out.queue(SetForegroundColor(column_color(width, width)))?
        .queue(Print(tagline(owner)))?
        .queue(ResetColor)?
        .queue(Print("\r\n"))?;
    out.flush()
}

/// Prints the banner for `owner`. Terminal errors are ignored.
pub fn print_welcome(owner: &ParticipantId) {
    let _ = queue_banner(&mut stdout(), owner);
}
