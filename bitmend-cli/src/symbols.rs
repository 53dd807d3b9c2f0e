//! Console symbols with ASCII fallbacks
//!
//! `console` picks the fallback on terminals that cannot render the glyphs.

use console::Emoji;

pub const CHECK: Emoji<'static, 'static> = Emoji("\u{2713}", "[OK]");
pub const CROSS: Emoji<'static, 'static> = Emoji("\u{2717}", "[X]");
pub const WARN: Emoji<'static, 'static> = Emoji("\u{26A0}", "[!]");

/// Rule under report headings
pub const HLINE: Emoji<'static, 'static> = Emoji(
    "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}",
    "------------------------",
);
