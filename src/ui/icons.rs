//! Shared terminal icons, with plain-text fallbacks for terminals without
//! emoji support.

use console::Emoji;

// Outcomes
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Board
pub static FLAG: Emoji<'_, '_> = Emoji("🚩 ", "[FLAG]");
pub static LIVE: Emoji<'_, '_> = Emoji("🟢 ", "[LIVE]");
pub static SYNC: Emoji<'_, '_> = Emoji("🔄 ", "[SYNC]");

// Inbox and due dates
pub static BELL: Emoji<'_, '_> = Emoji("🔔 ", "*");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[DUE]");
pub static UNREAD: Emoji<'_, '_> = Emoji("● ", "* ");
