//! Discord rendering: embeds and message components.

pub mod buttons;
pub mod embeds;
