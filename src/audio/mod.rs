//! # Audio Module
//!
//! Per-guild voice sessions and the playback pipeline.
//!
//! ## Architecture
//!
//! ### [`player`] - Radio Player
//! - Entry point for the command layer (`play`, `stop`, `pause`, ...)
//! - Serializes operations per guild and owns the [`registry`]
//! - Tears a session down when its voice transport is lost
//!
//! ### [`session`] - Voice Session
//! - One transport, one engine and at most one decoder per guild
//! - Reconnects the current station when playback goes idle or errors
//!
//! ### [`engine`] - Seams
//! - Traits for the voice transport, playback engine and connector
//! - [`voice`] implements them on top of songbird
//!
//! Output is always 48 kHz stereo; raw PCM from the decoder is f32le.

pub mod engine;
pub mod now_playing;
pub mod player;
pub mod registry;
pub mod session;
pub mod voice;

#[cfg(test)]
mod testing;
