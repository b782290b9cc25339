//! Standard MIDI File (Format 1) output support.
//!
//! This crate knows nothing about where the music came from: it holds an
//! abstract per-track event timeline and serializes it into a byte-exact
//! SMF container.

pub mod timeline;
pub mod vlq;
pub mod writer;

pub use timeline::{Event, Timeline, TimelineTrack};
pub use writer::{write_timeline, WriterOptions};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SmfError {
    /// Format 1 assigns one channel per track; there are only 16 channels.
    #[error("too many output tracks for one midi file: {tracks} (max 16)")]
    ChannelExhausted { tracks: usize },
}

pub type Result<T> = std::result::Result<T, SmfError>;
