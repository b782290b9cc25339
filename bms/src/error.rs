use crate::dialect::Version;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BmsError {
    /// The resolved dialect has no decoder for this opcode. Fatal: the
    /// format is reverse-engineered, and guessing a payload length would
    /// desynchronize everything after it.
    #[error("unknown opcode {opcode:#04x} at offset {offset:#x}")]
    UnknownOpcode { opcode: u8, offset: usize },

    /// A selector-style opcode carried a selector byte with no known
    /// payload layout. Fatal for the same reason as an unknown opcode:
    /// the payload width cannot be guessed.
    #[error("unknown selector {selector:#04x} at offset {offset:#x}")]
    UnknownSelector { selector: u8, offset: usize },

    /// A note-on named a polyphonic slot outside 0..=7 while strict
    /// decoding was on.
    #[error("invalid polyphonic slot {slot} at offset {offset:#x}")]
    InvalidSlot { slot: u8, offset: usize },

    /// Two dialects were registered under the same version key.
    #[error("dialect version {version} registered twice")]
    DuplicateVersion { version: Version },

    /// A dialect defined the same opcode twice during its own construction.
    #[error("opcode {opcode:#04x} defined twice in dialect version {version}")]
    DuplicateCommand { opcode: u8, version: Version },

    /// A dialect deprecated an opcode it defines itself, or defined an
    /// opcode it had already deprecated.
    #[error("opcode {opcode:#04x} both defined and deprecated in dialect version {version}")]
    InvalidDeprecation { opcode: u8, version: Version },

    /// A read ran past the end of the input buffer.
    #[error("input truncated at offset {offset:#x} (needed {needed} more bytes)")]
    TruncatedInput { offset: usize, needed: usize },

    /// A return opcode executed before any return point was saved.
    #[error("return opcode at offset {offset:#x} with no saved return point")]
    NoReturnPoint { offset: usize },

    /// A track dispatched more opcodes within one tick than the input
    /// holds bytes, so its control flow jumps in a cycle that never
    /// pauses and the sequence can make no progress.
    #[error("track control flow loops without pausing near offset {offset:#x}")]
    ZeroDelayLoop { offset: usize },

    /// Interpretation hit the caller-supplied tick bound before the active
    /// termination policy was satisfied. No output bytes are produced.
    #[error("tick limit of {ticks} reached before the sequence terminated")]
    TickLimit { ticks: u64 },

    #[error(transparent)]
    Midi(#[from] smf::SmfError),
}

pub type Result<T> = std::result::Result<T, BmsError>;
