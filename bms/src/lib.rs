//! Conversion of BMS binary music sequences into Standard MIDI Files.
//!
//! A BMS file is a tick-based bytecode program: tracks spawn other tracks,
//! pause themselves, jump and return, and emit note and controller events.
//! Which payload a given opcode carries varies between game revisions, so
//! decoding starts from a [`dialect::DialectRegistry`] of versioned opcode
//! tables that are folded into one effective table per game. The
//! [`engine::Engine`] then interprets the program tick by tick into an
//! [`smf::Timeline`], which the `smf` crate serializes.
//!
//! Most callers only need [`convert()`]:
//!
//! ```no_run
//! use bms::{convert, Config, Game};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("sequence.bms")?;
//! let midi = convert(&data, Game::Pikmin2, &Config::default(), 1_000_000)?;
//! std::fs::write("sequence.mid", midi)?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod convert;
pub mod cursor;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod games;
pub mod track;

pub use command::Command;
pub use convert::{convert, convert_with_dialect};
pub use cursor::Cursor;
pub use dialect::{Args, Decoder, Dialect, DialectRegistry, Field, Version};
pub use engine::{Config, Engine, Termination};
pub use error::{BmsError, Result};
pub use games::{builtin_registry, Game};
pub use track::Track;
