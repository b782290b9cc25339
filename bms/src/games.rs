//! Built-in dialects for the known games.
//!
//! Version keys are estimates used purely to order the dialects; they do
//! not correspond to any version number inside the files. Most opcodes
//! here have a known payload shape but unknown semantics; they are decoded
//! and carried along so that the cursor stays in sync.

use crate::dialect::{Decoder, Dialect, DialectRegistry, Field, Version};
use crate::error::Result;

pub const BASE: Version = Version::new(0, 0);
pub const PIKMIN_1: Version = Version::new(0, 5);
pub const MARIO_SUNSHINE: Version = Version::new(1, 0);
pub const WIND_WAKER: Version = Version::new(1, 5);
pub const PIKMIN_2: Version = Version::new(2, 0);

/// Selects one of the supported games (i.e. one effective dialect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Game {
    Pikmin1,
    MarioSunshine,
    WindWaker,
    Pikmin2,
}

impl Game {
    pub fn from_name(name: &str) -> Option<Game> {
        match name {
            "pikmin1" => Some(Game::Pikmin1),
            "sunshine" => Some(Game::MarioSunshine),
            "windwaker" => Some(Game::WindWaker),
            "pikmin2" => Some(Game::Pikmin2),
            _ => None,
        }
    }

    pub fn version(self) -> Version {
        match self {
            Game::Pikmin1 => PIKMIN_1,
            Game::MarioSunshine => MARIO_SUNSHINE,
            Game::WindWaker => WIND_WAKER,
            Game::Pikmin2 => PIKMIN_2,
        }
    }
}

const NONE: Decoder = Decoder::Fixed(&[]);
const U8: Decoder = Decoder::Fixed(&[Field::U8]);
const U16: Decoder = Decoder::Fixed(&[Field::U16]);
const U32: Decoder = Decoder::Fixed(&[Field::U32]);
const U8_U8: Decoder = Decoder::Fixed(&[Field::U8, Field::U8]);
const U8_U16: Decoder = Decoder::Fixed(&[Field::U8, Field::U16]);
const U16_U8: Decoder = Decoder::Fixed(&[Field::U16, Field::U8]);
const U8_U8_U8: Decoder = Decoder::Fixed(&[Field::U8, Field::U8, Field::U8]);
const U8_U16_U8: Decoder = Decoder::Fixed(&[Field::U8, Field::U16, Field::U8]);
const U8_U24: Decoder = Decoder::Fixed(&[Field::U8, Field::U24]);

/// The event set shared by every revision.
fn base_dialect() -> Result<Dialect> {
    let mut d = Dialect::new(BASE, "BMS base events");

    // Note-on: polyphonic slot, velocity. The note number is the opcode.
    d.define_range(0x00, 0x80, U8_U8)?;
    // Pause for up to 255 ticks.
    d.define(0x80, U8)?;
    // Note-off per polyphonic slot.
    d.define_range(0x81, 0x88, Decoder::NoteOff)?;
    // Pause for up to 65535 ticks.
    d.define(0x88, U16)?;

    // Pan change: unknown, pan, unknown.
    d.define(0x9a, U8_U8_U8)?;
    // Volume change: unknown, volume.
    d.define(0x9c, U8_U16)?;
    // Pitch shift: unknown, pitch, unknown.
    d.define(0x9e, U8_U16_U8)?;
    // Bank select (mode 32) or program select (mode 33): mode, value.
    d.define(0xa4, U8_U8)?;

    // Spawn subroutine: track id, absolute offset.
    d.define(0xc1, U8_U24)?;
    // Save the return point and jump to an absolute offset.
    d.define(0xc4, U32)?;
    // Return to the saved point.
    d.define(0xc6, NONE)?;
    // Loop to offset: mode, offset. Only mode 0 is understood.
    d.define(0xc8, U8_U24)?;

    // Variable-length pause.
    d.define(0xf0, Decoder::VarLenDelay)?;
    // Tempo in beats per minute.
    d.define(0xfd, U16)?;
    // Pulses per quarter note.
    d.define(0xfe, U16)?;
    // End of track.
    d.define(0xff, NONE)?;

    Ok(d)
}

fn pikmin_1_dialect() -> Result<Dialect> {
    let mut d = Dialect::new(PIKMIN_1, "Pikmin 1");

    // Unknown opcodes with known payload widths.
    d.define_many(
        &[
            0x94, 0xa0, 0xa3, 0xa5, 0xb3, 0xb4, 0xb8, 0xc9, 0xd0, 0xd1, 0xd5, 0xe6, 0xe7, 0xfa,
        ],
        U16,
    )?;
    d.define_many(&[0x98, 0xcb, 0xcc, 0xd2], U8_U8)?;
    d.define_many(&[0xc2, 0xcd, 0xcf, 0xda, 0xdb, 0xde, 0xf1], U8)?;
    d.define_many(
        &[0xa2, 0xa6, 0xa9, 0xb0, 0xbe, 0xc5, 0xca, 0xe1, 0xe3, 0xf4],
        NONE,
    )?;

    d.define(0x92, U16_U8)?;
    d.define(0xaa, U32)?;
    d.define(0xac, U8_U8_U8)?;
    d.define(0xaf, U8_U8_U8)?;
    d.define(0xc7, U32)?;
    d.define(0xdd, U8_U16)?;
    d.define(0xdf, U32)?;
    d.define(0xe0, U8_U16)?;
    d.define(0xeb, U8_U8_U8)?;

    Ok(d)
}

fn mario_sunshine_dialect() -> Result<Dialect> {
    let mut d = Dialect::new(MARIO_SUNSHINE, "Super Mario Sunshine");

    // Volume narrows to one byte in this revision.
    d.define(0x9c, U8_U8)?;

    Ok(d)
}

fn wind_waker_dialect() -> Result<Dialect> {
    let mut d = Dialect::new(WIND_WAKER, "Zelda: Wind Waker");

    // Volume is two bytes again.
    d.define(0x9c, U8_U16)?;
    // Unknown event with a length switch in its second byte.
    d.define(0xb1, Decoder::Selector)?;

    Ok(d)
}

fn pikmin_2_dialect() -> Result<Dialect> {
    let mut d = Dialect::new(PIKMIN_2, "Pikmin 2");

    d.define(0x9c, U8_U16)?;

    Ok(d)
}

/// Registry holding every built-in dialect. Built once at startup; any
/// construction error here is a bug in the tables above, not in the input.
pub fn builtin_registry() -> Result<DialectRegistry> {
    let mut registry = DialectRegistry::new();
    registry.register(base_dialect()?)?;
    registry.register(pikmin_1_dialect()?)?;
    registry.register(mario_sunshine_dialect()?)?;
    registry.register(wind_waker_dialect()?)?;
    registry.register(pikmin_2_dialect()?)?;
    Ok(registry)
}
