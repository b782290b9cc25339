//! Versioned opcode decode tables.
//!
//! Each game revision ("dialect") only describes the opcodes it added or
//! changed relative to older revisions. The registry resolves a complete
//! table for a requested version by folding every registered dialect at or
//! below it, in increasing version order. Deprecations recorded by a
//! dialect suppress inherited decoders from that version on; a later
//! dialect may re-add the opcode.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

use crate::cursor::Cursor;
use crate::error::{BmsError, Result};

/// Ordered dialect version key. The known games sit at 0, 0.5, 1, 1.5
/// and 2, so a major.minor pair gives a total order without resorting to
/// floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u16,
    minor: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn major(&self) -> u16 {
        self.major
    }

    pub fn minor(&self) -> u16 {
        self.minor
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minor == 0 {
            write!(f, "{}", self.major)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

/// One field of a fixed-layout opcode payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    U8,
    I8,
    U16,
    I16,
    /// 24-bit big-endian unsigned, the in-file offset width.
    U24,
    U32,
    I32,
}

impl Field {
    fn read(self, cursor: &mut Cursor<'_>) -> Result<i64> {
        Ok(match self {
            Field::U8 => i64::from(cursor.read_u8()?),
            Field::I8 => i64::from(cursor.read_i8()?),
            Field::U16 => i64::from(cursor.read_u16()?),
            Field::I16 => i64::from(cursor.read_i16()?),
            Field::U24 => i64::from(cursor.read_u24()?),
            Field::U32 => i64::from(cursor.read_u32()?),
            Field::I32 => i64::from(cursor.read_i32()?),
        })
    }
}

/// Decoded payload operands, in field order. For opcodes whose meaning is
/// still unknown the values are carried along but never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args(Vec<i64>);

impl Args {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        self.0.get(index).copied()
    }

    pub fn u8(&self, index: usize) -> Option<u8> {
        self.get(index).and_then(|v| u8::try_from(v).ok())
    }

    pub fn u16(&self, index: usize) -> Option<u16> {
        self.get(index).and_then(|v| u16::try_from(v).ok())
    }

    pub fn u32(&self, index: usize) -> Option<u32> {
        self.get(index).and_then(|v| u32::try_from(v).ok())
    }
}

impl From<Vec<i64>> for Args {
    fn from(values: Vec<i64>) -> Self {
        Self(values)
    }
}

/// How to read one opcode's payload. Immutable once built; the same
/// decoder value can back many opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// Declarative fixed layout.
    Fixed(&'static [Field]),
    /// Note-off carries no payload; the slot is the low bits of the opcode
    /// itself.
    NoteOff,
    /// Continuation-bit quantity, decoded to a tick count.
    VarLenDelay,
    /// The 0xB1 shape: two bytes, then a 16- or 32-bit value selected by
    /// the second byte. Payload layout is known, semantics are not.
    Selector,
}

impl Decoder {
    pub fn decode(self, cursor: &mut Cursor<'_>, opcode: u8) -> Result<Args> {
        match self {
            Decoder::Fixed(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push(field.read(cursor)?);
                }
                Ok(values.into())
            }
            Decoder::NoteOff => Ok(vec![i64::from(opcode & 0b111)].into()),
            Decoder::VarLenDelay => Ok(vec![i64::from(cursor.read_vlq()?)].into()),
            Decoder::Selector => {
                let first = cursor.read_u8()?;
                let offset = cursor.tell();
                let selector = cursor.read_u8()?;
                // Only these two selector values have ever been observed;
                // anything else has an unguessable payload width.
                let value = match selector {
                    0x40 => i64::from(cursor.read_u16()?),
                    0x80 => i64::from(cursor.read_u32()?),
                    _ => return Err(BmsError::UnknownSelector { selector, offset }),
                };
                Ok(vec![i64::from(first), i64::from(selector), value].into())
            }
        }
    }
}

/// One format revision: a partial opcode table plus the opcodes it
/// withdraws from older revisions.
#[derive(Clone)]
pub struct Dialect {
    version: Version,
    name: String,
    decoders: [Option<Decoder>; 256],
    deprecated: [bool; 256],
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("defined", &self.decoders.iter().filter(|d| d.is_some()).count())
            .field("deprecated", &self.deprecated.iter().filter(|d| **d).count())
            .finish()
    }
}

impl Dialect {
    pub fn new(version: Version, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            decoders: [None; 256],
            deprecated: [false; 256],
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decoder(&self, opcode: u8) -> Option<Decoder> {
        self.decoders[opcode as usize]
    }

    pub fn is_deprecated(&self, opcode: u8) -> bool {
        self.deprecated[opcode as usize]
    }

    /// Assigns a decoder to one opcode. Defining an opcode twice, or
    /// defining one this dialect already deprecated, is a construction
    /// error; inherited definitions from older versions do not conflict.
    pub fn define(&mut self, opcode: u8, decoder: Decoder) -> Result<()> {
        if self.deprecated[opcode as usize] {
            return Err(BmsError::InvalidDeprecation {
                opcode,
                version: self.version,
            });
        }
        if self.decoders[opcode as usize].is_some() {
            return Err(BmsError::DuplicateCommand {
                opcode,
                version: self.version,
            });
        }
        self.decoders[opcode as usize] = Some(decoder);
        Ok(())
    }

    /// Assigns one decoder to `start..end` (end exclusive), with the same
    /// per-opcode checks as [`define`](Self::define). Handy for the 128
    /// note-on opcodes.
    pub fn define_range(&mut self, start: u8, end: u8, decoder: Decoder) -> Result<()> {
        for opcode in start..end {
            self.define(opcode, decoder)?;
        }
        Ok(())
    }

    /// Assigns one decoder to each listed opcode; several opcodes share a
    /// payload shape, so this cuts down on repetition.
    pub fn define_many(&mut self, opcodes: &[u8], decoder: Decoder) -> Result<()> {
        for &opcode in opcodes {
            self.define(opcode, decoder)?;
        }
        Ok(())
    }

    /// Withdraws opcodes inherited from older versions. Deprecating an
    /// opcode this dialect defines itself is a construction error.
    pub fn deprecate(&mut self, opcodes: &[u8]) -> Result<()> {
        for &opcode in opcodes {
            if self.decoders[opcode as usize].is_some() {
                return Err(BmsError::InvalidDeprecation {
                    opcode,
                    version: self.version,
                });
            }
            self.deprecated[opcode as usize] = true;
        }
        Ok(())
    }
}

/// The set of registered dialects, ordered by version.
#[derive(Debug, Clone, Default)]
pub struct DialectRegistry {
    dialects: BTreeMap<Version, Dialect>,
}

impl DialectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, dialect: Dialect) -> Result<()> {
        let version = dialect.version();
        if self.dialects.contains_key(&version) {
            return Err(BmsError::DuplicateVersion { version });
        }
        self.dialects.insert(version, dialect);
        Ok(())
    }

    pub fn versions(&self) -> impl Iterator<Item = Version> + '_ {
        self.dialects.keys().copied()
    }

    /// Folds every dialect at or below `target` into one fully-populated
    /// table. A deprecation removes the inherited decoder and joins the
    /// cumulative deprecated set; a later definition of the same opcode
    /// re-adds it. Registered dialects are never mutated.
    pub fn resolve(&self, target: Version) -> Dialect {
        let mut resolved = Dialect::new(target, format!("resolved v{}", target));

        for (_, dialect) in self.dialects.range(..=target) {
            for opcode in 0..=255u8 {
                if dialect.is_deprecated(opcode) {
                    resolved.decoders[opcode as usize] = None;
                    resolved.deprecated[opcode as usize] = true;
                } else if let Some(decoder) = dialect.decoder(opcode) {
                    resolved.decoders[opcode as usize] = Some(decoder);
                    resolved.deprecated[opcode as usize] = false;
                }
            }
        }

        resolved
    }
}
