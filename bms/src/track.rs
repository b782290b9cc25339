//! One concurrently-executing voice group.
//!
//! A track owns its cursor into the shared sequence buffer, a pause
//! counter, the single return-offset register and the bookkeeping of which
//! notes are sounding in which polyphonic slot. It is only ever mutated by
//! its own scheduler step.

use crate::cursor::Cursor;
use crate::dialect::{Args, Dialect};
use crate::error::{BmsError, Result};

pub const SLOT_COUNT: usize = 8;
pub const MAX_SLOT: u8 = SLOT_COUNT as u8 - 1;

#[derive(Debug)]
pub struct Track<'a> {
    /// BMS track id from the spawning opcode. The root track has none.
    pub track_id: Option<u8>,
    /// Dense id unique across the whole run, and the timeline key: BMS
    /// track ids can collide across spawns.
    pub unique_id: u32,
    /// Unique id of the track that spawned this one.
    pub parent_id: Option<u32>,
    /// Set on end-of-track. Stopped tracks are skipped, never removed.
    pub stopped: bool,

    cursor: Cursor<'a>,
    pause_ticks_left: u32,
    return_offset: Option<usize>,
    sounding: [Vec<u8>; SLOT_COUNT],
}

impl<'a> Track<'a> {
    pub fn new(
        track_id: Option<u8>,
        unique_id: u32,
        parent_id: Option<u32>,
        cursor: Cursor<'a>,
    ) -> Self {
        Self {
            track_id,
            unique_id,
            parent_id,
            stopped: false,
            cursor,
            pause_ticks_left: 0,
            return_offset: None,
            sounding: Default::default(),
        }
    }

    pub fn offset(&self) -> usize {
        self.cursor.tell()
    }

    /// Reads exactly one opcode and its payload from the current position.
    pub fn parse_next_opcode(&mut self, dialect: &Dialect) -> Result<(u8, Args)> {
        let offset = self.cursor.tell();
        let opcode = self.cursor.read_u8()?;
        let decoder = dialect
            .decoder(opcode)
            .ok_or(BmsError::UnknownOpcode { opcode, offset })?;
        let args = decoder.decode(&mut self.cursor, opcode)?;
        Ok((opcode, args))
    }

    /// Extends the pause; a track paused while already paused stays paused
    /// for the sum.
    pub fn add_pause(&mut self, ticks: u32) {
        self.pause_ticks_left = self.pause_ticks_left.saturating_add(ticks);
    }

    /// One scheduler round's worth of pause handling: counts down and
    /// reports whether this round is spent paused.
    pub fn tick_pause(&mut self) -> bool {
        if self.pause_ticks_left > 0 {
            self.pause_ticks_left -= 1;
            true
        } else {
            false
        }
    }

    pub fn pause_ticks_left(&self) -> u32 {
        self.pause_ticks_left
    }

    pub fn jump(&mut self, offset: usize) {
        self.cursor.seek(offset);
    }

    /// Records the current position (just past the jump opcode's payload)
    /// as the return point. One register, not a stack: a nested save loses
    /// the outer point. No known dialect nests these.
    pub fn save_return(&mut self) {
        self.return_offset = Some(self.cursor.tell());
    }

    pub fn return_to_saved(&mut self, opcode_offset: usize) -> Result<()> {
        match self.return_offset {
            Some(offset) => {
                self.cursor.seek(offset);
                Ok(())
            }
            None => Err(BmsError::NoReturnPoint {
                offset: opcode_offset,
            }),
        }
    }

    pub fn add_note(&mut self, slot: u8, note: u8) {
        self.sounding[slot as usize].push(note);
    }

    /// Takes every note sounding in `slot`, leaving it empty.
    pub fn clear_slot(&mut self, slot: u8) -> Vec<u8> {
        std::mem::take(&mut self.sounding[slot as usize])
    }

    pub fn sounding_notes(&self, slot: u8) -> &[u8] {
        &self.sounding[slot as usize]
    }
}
