//! Semantic classification of decoded opcodes.
//!
//! Which decoder reads an opcode's payload is dialect-specific, but the
//! meaning of an opcode value is invariant across every known revision, so
//! the (opcode, args) pair maps to one typed command here.

use crate::dialect::Args;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a note. The note number is the opcode value itself; the
    /// payload names the polyphonic slot (0..=7) it is layered onto.
    NoteOn { note: u8, slot: u8, velocity: u8 },
    /// Stop every note currently sounding in one polyphonic slot.
    NoteOff { slot: u8 },
    /// Suspend this track for a number of ticks. Additive: pausing an
    /// already-paused track extends the pause.
    Pause { ticks: u32 },
    /// Stereo pan, 0 (left) to 127 (right).
    Pan { pan: u8 },
    /// Track volume. 8 or 16 bits wide depending on the dialect revision.
    Volume { value: u16 },
    /// Pitch shift, 16 bits in the file, rescaled to the 14-bit wheel
    /// range when scheduled.
    PitchShift { value: u16 },
    /// Select the instrument bank (0xA4 with mode 32).
    BankSelect { bank: u8 },
    /// Select the program/instrument (0xA4 with mode 33).
    ProgramChange { program: u8 },
    /// Ask the scheduler to start a new track at an absolute offset. It
    /// takes its first step on the round after the current one.
    SpawnTrack { track_id: u8, offset: u32 },
    /// Save the position after this opcode as the return point, then jump
    /// to an absolute offset.
    Goto { offset: u32 },
    /// Jump back to the saved return point.
    Return,
    /// Jump to an absolute offset when `mode` is 0. Other modes are not
    /// understood and are ignored.
    Loop { mode: u8, offset: u32 },
    /// Set the tempo in beats per minute.
    SetBpm { bpm: u16 },
    /// Set the pulses-per-quarter-note resolution.
    SetPpqn { ppqn: u16 },
    /// Stop this track. Nothing further is ever read from it.
    EndOfTrack,
    /// Payload shape known, meaning not. Decoded and retained, never
    /// interpreted.
    Unknown { opcode: u8, args: Args },
}

impl Command {
    /// Classifies a decoded opcode. Anything that does not match a known
    /// opcode value with the expected operand shape comes back as
    /// [`Command::Unknown`]; a custom dialect redefining a payload out
    /// from under its classified meaning degrades to that rather than
    /// misreading operands.
    pub fn classify(opcode: u8, args: Args) -> Command {
        let unknown = |args: Args| Command::Unknown { opcode, args };

        match opcode {
            0x00..=0x7f => match (args.u8(0), args.u8(1)) {
                (Some(slot), Some(velocity)) => Command::NoteOn {
                    note: opcode,
                    slot,
                    velocity,
                },
                _ => unknown(args),
            },
            0x81..=0x87 => Command::NoteOff {
                slot: opcode & 0b111,
            },
            0x80 | 0x88 | 0xf0 => match args.u32(0) {
                Some(ticks) => Command::Pause { ticks },
                None => unknown(args),
            },
            0x9a => match args.u8(1) {
                Some(pan) => Command::Pan { pan },
                None => unknown(args),
            },
            0x9c => match args.u16(1) {
                Some(value) => Command::Volume { value },
                None => unknown(args),
            },
            0x9e => match args.u16(1) {
                Some(value) => Command::PitchShift { value },
                None => unknown(args),
            },
            0xa4 => match (args.u8(0), args.u8(1)) {
                (Some(32), Some(bank)) => Command::BankSelect { bank },
                (Some(33), Some(program)) => Command::ProgramChange { program },
                _ => unknown(args),
            },
            0xc1 => match (args.u8(0), args.u32(1)) {
                (Some(track_id), Some(offset)) => Command::SpawnTrack { track_id, offset },
                _ => unknown(args),
            },
            0xc4 => match args.u32(0) {
                Some(offset) => Command::Goto { offset },
                None => unknown(args),
            },
            0xc6 => Command::Return,
            0xc8 => match (args.u8(0), args.u32(1)) {
                (Some(mode), Some(offset)) => Command::Loop { mode, offset },
                _ => unknown(args),
            },
            0xfd => match args.u16(0) {
                Some(bpm) => Command::SetBpm { bpm },
                None => unknown(args),
            },
            0xfe => match args.u16(0) {
                Some(ppqn) => Command::SetPpqn { ppqn },
                None => unknown(args),
            },
            0xff => Command::EndOfTrack,
            _ => unknown(args),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Command::EndOfTrack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[i64]) -> Args {
        values.to_vec().into()
    }

    #[test]
    fn note_on_uses_opcode_as_note() {
        assert_eq!(
            Command::classify(0x40, args(&[1, 0x40])),
            Command::NoteOn {
                note: 0x40,
                slot: 1,
                velocity: 0x40
            }
        );
    }

    #[test]
    fn note_off_slot_from_opcode_bits() {
        assert_eq!(Command::classify(0x83, args(&[3])), Command::NoteOff { slot: 3 });
        assert_eq!(Command::classify(0x87, args(&[7])), Command::NoteOff { slot: 7 });
    }

    #[test]
    fn all_pause_forms_classify_alike() {
        assert_eq!(Command::classify(0x80, args(&[10])), Command::Pause { ticks: 10 });
        assert_eq!(
            Command::classify(0x88, args(&[1000])),
            Command::Pause { ticks: 1000 }
        );
        assert_eq!(
            Command::classify(0xf0, args(&[16384])),
            Command::Pause { ticks: 16384 }
        );
    }

    #[test]
    fn bank_and_program_split_on_mode() {
        assert_eq!(
            Command::classify(0xa4, args(&[32, 9])),
            Command::BankSelect { bank: 9 }
        );
        assert_eq!(
            Command::classify(0xa4, args(&[33, 9])),
            Command::ProgramChange { program: 9 }
        );
        assert!(matches!(
            Command::classify(0xa4, args(&[7, 9])),
            Command::Unknown { opcode: 0xa4, .. }
        ));
    }

    #[test]
    fn undefined_opcode_keeps_its_args() {
        let cmd = Command::classify(0xb8, args(&[0x1234]));
        match cmd {
            Command::Unknown { opcode, args } => {
                assert_eq!(opcode, 0xb8);
                assert_eq!(args.get(0), Some(0x1234));
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn malformed_shape_degrades_to_unknown() {
        assert!(matches!(
            Command::classify(0x40, args(&[])),
            Command::Unknown { .. }
        ));
    }
}
