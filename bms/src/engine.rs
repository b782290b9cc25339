//! The tick-synchronous scheduler.
//!
//! All live tracks advance in lock-step rounds, in registration order.
//! Within its slice of a round a track decodes and executes opcodes until
//! one of them suspends it (a pause) or ends it; everything it executed is
//! scheduled at the current global tick. Tracks spawned during a round are
//! committed only after the round completes, so their first opcode is
//! decoded on the next tick. Output-domain value translation (pitch and
//! volume rescaling, tempo computation) happens here at scheduling time;
//! the encoder sees final MIDI values.

use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::cursor::Cursor;
use crate::dialect::{Dialect, Version};
use crate::error::{BmsError, Result};
use crate::track::{Track, MAX_SLOT};
use smf::Timeline;

const MICROSECONDS_PER_MINUTE: u32 = 60_000_000;

const CC_BANK_SELECT: u8 = 0x00;
const CC_VOLUME: u8 = 0x07;
const CC_PAN: u8 = 0x0a;

/// When the scheduler considers the sequence finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Stop when the root track reaches its end-of-track opcode.
    RootTrack,
    /// Stop only once every registered track has ended.
    AllTracks,
    /// Stop at the first end-of-track of any track.
    AnyTrack,
}

/// The recognized option set.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_bpm: u16,
    pub base_ppqn: u16,
    /// Strict decoding fails on out-of-range polyphonic slots; lenient
    /// decoding drops the note instead.
    pub strict: bool,
    /// Where the root track starts reading.
    pub start_offset: usize,
    /// Ignore spawn opcodes and termination short-circuits; used to walk
    /// one voice group in isolation.
    pub single_track: bool,
    /// Ignore jump, loop and return opcodes; used for linear dumps.
    pub suppress_jumps: bool,
    pub termination: Termination,
    /// Bank-select preamble written per output track.
    pub instrument_bank: Option<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_bpm: 100,
            base_ppqn: 100,
            strict: true,
            start_offset: 0,
            single_track: false,
            suppress_jumps: false,
            // The first ended track ends the piece, the behavior observed
            // in the source material for every known file.
            termination: Termination::AnyTrack,
            instrument_bank: None,
        }
    }
}

/// Whether a track keeps running within the current round.
enum Flow {
    Continue,
    Yield,
}

/// A spawn request collected during a round and committed after it.
#[derive(Debug)]
struct PendingSpawn {
    track_id: u8,
    offset: u32,
    parent: u32,
}

pub struct Engine<'a> {
    data: &'a [u8],
    dialect: Dialect,
    config: Config,
    tracks: Vec<Track<'a>>,
    pending: Vec<PendingSpawn>,
    timeline: Timeline,
    tick: u64,
    bpm: u16,
    done: bool,
}

impl<'a> Engine<'a> {
    pub fn new(data: &'a [u8], dialect: Dialect, config: Config) -> Self {
        let mut timeline = Timeline::new();
        let root_id = timeline.add_track(0);

        let root = Track::new(None, root_id, None, Cursor::at(data, config.start_offset));
        let bpm = config.base_bpm;

        Self {
            data,
            dialect,
            config,
            tracks: vec![root],
            pending: Vec::new(),
            timeline,
            tick: 0,
            bpm,
            done: false,
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn into_timeline(self) -> Timeline {
        self.timeline
    }

    pub fn track(&self, unique_id: u32) -> Option<&Track<'a>> {
        self.tracks.iter().find(|t| t.unique_id == unique_id)
    }

    /// Runs one round: steps every live track, commits spawns, and
    /// advances the global tick. Returns whether the sequence is finished.
    /// The caller owns any upper bound on the number of rounds.
    pub fn step(&mut self) -> Result<bool> {
        if self.done {
            return Ok(true);
        }

        for index in 0..self.tracks.len() {
            if self.tracks[index].stopped {
                continue;
            }
            if self.tracks[index].tick_pause() {
                continue;
            }

            // A track can only dispatch more opcodes in one tick than the
            // buffer holds bytes by jumping backward without ever pausing,
            // which would pin the round forever.
            let budget = self.data.len().saturating_add(1);

            for dispatched in 0.. {
                let offset = self.tracks[index].offset();
                if dispatched >= budget {
                    return Err(BmsError::ZeroDelayLoop { offset });
                }
                let (opcode, args) = {
                    let dialect = &self.dialect;
                    self.tracks[index].parse_next_opcode(dialect)?
                };
                let command = Command::classify(opcode, args);
                trace!(
                    track = self.tracks[index].unique_id,
                    tick = self.tick,
                    offset,
                    ?command,
                    "step"
                );

                match self.execute(index, offset, command)? {
                    Flow::Continue => {}
                    Flow::Yield => break,
                }
            }

            if self.done {
                return Ok(true);
            }
        }

        self.commit_spawns();

        if self.tracks.iter().all(|t| t.stopped) {
            self.done = true;
        }

        self.tick += 1;
        Ok(self.done)
    }

    fn execute(&mut self, index: usize, offset: usize, command: Command) -> Result<Flow> {
        let tick = self.tick;
        let id = self.tracks[index].unique_id;

        match command {
            Command::NoteOn {
                note,
                slot,
                velocity,
            } => {
                if slot > MAX_SLOT {
                    if self.config.strict {
                        return Err(BmsError::InvalidSlot { slot, offset });
                    }
                    warn!(track = id, slot, offset, "dropping note with out-of-range slot");
                    return Ok(Flow::Continue);
                }
                self.tracks[index].add_note(slot, note);
                self.timeline.note_on(id, tick, note, velocity);
            }
            Command::NoteOff { slot } => {
                for note in self.tracks[index].clear_slot(slot) {
                    self.timeline.note_off(id, tick, note);
                }
            }
            Command::Pause { ticks } => {
                self.tracks[index].add_pause(ticks);
                return Ok(Flow::Yield);
            }
            Command::Pan { pan } => {
                self.timeline
                    .controller(id, tick, CC_PAN, u16::from(pan & 0x7f), false);
            }
            Command::Volume { value } => {
                // How wide the stored volume is depends on the revision;
                // newer ones use the full 16 bits and map onto a 14-bit
                // controller pair, older ones use a byte.
                if self.dialect.version() > Version::new(1, 0) {
                    let scaled = scale_value(u32::from(value), 16, 14) as u16;
                    self.timeline.controller(id, tick, CC_VOLUME, scaled, true);
                } else {
                    let scaled = scale_value(u32::from(value), 8, 7) as u16;
                    self.timeline.controller(id, tick, CC_VOLUME, scaled, false);
                }
            }
            Command::PitchShift { value } => {
                let scaled = scale_value(u32::from(value), 16, 14) as u16;
                self.timeline.pitch_bend(id, tick, scaled);
            }
            Command::BankSelect { bank } => {
                self.timeline
                    .controller(id, tick, CC_BANK_SELECT, u16::from(bank & 0x7f), false);
            }
            Command::ProgramChange { program } => {
                self.timeline.program_change(id, tick, program & 0x7f);
            }
            Command::SpawnTrack { track_id, offset } => {
                if self.config.single_track {
                    trace!(track = id, track_id, "single-track mode, spawn ignored");
                } else {
                    self.pending.push(PendingSpawn {
                        track_id,
                        offset,
                        parent: id,
                    });
                }
            }
            Command::Goto { offset } => {
                if !self.config.suppress_jumps {
                    self.tracks[index].save_return();
                    self.tracks[index].jump(offset as usize);
                }
            }
            Command::Return => {
                if !self.config.suppress_jumps {
                    self.tracks[index].return_to_saved(offset)?;
                }
            }
            Command::Loop { mode, offset } => {
                if !self.config.suppress_jumps {
                    if mode == 0 {
                        self.tracks[index].jump(offset as usize);
                    } else {
                        // Unrecognized loop modes exist in the wild; skip
                        // them rather than abort.
                        trace!(track = id, mode, "unrecognized loop mode, ignored");
                    }
                }
            }
            Command::SetBpm { bpm } => {
                if bpm == 0 {
                    warn!(track = id, "tempo change to 0 bpm ignored");
                } else {
                    self.bpm = bpm;
                    self.timeline
                        .tempo_change(id, tick, MICROSECONDS_PER_MINUTE / u32::from(bpm));
                }
            }
            Command::SetPpqn { ppqn } => {
                // The container's header resolution is fixed, so a
                // resolution change is folded into an adjusted tempo.
                // Lossy, but the closest the target format allows.
                if ppqn == 0 {
                    warn!(track = id, "resolution change to 0 ppqn ignored");
                } else {
                    let tempo =
                        MICROSECONDS_PER_MINUTE / (u32::from(self.bpm) * u32::from(ppqn));
                    self.timeline.tempo_change(id, tick, tempo);
                }
            }
            Command::EndOfTrack => {
                debug!(track = id, tick, offset, "end of track");
                self.tracks[index].stopped = true;
                if !self.config.single_track {
                    match self.config.termination {
                        Termination::AnyTrack => self.done = true,
                        Termination::RootTrack => {
                            if self.tracks[index].track_id.is_none() {
                                self.done = true;
                            }
                        }
                        Termination::AllTracks => {}
                    }
                }
                return Ok(Flow::Yield);
            }
            Command::Unknown { opcode, args } => {
                trace!(track = id, opcode, ?args, "unknown opcode, retained");
            }
        }

        Ok(Flow::Continue)
    }

    fn commit_spawns(&mut self) {
        for spawn in self.pending.drain(..) {
            let unique_id = self.timeline.add_track(self.tick);
            debug!(
                track = unique_id,
                bms_track = spawn.track_id,
                parent = spawn.parent,
                offset = spawn.offset,
                "spawning subroutine"
            );
            self.tracks.push(Track::new(
                Some(spawn.track_id),
                unique_id,
                Some(spawn.parent),
                Cursor::at(self.data, spawn.offset as usize),
            ));
        }
    }
}

/// Linear rescale between bit widths: round(value * (2^to - 1) / (2^from - 1)).
fn scale_value(value: u32, from_bits: u32, to_bits: u32) -> u32 {
    let from_max = (1u64 << from_bits) - 1;
    let to_max = (1u64 << to_bits) - 1;
    let clamped = u64::from(value).min(from_max);
    ((clamped * to_max + from_max / 2) / from_max) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::{builtin_registry, PIKMIN_2, WIND_WAKER};
    use smf::Event;

    fn engine(data: &[u8], config: Config) -> Engine<'_> {
        let registry = builtin_registry().unwrap();
        Engine::new(data, registry.resolve(PIKMIN_2), config)
    }

    fn run(engine: &mut Engine<'_>, max_ticks: u64) -> Result<()> {
        for _ in 0..max_ticks {
            if engine.step()? {
                return Ok(());
            }
        }
        Err(BmsError::TickLimit { ticks: max_ticks })
    }

    #[test]
    fn minimal_note_sequence() {
        // note-on 0x40 slot 1 vel 0x40; note-off slot 1; end.
        let data = [0x40, 0x01, 0x40, 0x81, 0xff];
        let mut eng = engine(&data, Config::default());

        assert!(eng.step().unwrap());
        assert_eq!(eng.current_tick(), 0);
        assert!(eng.track(0).unwrap().stopped);
        assert_eq!(
            eng.timeline().track(0).unwrap().events,
            vec![
                (
                    0,
                    Event::NoteOn {
                        note: 64,
                        velocity: 64
                    }
                ),
                (0, Event::NoteOff { note: 64 }),
            ]
        );
    }

    #[test]
    fn note_off_releases_every_layered_note() {
        // Two notes layered on slot 1, one note-off for both.
        let data = [0x40, 0x01, 0x40, 0x44, 0x01, 0x40, 0x81, 0xff];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 10).unwrap();

        let events = &eng.timeline().track(0).unwrap().events;
        assert_eq!(events.len(), 4);
        assert_eq!(events[2].1, Event::NoteOff { note: 0x40 });
        assert_eq!(events[3].1, Event::NoteOff { note: 0x44 });
    }

    #[test]
    fn note_off_on_empty_slot_is_a_no_op() {
        let data = [0x82, 0xff];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 10).unwrap();
        assert!(eng.timeline().track(0).unwrap().events.is_empty());
    }

    #[test]
    fn pause_suspends_for_exact_tick_count() {
        // pause 2 ticks, then note-on, then end.
        let data = [0x80, 0x02, 0x40, 0x01, 0x40, 0xff];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 10).unwrap();

        // Tick 0 decodes the pause, ticks 1-2 are spent paused, tick 3
        // plays the note.
        let events = &eng.timeline().track(0).unwrap().events;
        assert_eq!(events[0].0, 3);
    }

    #[test]
    fn sixteen_bit_pause() {
        let data = [0x88, 0x01, 0x00, 0x40, 0x01, 0x40, 0xff];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 300).unwrap();
        assert_eq!(eng.timeline().track(0).unwrap().events[0].0, 257);
    }

    #[test]
    fn variable_length_pause_is_decoded_to_ticks() {
        // 0xF0 with VLQ 0x81 0x00 = 128 ticks.
        let data = [0xf0, 0x81, 0x00, 0x40, 0x01, 0x40, 0xff];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 200).unwrap();
        assert_eq!(eng.timeline().track(0).unwrap().events[0].0, 129);
    }

    #[test]
    fn pauses_are_additive_not_overwriting() {
        let data = [0x80, 0x02, 0xff];
        let mut eng = engine(&data, Config::default());
        eng.step().unwrap();
        eng.tracks[0].add_pause(3);
        assert_eq!(eng.tracks[0].pause_ticks_left(), 5);
    }

    #[test]
    fn strict_mode_rejects_slot_above_seven() {
        let data = [0x40, 0x09, 0x40, 0xff];
        let mut eng = engine(&data, Config::default());
        assert_eq!(
            eng.step(),
            Err(BmsError::InvalidSlot { slot: 9, offset: 0 })
        );
    }

    #[test]
    fn lenient_mode_drops_bad_slot_silently() {
        let data = [0x40, 0x09, 0x40, 0xff];
        let mut eng = engine(
            &data,
            Config {
                strict: false,
                ..Config::default()
            },
        );
        run(&mut eng, 10).unwrap();

        assert!(eng.timeline().track(0).unwrap().events.is_empty());
        for slot in 0..=MAX_SLOT {
            assert!(eng.track(0).unwrap().sounding_notes(slot).is_empty());
        }
    }

    #[test]
    fn spawned_track_first_steps_next_tick() {
        // Root: spawn track 1 at offset 8, pause 2, end.
        // Child (offset 8): note-on, end.
        let data = [
            0xc1, 0x01, 0x00, 0x00, 0x08, // spawn
            0x80, 0x02, // pause 2
            0xff, // root end (offset 7)
            0x40, 0x01, 0x40, // child note-on (offset 8)
            0xff,
        ];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 10).unwrap();

        // Spawn was requested at tick 0; the child's first decoded opcode
        // (its note-on) lands on tick 1, never tick 0.
        let child = eng.timeline().track(1).unwrap();
        assert_eq!(child.start_tick, 0);
        assert_eq!(child.events[0].0, 1);
        assert_eq!(eng.track(1).unwrap().track_id, Some(1));
        assert_eq!(eng.track(1).unwrap().parent_id, Some(0));
    }

    #[test]
    fn single_track_mode_ignores_spawns() {
        let data = [
            0xc1, 0x01, 0x00, 0x00, 0x08, // spawn request
            0xff,
        ];
        let mut eng = engine(
            &data,
            Config {
                single_track: true,
                ..Config::default()
            },
        );
        run(&mut eng, 10).unwrap();
        assert_eq!(eng.timeline().len(), 1);
    }

    #[test]
    fn goto_saves_return_point_and_return_comes_back() {
        let data = [
            0xc4, 0x00, 0x00, 0x00, 0x09, // goto offset 9, saving offset 5
            0x40, 0x01, 0x40, // note-on at offset 5
            0xff, // end at offset 8
            0xc6, // at offset 9: return to 5
        ];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 10).unwrap();

        assert_eq!(
            eng.timeline().track(0).unwrap().events,
            vec![(
                0,
                Event::NoteOn {
                    note: 0x40,
                    velocity: 0x40
                }
            )]
        );
        assert!(eng.track(0).unwrap().stopped);
    }

    #[test]
    fn return_without_save_fails() {
        let data = [0xc6];
        let mut eng = engine(&data, Config::default());
        assert_eq!(eng.step(), Err(BmsError::NoReturnPoint { offset: 0 }));
    }

    #[test]
    fn unrecognized_loop_mode_is_a_no_op() {
        let data = [
            0xc8, 0x05, 0x00, 0x00, 0x00, // loop mode 5: ignored
            0xff,
        ];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 10).unwrap();
        assert!(eng.track(0).unwrap().stopped);
    }

    #[test]
    fn suppress_jumps_skips_control_flow() {
        let data = [
            0xc4, 0x00, 0x00, 0x00, 0x07, // goto: suppressed
            0xc6, // return: suppressed (would otherwise loop)
            0xff,
        ];
        let mut eng = engine(
            &data,
            Config {
                suppress_jumps: true,
                ..Config::default()
            },
        );
        run(&mut eng, 10).unwrap();
        assert!(eng.track(0).unwrap().stopped);
    }

    #[test]
    fn tempo_and_resolution_changes() {
        let data = [
            0xfd, 0x00, 0x78, // bpm 120
            0xfe, 0x00, 0x02, // ppqn 2
            0xff,
        ];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 10).unwrap();

        let events = &eng.timeline().track(0).unwrap().events;
        assert_eq!(
            events[0].1,
            Event::TempoChange {
                microseconds_per_quarter: 500_000
            }
        );
        // Resolution change approximated as 60e6 / (120 * 2).
        assert_eq!(
            events[1].1,
            Event::TempoChange {
                microseconds_per_quarter: 250_000
            }
        );
    }

    #[test]
    fn wide_volume_above_version_one() {
        let registry = builtin_registry().unwrap();
        let data = [0x9c, 0x00, 0xff, 0xff, 0xff];
        let mut eng = Engine::new(&data, registry.resolve(WIND_WAKER), Config::default());
        run(&mut eng, 10).unwrap();

        assert_eq!(
            eng.timeline().track(0).unwrap().events[0].1,
            Event::Controller {
                number: CC_VOLUME,
                value: 0x3fff,
                wide: true
            }
        );
    }

    #[test]
    fn narrow_volume_at_version_one() {
        let registry = builtin_registry().unwrap();
        let data = [0x9c, 0x00, 0xff, 0xff];
        let mut eng = Engine::new(
            &data,
            registry.resolve(crate::games::MARIO_SUNSHINE),
            Config::default(),
        );
        run(&mut eng, 10).unwrap();

        assert_eq!(
            eng.timeline().track(0).unwrap().events[0].1,
            Event::Controller {
                number: CC_VOLUME,
                value: 127,
                wide: false
            }
        );
    }

    #[test]
    fn pitch_rescales_sixteen_to_fourteen_bits() {
        let data = [0x9e, 0x00, 0x80, 0x00, 0x00, 0xff];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 10).unwrap();

        assert_eq!(
            eng.timeline().track(0).unwrap().events[0].1,
            Event::PitchBend { value: 0x2000 }
        );
    }

    #[test]
    fn bank_and_program_selection() {
        let data = [
            0xa4, 0x20, 0x05, // bank select 5
            0xa4, 0x21, 0x0c, // program change 12
            0xff,
        ];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 10).unwrap();

        let events = &eng.timeline().track(0).unwrap().events;
        assert_eq!(
            events[0].1,
            Event::Controller {
                number: CC_BANK_SELECT,
                value: 5,
                wide: false
            }
        );
        assert_eq!(events[1].1, Event::ProgramChange { program: 12 });
    }

    #[test]
    fn runaway_track_hits_caller_bound() {
        // Pause-and-jump-back forever; no end opcode.
        let data = [0x80, 0x01, 0xc8, 0x00, 0x00, 0x00, 0x00];
        let mut eng = engine(&data, Config::default());
        assert_eq!(run(&mut eng, 100), Err(BmsError::TickLimit { ticks: 100 }));
        assert_eq!(eng.current_tick(), 100);
    }

    #[test]
    fn pauseless_jump_cycle_fails_within_one_round() {
        // Loop mode 0 back to offset 0 with no pause anywhere: the round
        // itself must fail rather than spin while the tick stands still.
        let data = [0xc8, 0x00, 0x00, 0x00, 0x00];
        let mut eng = engine(&data, Config::default());
        assert!(matches!(eng.step(), Err(BmsError::ZeroDelayLoop { .. })));
        assert_eq!(eng.current_tick(), 0);
    }

    #[test]
    fn truncated_payload_is_fatal() {
        let data = [0x88, 0x01];
        let mut eng = engine(&data, Config::default());
        assert!(matches!(
            eng.step(),
            Err(BmsError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn any_track_termination_stops_at_first_end() {
        let data = [
            0xc1, 0x01, 0x00, 0x00, 0x07, // spawn child at 7
            0x80, 0x10, // root pauses
            0xff, // child ends immediately (offset 7)
        ];
        let mut eng = engine(&data, Config::default());
        run(&mut eng, 30).unwrap();
        assert!(eng.is_done());
        assert!(!eng.track(0).unwrap().stopped);
        assert!(eng.track(1).unwrap().stopped);
    }

    #[test]
    fn all_tracks_termination_waits_for_everyone() {
        let data = [
            0xc1, 0x01, 0x00, 0x00, 0x09, // spawn child at 9
            0x80, 0x04, // root pauses 4
            0xff, // root end (offset 7)
            0x00, // padding
            0xff, // child end (offset 9)
        ];
        let mut eng = engine(
            &data,
            Config {
                termination: Termination::AllTracks,
                ..Config::default()
            },
        );
        run(&mut eng, 20).unwrap();
        assert!(eng.track(0).unwrap().stopped);
        assert!(eng.track(1).unwrap().stopped);
    }

    #[test]
    fn root_track_termination() {
        let data = [
            0xc1, 0x01, 0x00, 0x00, 0x08, // spawn child at 8
            0x80, 0x01, // root pauses 1
            0xff, // root end (offset 7)
            0x80, 0x30, // child pauses long (offset 8)
            0xff,
        ];
        let mut eng = engine(
            &data,
            Config {
                termination: Termination::RootTrack,
                ..Config::default()
            },
        );
        run(&mut eng, 20).unwrap();
        assert!(eng.is_done());
        assert!(eng.track(0).unwrap().stopped);
        assert!(!eng.track(1).unwrap().stopped);
    }

    #[test]
    fn scale_value_rounds() {
        assert_eq!(scale_value(0xffff, 16, 14), 0x3fff);
        assert_eq!(scale_value(0, 16, 14), 0);
        assert_eq!(scale_value(0x8000, 16, 14), 0x2000);
        assert_eq!(scale_value(255, 8, 7), 127);
        // Values wider than the declared source width are clamped.
        assert_eq!(scale_value(300, 8, 7), 127);
    }
}
