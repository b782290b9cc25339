//! The abstract event timeline built by an interpreter and consumed by the
//! writer.
//!
//! Tracks are identified by dense logical ids handed out in registration
//! order; `add_track` returns the id for the caller to key its own state by.
//! The timeline is append-only while events are being scheduled and
//! read-only once handed to the writer.

/// One scheduled channel or meta event, already translated into the MIDI
/// value domain (14-bit pitch, 7/14-bit controller values, µs-per-quarter
/// tempo).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    /// A continuous controller change. With `wide` set, `value` is a 14-bit
    /// quantity written as a coarse/fine controller pair (n and n+32).
    Controller { number: u8, value: u16, wide: bool },
    ProgramChange { program: u8 },
    /// 14-bit pitch wheel position.
    PitchBend { value: u16 },
    /// Tempo meta event, in microseconds per quarter note.
    TempoChange { microseconds_per_quarter: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct TimelineTrack {
    /// Tick at which this track was registered; delta times in the output
    /// are relative to it.
    pub start_tick: u64,
    /// (tick, event) pairs in scheduling order. Ticks never decrease.
    pub events: Vec<(u64, Event)>,
}

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    tracks: Vec<TimelineTrack>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new output track and returns its logical id.
    pub fn add_track(&mut self, start_tick: u64) -> u32 {
        let id = self.tracks.len() as u32;
        self.tracks.push(TimelineTrack {
            start_tick,
            events: Vec::new(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, id: u32) -> Option<&TimelineTrack> {
        self.tracks.get(id as usize)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TimelineTrack> {
        self.tracks.iter()
    }

    pub fn push(&mut self, id: u32, tick: u64, event: Event) {
        if let Some(track) = self.tracks.get_mut(id as usize) {
            track.events.push((tick, event));
        }
    }

    pub fn note_on(&mut self, id: u32, tick: u64, note: u8, velocity: u8) {
        self.push(id, tick, Event::NoteOn { note, velocity });
    }

    pub fn note_off(&mut self, id: u32, tick: u64, note: u8) {
        self.push(id, tick, Event::NoteOff { note });
    }

    pub fn controller(&mut self, id: u32, tick: u64, number: u8, value: u16, wide: bool) {
        self.push(
            id,
            tick,
            Event::Controller {
                number,
                value,
                wide,
            },
        );
    }

    pub fn program_change(&mut self, id: u32, tick: u64, program: u8) {
        self.push(id, tick, Event::ProgramChange { program });
    }

    pub fn pitch_bend(&mut self, id: u32, tick: u64, value: u16) {
        self.push(id, tick, Event::PitchBend { value });
    }

    pub fn tempo_change(&mut self, id: u32, tick: u64, microseconds_per_quarter: u32) {
        self.push(
            id,
            tick,
            Event::TempoChange {
                microseconds_per_quarter,
            },
        );
    }
}
