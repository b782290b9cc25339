//! Serializes a [`Timeline`] into a Format 1 Standard MIDI File.

use crate::timeline::{Event, Timeline, TimelineTrack};
use crate::{vlq, SmfError};

const MAX_CHANNELS: usize = 16;

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Header division, in pulses per quarter note.
    pub division: u16,
    /// Bank select (CC 0) emitted at the start of every track, if set.
    pub instrument_bank: Option<u8>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            division: 100,
            instrument_bank: None,
        }
    }
}

/// One track chunk under construction: (delta, event bytes) pairs.
struct TrackChunk {
    data: Vec<u8>,
    last_tick: u64,
}

impl TrackChunk {
    fn new(start_tick: u64) -> Self {
        Self {
            data: Vec::new(),
            last_tick: start_tick,
        }
    }

    fn event(&mut self, tick: u64, bytes: &[u8]) {
        let delta = tick.saturating_sub(self.last_tick);
        self.last_tick = tick;
        vlq::encode(delta as u32, &mut self.data);
        self.data.extend_from_slice(bytes);
    }

    /// Same tick as the previous event; used for the second half of a wide
    /// controller pair.
    fn event_here(&mut self, bytes: &[u8]) {
        self.data.push(0);
        self.data.extend_from_slice(bytes);
    }

    fn finish(mut self, out: &mut Vec<u8>) {
        // Explicit end-of-track meta event.
        self.data.extend_from_slice(&[0x00, 0xff, 0x2f, 0x00]);

        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.data);
    }
}

/// Produces the complete container: MThd, then one MTrk per timeline track.
///
/// Every track gets the channel equal to its id; with more than 16 tracks
/// this would wrap, which is reported as [`SmfError::ChannelExhausted`]
/// instead.
pub fn write_timeline(timeline: &Timeline, options: &WriterOptions) -> crate::Result<Vec<u8>> {
    if timeline.len() > MAX_CHANNELS {
        return Err(SmfError::ChannelExhausted {
            tracks: timeline.len(),
        });
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // format 1
    out.extend_from_slice(&(timeline.len() as u16).to_be_bytes());
    out.extend_from_slice(&options.division.to_be_bytes());

    for (id, track) in timeline.tracks().enumerate() {
        let channel = (id % MAX_CHANNELS) as u8;
        write_track(track, channel, options, &mut out);
    }

    Ok(out)
}

fn write_track(track: &TimelineTrack, channel: u8, options: &WriterOptions, out: &mut Vec<u8>) {
    let mut chunk = TrackChunk::new(track.start_tick);

    if let Some(bank) = options.instrument_bank {
        chunk.event(track.start_tick, &[0xb0 | channel, 0x00, bank & 0x7f]);
    }

    for &(tick, event) in &track.events {
        match event {
            Event::NoteOn { note, velocity } => {
                chunk.event(tick, &[0x90 | channel, note & 0x7f, velocity & 0x7f]);
            }
            Event::NoteOff { note } => {
                chunk.event(tick, &[0x80 | channel, note & 0x7f, 0x00]);
            }
            Event::Controller {
                number,
                value,
                wide,
            } => {
                if wide {
                    // 14-bit value as a coarse/fine controller pair.
                    let msb = ((value >> 7) & 0x7f) as u8;
                    let lsb = (value & 0x7f) as u8;
                    chunk.event(tick, &[0xb0 | channel, number & 0x7f, msb]);
                    chunk.event_here(&[0xb0 | channel, (number + 32) & 0x7f, lsb]);
                } else {
                    chunk.event(tick, &[0xb0 | channel, number & 0x7f, (value & 0x7f) as u8]);
                }
            }
            Event::ProgramChange { program } => {
                chunk.event(tick, &[0xc0 | channel, program & 0x7f]);
            }
            Event::PitchBend { value } => {
                let lsb = (value & 0x7f) as u8;
                let msb = ((value >> 7) & 0x7f) as u8;
                chunk.event(tick, &[0xe0 | channel, lsb, msb]);
            }
            Event::TempoChange {
                microseconds_per_quarter,
            } => {
                let t = microseconds_per_quarter.min(0x00ff_ffff);
                chunk.event(
                    tick,
                    &[
                        0xff,
                        0x51,
                        0x03,
                        (t >> 16) as u8,
                        (t >> 8) as u8,
                        t as u8,
                    ],
                );
            }
        }
    }

    chunk.finish(out);
}
