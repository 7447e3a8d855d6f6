//! Chunk decoding
//!
//! Header and track chunk parsers for the Standard MIDI File layout:
//! one `MThd` chunk followed by `MTrk` chunks holding delta-time
//! prefixed events. Track decoding carries the two pieces of running
//! state the format requires: the running status byte (per track) and
//! the active tempo (per file), which converts delta ticks into
//! elapsed seconds.

use std::fmt::Display;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cursor::ByteCursor;
use crate::DecodeError;

const HEADER_MAGIC: &[u8; 4] = b"MThd";
const TRACK_MAGIC: &[u8; 4] = b"MTrk";
const HEADER_CHUNK_LENGTH: u32 = 6;

/// Meta event type code for Set Tempo.
const META_SET_TEMPO: u8 = 0x51;

/// Parsed `MThd` chunk fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// File format: 0 single track, 1 parallel tracks with a leading
    /// tempo/meta track, 2 sequential tracks.
    pub format: u16,
    /// Number of `MTrk` chunks that follow.
    pub num_tracks: u16,
    /// Ticks per quarter note. SMPTE division (high bit set) is
    /// rejected during header parsing.
    pub division: u16,
}

/// Channel event kinds, high nibble 8 through 14 of the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Note Off (type code 8)
    NoteOff,
    /// Note On (type code 9); velocity 0 is semantically a Note Off
    NoteOn,
    /// Polyphonic Key Pressure (type code 10)
    PolyphonicPressure,
    /// Control Change (type code 11)
    ControlChange,
    /// Program Change (type code 12), single data byte
    ProgramChange,
    /// Channel Pressure (type code 13), single data byte
    ChannelPressure,
    /// Pitch Bend (type code 14)
    PitchBend,
}

impl ChannelKind {
    /// Map a status-byte high nibble (8..=14) to its kind.
    pub const fn from_code(code: u8) -> Option<ChannelKind> {
        match code {
            8 => Some(ChannelKind::NoteOff),
            9 => Some(ChannelKind::NoteOn),
            10 => Some(ChannelKind::PolyphonicPressure),
            11 => Some(ChannelKind::ControlChange),
            12 => Some(ChannelKind::ProgramChange),
            13 => Some(ChannelKind::ChannelPressure),
            14 => Some(ChannelKind::PitchBend),
            _ => None,
        }
    }

    /// The status-byte high nibble for this kind.
    pub const fn code(self) -> u8 {
        match self {
            ChannelKind::NoteOff => 8,
            ChannelKind::NoteOn => 9,
            ChannelKind::PolyphonicPressure => 10,
            ChannelKind::ControlChange => 11,
            ChannelKind::ProgramChange => 12,
            ChannelKind::ChannelPressure => 13,
            ChannelKind::PitchBend => 14,
        }
    }

    /// Whether events of this kind carry a second data byte. Program
    /// Change and Channel Pressure carry only one.
    pub const fn has_second_param(self) -> bool {
        !matches!(
            self,
            ChannelKind::ProgramChange | ChannelKind::ChannelPressure
        )
    }
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelKind::NoteOff => "Note Off",
            ChannelKind::NoteOn => "Note On",
            ChannelKind::PolyphonicPressure => "Polyphonic Key Pressure",
            ChannelKind::ControlChange => "Control Change",
            ChannelKind::ProgramChange => "Program Change",
            ChannelKind::ChannelPressure => "Channel Pressure",
            ChannelKind::PitchBend => "Pitch Bend",
        };
        write!(f, "{name}")
    }
}

/// A channel voice event with its absolute elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Elapsed time in seconds from the start of the track.
    pub time: f64,
    /// Event kind from the status high nibble.
    pub kind: ChannelKind,
    /// Channel number, 1..=16.
    pub channel: u8,
    /// First data byte (pitch for note events).
    pub param1: u8,
    /// Second data byte (velocity for note events); absent for Program
    /// Change and Channel Pressure.
    pub param2: Option<u8>,
}

/// A meta or system-exclusive event with its raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEvent {
    /// Elapsed time in seconds from the start of the track.
    pub time: f64,
    /// Meta type byte (or the first byte after 0xF0/0xF7 for sysex).
    pub type_code: u8,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl MetaEvent {
    /// Human-readable name for the meta type code.
    pub fn name(&self) -> &'static str {
        match self.type_code {
            0 => "Sequence Number",
            1 => "Text Event",
            2 => "Copyright Notice",
            3 => "Track Name",
            4 => "Instrument Name",
            5 => "Lyric Text",
            6 => "Marker",
            7 => "Cue Point",
            32 => "MIDI Channel Prefix",
            33 => "MIDI Port",
            47 => "End of Track",
            81 => "Tempo Change",
            84 => "SMPTE Offset",
            88 => "Time Signature",
            89 => "Key Signature",
            127 => "Sequencer-Specific",
            _ => "Unknown Event",
        }
    }

    /// Display tempo in BPM for a Set Tempo event, `None` otherwise.
    pub fn tempo_bpm(&self) -> Option<f64> {
        let micros = self.tempo_micros()?;
        Some(60_000_000.0 / f64::from(micros))
    }

    /// Microseconds per quarter note for a Set Tempo event.
    pub fn tempo_micros(&self) -> Option<u32> {
        if self.type_code != META_SET_TEMPO || self.payload.len() < 3 {
            return None;
        }
        Some(
            (u32::from(self.payload[0]) << 16)
                | (u32::from(self.payload[1]) << 8)
                | u32::from(self.payload[2]),
        )
    }
}

/// One decoded event, resolved by pattern match rather than
/// optional-field probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Channel voice event.
    Channel(ChannelEvent),
    /// Meta or system-exclusive event.
    Meta(MetaEvent),
}

impl Event {
    /// Absolute elapsed time of the event in seconds.
    pub fn time(&self) -> f64 {
        match self {
            Event::Channel(event) => event.time,
            Event::Meta(event) => event.time,
        }
    }
}

/// One decoded `MTrk` chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Events in stream order with absolute elapsed times.
    pub events: Vec<Event>,
    /// Set when a malformed event stopped this track's decode early;
    /// `events` then holds everything decoded before the failure.
    pub error: Option<DecodeError>,
}

/// Mutable decode state for one file.
///
/// A session owns exactly one buffer, one cursor position, and one
/// tempo value. The active tempo persists across tracks within the
/// session but never leaks into another session, so independent files
/// can be decoded concurrently by giving each its own session.
#[derive(Debug)]
pub struct DecodeSession<'a> {
    cursor: ByteCursor<'a>,
    division: u16,
    /// Microseconds per quarter note. Zero until the first Set Tempo
    /// event, which makes all earlier delta-times convert to zero
    /// seconds.
    microseconds_per_quarter: u32,
}

impl<'a> DecodeSession<'a> {
    /// Start a session over a fully buffered file.
    pub fn new(bytes: &'a [u8]) -> Self {
        DecodeSession {
            cursor: ByteCursor::new(bytes),
            division: 0,
            microseconds_per_quarter: 0,
        }
    }

    /// Microseconds per quarter note currently in effect.
    pub fn tempo_micros(&self) -> u32 {
        self.microseconds_per_quarter
    }

    /// Convert a tick delta to seconds using the active tempo.
    fn delta_seconds(&self, ticks: u32) -> f64 {
        if self.microseconds_per_quarter == 0 || self.division == 0 {
            return 0.0;
        }
        f64::from(ticks) * f64::from(self.microseconds_per_quarter)
            / (f64::from(self.division) * 1e6)
    }

    /// Consume exactly one `MThd` chunk.
    pub fn read_header(&mut self) -> Result<Header, DecodeError> {
        let offset = self.cursor.position();
        if self.cursor.read_bytes(4)? != HEADER_MAGIC {
            return Err(DecodeError::InvalidFormat {
                offset,
                reason: "missing MThd chunk".into(),
            });
        }

        let offset = self.cursor.position();
        let length = self.cursor.read_u32()?;
        if length != HEADER_CHUNK_LENGTH {
            return Err(DecodeError::InvalidFormat {
                offset,
                reason: format!("header chunk length must be 6, got {length}"),
            });
        }

        let format = self.cursor.read_u16()?;
        let num_tracks = self.cursor.read_u16()?;
        let offset = self.cursor.position();
        let division = self.cursor.read_u16()?;
        if division & 0x8000 != 0 {
            return Err(DecodeError::InvalidFormat {
                offset,
                reason: "SMPTE division is not supported".into(),
            });
        }
        self.division = division;

        debug!("header: format {format}, {num_tracks} tracks, division {division}");
        Ok(Header {
            format,
            num_tracks,
            division,
        })
    }

    /// Consume one `MTrk` chunk.
    ///
    /// A [`DecodeError::MalformedEvent`] inside the chunk body stops
    /// this track only: the partial event list is returned with the
    /// error attached, and the cursor is realigned to the chunk's
    /// declared end so the next track can still be read. Other errors
    /// propagate and abort the file.
    pub fn read_track(&mut self) -> Result<Track, DecodeError> {
        let offset = self.cursor.position();
        if self.cursor.read_bytes(4)? != TRACK_MAGIC {
            return Err(DecodeError::InvalidFormat {
                offset,
                reason: "missing MTrk chunk".into(),
            });
        }

        let length = self.cursor.read_u32()? as usize;
        let track_end = self.cursor.position() + length;

        let mut events = Vec::new();
        let mut elapsed = 0.0f64;
        let mut running_status: Option<u8> = None;

        let error = loop {
            if self.cursor.position() >= track_end {
                break None;
            }
            match self.read_event(&mut elapsed, &mut running_status) {
                Ok(event) => events.push(event),
                Err(error @ DecodeError::MalformedEvent { .. }) => {
                    warn!("{error}; dropping the rest of the track");
                    break Some(error);
                }
                Err(error) => return Err(error),
            }
        };

        if error.is_some() {
            // Realign on the declared chunk end; the remaining bytes of
            // this chunk are unreadable without resynchronization.
            self.cursor.seek(track_end);
        }

        Ok(Track { events, error })
    }

    fn read_event(
        &mut self,
        elapsed: &mut f64,
        running_status: &mut Option<u8>,
    ) -> Result<Event, DecodeError> {
        let delta = self.cursor.read_var_length()?;
        *elapsed += self.delta_seconds(delta);

        let mut status = self.cursor.read_u8()?;
        if status & 0x80 != 0 {
            *running_status = Some(status);
        } else if let Some(previous) = *running_status {
            // Running-status carry-forward: the byte we just read is
            // the event's first data byte. Un-read it.
            self.cursor.rewind(1);
            status = previous;
        } else {
            return Err(DecodeError::MalformedEvent {
                offset: self.cursor.position(),
                reason: format!("data byte 0x{status:02X} with no running status"),
            });
        }

        match status {
            0x80..=0xEF => {
                let kind = match ChannelKind::from_code(status >> 4) {
                    Some(kind) => kind,
                    None => unreachable!("status range restricts the high nibble to 8..=14"),
                };
                let channel = (status & 0x0F) + 1;
                let param1 = self.cursor.read_u8()?;
                let param2 = if kind.has_second_param() {
                    Some(self.cursor.read_u8()?)
                } else {
                    None
                };
                Ok(Event::Channel(ChannelEvent {
                    time: *elapsed,
                    kind,
                    channel,
                    param1,
                    param2,
                }))
            }
            0xFF | 0xF0 | 0xF7 => {
                let type_code = self.cursor.read_u8()?;
                let length = self.cursor.read_var_length()? as usize;
                let payload = self.cursor.read_bytes(length)?.to_vec();

                let event = MetaEvent {
                    time: *elapsed,
                    type_code,
                    payload,
                };
                if let Some(micros) = event.tempo_micros() {
                    // Applies to every subsequent delta-time in this
                    // session, including later tracks.
                    self.microseconds_per_quarter = micros;
                    debug!(
                        "tempo change: {micros} us/quarter ({:.3} BPM)",
                        60_000_000.0 / f64::from(micros)
                    );
                }
                Ok(Event::Meta(event))
            }
            other => Err(DecodeError::MalformedEvent {
                offset: self.cursor.position(),
                reason: format!("unknown status byte 0x{other:02X}"),
            }),
        }
    }
}
