//! # midi_analyzer
//!
//! Decode Standard MIDI Files and derive per-track musical statistics:
//! note usage, an octave-folded pitch-class distribution, a best-guess
//! key/scale, and flat numeric sequences usable as training data for a
//! generative model.
//!
//! ## Example
//! ```rust
//! use midi_analyzer::analyze_bytes;
//!
//! fn run() -> Result<(), midi_analyzer::DecodeError> {
//!     // A one-track file: Set Tempo (120 BPM), then middle C held for
//!     // one quarter note.
//!     let mut smf = Vec::new();
//!     smf.extend_from_slice(b"MThd");
//!     smf.extend_from_slice(&6u32.to_be_bytes());
//!     smf.extend_from_slice(&0u16.to_be_bytes()); // format 0
//!     smf.extend_from_slice(&1u16.to_be_bytes()); // one track
//!     smf.extend_from_slice(&480u16.to_be_bytes()); // ticks per quarter
//!     let track = [
//!         0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo: 500000 us/quarter
//!         0x00, 0x90, 60, 80, // Note On, middle C
//!         0x83, 0x60, 0x80, 60, 0, // Note Off 480 ticks later
//!         0x00, 0xFF, 0x2F, 0x00, // End of Track
//!     ];
//!     smf.extend_from_slice(b"MTrk");
//!     smf.extend_from_slice(&(track.len() as u32).to_be_bytes());
//!     smf.extend_from_slice(&track);
//!
//!     let report = analyze_bytes(&smf)?;
//!     let analysis = report.tracks[0].analysis.as_ref().unwrap();
//!     let key = analysis.key.unwrap();
//!     println!(
//!         "detected {} {:?}, transpose by {}",
//!         key.root, key.scale, key.transpose_semitones
//!     );
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sequential big-endian reader with variable-length-quantity support.
pub use cursor::ByteCursor;

/// Chunk decoding: header, tracks, and the typed event model.
pub use decoder::{ChannelEvent, ChannelKind, DecodeSession, Event, Header, MetaEvent, Track};

/// Note aggregation and octave folding.
pub use analyzer::{aggregate_notes, fold_octaves, rank_pitch_classes, NoteStats, Sequences};

/// Key detection over roots and scale templates.
pub use tonality::{detect_key, PitchClass, ScaleType, TonalityResult, SCALE_TYPES};

/// Report assembly and the file/byte entry points.
pub use report::{
    analyze_bytes, analyze_file, analyze_track, AnalyzeError, Report, TrackAnalysis, TrackReport,
};

/// Byte cursor module.
pub mod cursor;

/// Chunk and event decoding module.
pub mod decoder;

/// Per-track note statistics module.
pub mod analyzer;

/// Tonality detection module.
pub mod tonality;

/// Report assembly module.
pub mod report;

/// Failures while decoding a Standard MIDI File.
///
/// Any of these abort decoding of the current file, except that a
/// [`MalformedEvent`](DecodeError::MalformedEvent) inside a track body
/// stops only that track; events decoded before the failure are still
/// reported on the track's entry.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DecodeError {
    /// A chunk magic or fixed-size field did not match the format.
    #[error("invalid format at offset {offset}: {reason}")]
    InvalidFormat {
        /// Byte offset of the offending field.
        offset: usize,
        /// What was expected there.
        reason: String,
    },

    /// A read would run past the end of the buffer.
    #[error("unexpected end of input at offset {offset}: needed {needed} bytes, {remaining} remain")]
    UnexpectedEof {
        /// Byte offset where the read started.
        offset: usize,
        /// Number of bytes the read required.
        needed: usize,
        /// Number of bytes actually left.
        remaining: usize,
    },

    /// The event stream violated the protocol.
    #[error("malformed event at offset {offset}: {reason}")]
    MalformedEvent {
        /// Byte offset where decoding stopped.
        offset: usize,
        /// What went wrong.
        reason: String,
    },
}
