//! Report assembly
//!
//! Pure composition over the other modules: decode every track chunk,
//! run the note aggregation and tonality pipeline on each, and hand
//! back one [`Report`] value for presentation or bridge code to
//! consume.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyzer::{aggregate_notes, fold_octaves, rank_pitch_classes, NoteStats, Sequences};
use crate::decoder::{DecodeSession, Event, Header};
use crate::tonality::{detect_key, PitchClass, TonalityResult};
use crate::DecodeError;

/// Errors from the file-path entry point.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// The file could not be read.
    #[error("failed to read `{path}`: {source}")]
    Io {
        /// Path that failed to open or read.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The file contents could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Statistics derived from one track's note events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackAnalysis {
    /// Per-pitch aggregates for every raw pitch touched by a note
    /// event.
    pub notes: BTreeMap<u8, NoteStats>,
    /// The raw aggregate folded into the 12 pitch classes.
    pub folded: [NoteStats; 12],
    /// Pitch classes ranked by occurrence, most frequent first.
    pub ranking: [PitchClass; 12],
    /// Best-matching key, or `None` for a silent track.
    pub key: Option<TonalityResult>,
    /// Flat pitch/velocity/duration training sequences.
    pub sequences: Sequences,
}

/// One track's slice of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackReport {
    /// Decoded events in stream order.
    pub events: Vec<Event>,
    /// Note statistics; `None` for the conductor track of a format 1
    /// file, whose events are still listed above.
    pub analysis: Option<TrackAnalysis>,
    /// Set when a malformed event cut this track's decode short.
    pub error: Option<DecodeError>,
}

/// Everything derived from one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Parsed header chunk.
    pub header: Header,
    /// One entry per track chunk, in file order.
    pub tracks: Vec<TrackReport>,
}

impl Report {
    /// Training sequences for one track, `None` when the index is out
    /// of range or the track was not analyzed.
    pub fn sequences(&self, track_index: usize) -> Option<&Sequences> {
        let analysis = self.tracks.get(track_index)?.analysis.as_ref()?;
        Some(&analysis.sequences)
    }

    /// Detected key for one track, `None` when the index is out of
    /// range, the track was not analyzed, or no key was detected.
    pub fn key(&self, track_index: usize) -> Option<TonalityResult> {
        self.tracks.get(track_index)?.analysis.as_ref()?.key
    }
}

/// Run the full aggregation pipeline over one track's events.
pub fn analyze_track(events: &[Event]) -> TrackAnalysis {
    let (notes, sequences) = aggregate_notes(events);
    let folded = fold_octaves(&notes);
    let ranking = rank_pitch_classes(&folded);
    let key = detect_key(&folded);
    TrackAnalysis {
        notes,
        folded,
        ranking,
        key,
        sequences,
    }
}

/// Decode and analyze a fully buffered Standard MIDI File.
pub fn analyze_bytes(bytes: &[u8]) -> Result<Report, DecodeError> {
    let mut session = DecodeSession::new(bytes);
    let header = session.read_header()?;

    let mut tracks = Vec::with_capacity(usize::from(header.num_tracks));
    for index in 0..header.num_tracks {
        let track = session.read_track()?;

        // Format 1 reserves the first track for tempo and meta events;
        // its events are reported but not worth analyzing.
        let analysis = if header.format == 1 && index == 0 {
            None
        } else {
            Some(analyze_track(&track.events))
        };

        tracks.push(TrackReport {
            events: track.events,
            analysis,
            error: track.error,
        });
    }

    debug!(
        "decoded {} of {} tracks, {} events total",
        tracks.len(),
        header.num_tracks,
        tracks.iter().map(|t| t.events.len()).sum::<usize>()
    );

    Ok(Report { header, tracks })
}

/// Read a Standard MIDI File from disk and analyze it.
///
/// The whole file is buffered before any parsing begins.
pub fn analyze_file<P: AsRef<Path>>(path: P) -> Result<Report, AnalyzeError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| AnalyzeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(analyze_bytes(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tonality::ScaleType;

    fn smf(format: u16, division: u16, tracks: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&format.to_be_bytes());
        buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        buf.extend_from_slice(&division.to_be_bytes());
        for body in tracks {
            buf.extend_from_slice(b"MTrk");
            buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
            buf.extend_from_slice(body);
        }
        buf
    }

    #[test]
    fn format_1_skips_conductor_track_analysis() {
        let tempo: &[u8] = &[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, 0x00, 0xFF, 0x2F, 0x00];
        let notes: &[u8] = &[0x00, 0x90, 60, 80, 0x83, 0x60, 0x80, 60, 0, 0x00, 0xFF, 0x2F, 0x00];
        let report = analyze_bytes(&smf(1, 480, &[tempo, notes])).unwrap();

        assert!(report.tracks[0].analysis.is_none());
        assert!(!report.tracks[0].events.is_empty());
        assert!(report.tracks[1].analysis.is_some());
        assert!(report.sequences(0).is_none());
        assert_eq!(report.sequences(1).unwrap().pitch, vec![60]);
    }

    #[test]
    fn format_0_analyzes_first_track() {
        let body: &[u8] = &[
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo
            0x00, 0x90, 60, 80, // Note On
            0x83, 0x60, 0x80, 60, 0, // Note Off
        ];
        let report = analyze_bytes(&smf(0, 480, &[body])).unwrap();

        let analysis = report.tracks[0].analysis.as_ref().unwrap();
        assert_eq!(analysis.notes[&60].occurrences, 1);
        let key = report.key(0).unwrap();
        assert_eq!(key.root, PitchClass::C);
        assert_eq!(key.scale, ScaleType::Major);
    }

    #[test]
    fn zero_track_file_is_valid() {
        let report = analyze_bytes(&smf(0, 480, &[])).unwrap();
        assert!(report.tracks.is_empty());
        assert_eq!(report.header.num_tracks, 0);
        assert!(report.sequences(0).is_none());
    }

    #[test]
    fn silent_track_has_no_key() {
        let body: &[u8] = &[0x00, 0xFF, 0x2F, 0x00];
        let report = analyze_bytes(&smf(0, 480, &[body])).unwrap();

        let analysis = report.tracks[0].analysis.as_ref().unwrap();
        assert!(analysis.notes.is_empty());
        assert_eq!(analysis.key, None);
        assert!(analysis.sequences.pitch.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = analyze_file("definitely/not/a/real/file.mid");
        assert!(matches!(result, Err(AnalyzeError::Io { .. })));
    }
}
