//! Note aggregation
//!
//! Consumes one track's decoded events and tracks per-pitch
//! occurrence, velocity, and duration statistics, then folds the raw
//! aggregate into the 12 pitch classes. A Note On with velocity 0 is
//! treated as a Note Off throughout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decoder::{ChannelKind, Event};
use crate::tonality::PitchClass;

const SEMITONES: usize = 12;

/// Cumulative statistics for one pitch (or one pitch class after
/// folding).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteStats {
    /// Number of true Note On events (velocity > 0).
    pub occurrences: u32,
    /// Sum of Note On velocities.
    pub total_velocity: u64,
    /// Sum of sounding durations in seconds, accumulated on Note Off.
    pub total_duration: f64,
}

impl NoteStats {
    /// Mean Note On velocity, 0 for a silent aggregate.
    pub fn average_velocity(&self) -> f64 {
        if self.occurrences == 0 {
            return 0.0;
        }
        self.total_velocity as f64 / f64::from(self.occurrences)
    }

    /// Mean sounding duration in seconds, 0 for a silent aggregate.
    pub fn average_duration(&self) -> f64 {
        if self.occurrences == 0 {
            return 0.0;
        }
        self.total_duration / f64::from(self.occurrences)
    }

    fn absorb(&mut self, other: &NoteStats) {
        self.occurrences += other.occurrences;
        self.total_velocity += other.total_velocity;
        self.total_duration += other.total_duration;
    }
}

/// Flat numeric sequences extracted from one track, ordered by event
/// position.
///
/// The three sequences are appended independently: `pitch` and
/// `velocity` grow on every Note On, `duration_ms` grows on every Note
/// Off, so they are not index-aligned with each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequences {
    /// Pitch of each Note On, in order.
    pub pitch: Vec<u8>,
    /// Velocity of each Note On, in order.
    pub velocity: Vec<u8>,
    /// Sounding duration in whole milliseconds of each Note Off, in
    /// order.
    pub duration_ms: Vec<u32>,
}

/// Decoding-time state for one pitch; only the statistics survive.
#[derive(Debug, Clone, Copy, Default)]
struct NoteState {
    stats: NoteStats,
    last_on: f64,
}

/// Walk a track's events once and aggregate its note statistics.
///
/// Returns the per-pitch aggregates (every pitch touched by a note
/// event, even if never switched on) together with the three training
/// sequences.
pub fn aggregate_notes(events: &[Event]) -> (BTreeMap<u8, NoteStats>, Sequences) {
    let mut states: BTreeMap<u8, NoteState> = BTreeMap::new();
    let mut sequences = Sequences::default();

    for event in events {
        let Event::Channel(note) = event else {
            continue;
        };
        if !matches!(note.kind, ChannelKind::NoteOff | ChannelKind::NoteOn) {
            continue;
        }

        let velocity = note.param2.unwrap_or(0);
        let state = states.entry(note.param1).or_default();
        let is_off = note.kind == ChannelKind::NoteOff || velocity == 0;

        if is_off {
            let duration = note.time - state.last_on;
            state.stats.total_duration += duration;
            sequences.duration_ms.push((duration * 1000.0).floor() as u32);
        } else {
            state.stats.occurrences += 1;
            state.stats.total_velocity += u64::from(velocity);
            state.last_on = note.time;
            sequences.pitch.push(note.param1);
            sequences.velocity.push(velocity);
        }
    }

    let notes = states
        .into_iter()
        .map(|(pitch, state)| (pitch, state.stats))
        .collect();
    (notes, sequences)
}

/// Fold a raw per-pitch aggregate into the 12 pitch classes.
pub fn fold_octaves(notes: &BTreeMap<u8, NoteStats>) -> [NoteStats; SEMITONES] {
    let mut folded = [NoteStats::default(); SEMITONES];
    for (&pitch, stats) in notes {
        folded[usize::from(pitch) % SEMITONES].absorb(stats);
    }
    folded
}

/// Rank the 12 pitch classes by occurrence, most frequent first.
///
/// Ties keep ascending pitch-class order, so the ranking is fully
/// deterministic.
pub fn rank_pitch_classes(folded: &[NoteStats; SEMITONES]) -> [PitchClass; SEMITONES] {
    let mut order: [usize; SEMITONES] = std::array::from_fn(|class| class);
    order.sort_by_key(|&class| std::cmp::Reverse(folded[class].occurrences));
    order.map(PitchClass::from_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ChannelEvent;

    fn note_on(time: f64, pitch: u8, velocity: u8) -> Event {
        Event::Channel(ChannelEvent {
            time,
            kind: ChannelKind::NoteOn,
            channel: 1,
            param1: pitch,
            param2: Some(velocity),
        })
    }

    fn note_off(time: f64, pitch: u8) -> Event {
        Event::Channel(ChannelEvent {
            time,
            kind: ChannelKind::NoteOff,
            channel: 1,
            param1: pitch,
            param2: Some(0),
        })
    }

    #[test]
    fn on_off_pair_is_aggregated() {
        let events = [note_on(0.0, 60, 80), note_off(0.5, 60)];
        let (notes, sequences) = aggregate_notes(&events);

        let stats = notes[&60];
        assert_eq!(stats.occurrences, 1);
        assert_eq!(stats.total_velocity, 80);
        assert_eq!(stats.total_duration, 0.5);
        assert_eq!(stats.average_velocity(), 80.0);
        assert_eq!(stats.average_duration(), 0.5);

        assert_eq!(sequences.pitch, vec![60]);
        assert_eq!(sequences.velocity, vec![80]);
        assert_eq!(sequences.duration_ms, vec![500]);
    }

    #[test]
    fn zero_velocity_note_on_is_a_note_off() {
        let events = [
            note_on(0.0, 64, 100),
            note_on(0.25, 64, 0), // release
        ];
        let (notes, sequences) = aggregate_notes(&events);

        assert_eq!(notes[&64].occurrences, 1);
        assert_eq!(notes[&64].total_duration, 0.25);
        assert_eq!(sequences.pitch, vec![64]);
        assert_eq!(sequences.duration_ms, vec![250]);
    }

    #[test]
    fn sequences_grow_independently() {
        // Two overlapping notes: both ons precede both offs.
        let events = [
            note_on(0.0, 60, 80),
            note_on(0.1, 64, 90),
            note_off(0.5, 60),
            note_off(0.7, 64),
        ];
        let (_, sequences) = aggregate_notes(&events);

        assert_eq!(sequences.pitch, vec![60, 64]);
        assert_eq!(sequences.velocity, vec![80, 90]);
        assert_eq!(sequences.duration_ms, vec![500, 600]);
    }

    #[test]
    fn unmatched_note_off_measures_from_track_start() {
        let events = [note_off(1.5, 72)];
        let (notes, sequences) = aggregate_notes(&events);

        assert_eq!(notes[&72].occurrences, 0);
        assert_eq!(notes[&72].total_duration, 1.5);
        assert!(sequences.pitch.is_empty());
        assert_eq!(sequences.duration_ms, vec![1500]);
    }

    #[test]
    fn non_note_events_are_ignored() {
        let events = [
            Event::Channel(ChannelEvent {
                time: 0.0,
                kind: ChannelKind::ControlChange,
                channel: 1,
                param1: 7,
                param2: Some(100),
            }),
            note_on(0.0, 60, 80),
        ];
        let (notes, _) = aggregate_notes(&events);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[&60].occurrences, 1);
    }

    #[test]
    fn folding_preserves_totals() {
        // Same pitch class in three octaves plus one other class.
        let events = [
            note_on(0.0, 36, 10),
            note_off(0.5, 36),
            note_on(1.0, 48, 20),
            note_off(1.25, 48),
            note_on(2.0, 60, 30),
            note_off(2.75, 60),
            note_on(3.0, 67, 40),
            note_off(3.5, 67),
        ];
        let (notes, _) = aggregate_notes(&events);
        let folded = fold_octaves(&notes);

        let raw_occurrences: u32 = notes.values().map(|s| s.occurrences).sum();
        let raw_velocity: u64 = notes.values().map(|s| s.total_velocity).sum();
        let raw_duration: f64 = notes.values().map(|s| s.total_duration).sum();
        let folded_occurrences: u32 = folded.iter().map(|s| s.occurrences).sum();
        let folded_velocity: u64 = folded.iter().map(|s| s.total_velocity).sum();
        let folded_duration: f64 = folded.iter().map(|s| s.total_duration).sum();

        assert_eq!(raw_occurrences, folded_occurrences);
        assert_eq!(raw_velocity, folded_velocity);
        assert!((raw_duration - folded_duration).abs() < 1e-9);

        // 36, 48 and 60 all fold into class C.
        assert_eq!(folded[0].occurrences, 3);
        assert_eq!(folded[0].total_velocity, 60);
        assert_eq!(folded[7].occurrences, 1);
    }

    #[test]
    fn ranking_is_descending_with_stable_ties() {
        let events = [
            note_on(0.0, 67, 80), // G twice
            note_off(0.1, 67),
            note_on(0.2, 67, 80),
            note_off(0.3, 67),
            note_on(0.4, 60, 80), // C once
            note_off(0.5, 60),
            note_on(0.6, 64, 80), // E once
            note_off(0.7, 64),
        ];
        let (notes, _) = aggregate_notes(&events);
        let ranking = rank_pitch_classes(&fold_octaves(&notes));

        assert_eq!(ranking[0], PitchClass::G);
        // C and E tie on one occurrence; ascending class order wins,
        // then the nine silent classes follow in ascending order.
        assert_eq!(ranking[1], PitchClass::C);
        assert_eq!(ranking[2], PitchClass::E);
        assert_eq!(ranking[3], PitchClass::Cs);
        assert_eq!(ranking[11], PitchClass::B);
    }
}
