//! Tonality detection
//!
//! Scores every (root, scale template) pair against an octave-folded
//! aggregate and picks the best-matching key. Scoring combines scale
//! coverage (how much of the track's occurrence and duration mass
//! falls on scale degrees) with a functional weighting that favors the
//! tonic, dominant, subdominant, and supertonic.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::analyzer::NoteStats;

const SEMITONES: usize = 12;

/// Functional-harmony weights applied to the occurrence counts of the
/// tonic, dominant, subdominant, and supertonic degrees.
const TONIC_WEIGHT: f64 = 0.50;
const DOMINANT_WEIGHT: f64 = 0.25;
const SUBDOMINANT_WEIGHT: f64 = 0.15;
const SUPERTONIC_WEIGHT: f64 = 0.10;

/// The twelve chromatic pitch classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    /// C
    C,
    /// C sharp / D flat
    Cs,
    /// D
    D,
    /// D sharp / E flat
    Ds,
    /// E
    E,
    /// F
    F,
    /// F sharp / G flat
    Fs,
    /// G
    G,
    /// G sharp / A flat
    Gs,
    /// A
    A,
    /// A sharp / B flat
    As,
    /// B
    B,
}

impl PitchClass {
    /// Map an index to a pitch class, folding octaves with modulo 12.
    pub const fn from_index(index: usize) -> PitchClass {
        match index % SEMITONES {
            0 => PitchClass::C,
            1 => PitchClass::Cs,
            2 => PitchClass::D,
            3 => PitchClass::Ds,
            4 => PitchClass::E,
            5 => PitchClass::F,
            6 => PitchClass::Fs,
            7 => PitchClass::G,
            8 => PitchClass::Gs,
            9 => PitchClass::A,
            10 => PitchClass::As,
            _ => PitchClass::B,
        }
    }

    /// Chromatic index of this pitch class, 0..=11.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The pitch class of a raw MIDI note number.
    pub const fn of(pitch: u8) -> PitchClass {
        PitchClass::from_index(pitch as usize)
    }

    /// Note name with enharmonic spelling, e.g. `"C#/Db"`.
    pub const fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#/Db",
            PitchClass::D => "D",
            PitchClass::Ds => "D#/Eb",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#/Gb",
            PitchClass::G => "G",
            PitchClass::Gs => "G#/Ab",
            PitchClass::A => "A",
            PitchClass::As => "A#/Bb",
            PitchClass::B => "B",
        }
    }

    /// Spell a raw MIDI note with its octave number, e.g. `"C5"` for
    /// middle C (60).
    pub fn spell(pitch: u8) -> String {
        format!("{}{}", PitchClass::of(pitch).name(), pitch / 12)
    }
}

impl Display for PitchClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The four scale templates a key candidate is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScaleType {
    /// Major scale.
    Major,
    /// Natural minor scale.
    NaturalMinor,
    /// Harmonic minor scale.
    HarmonicMinor,
    /// Melodic minor scale (ascending form).
    MelodicMinor,
}

/// Candidate evaluation order. Scoring uses strict `>` comparison, so
/// this order decides ties: for each root, templates are tried in the
/// order listed here.
pub const SCALE_TYPES: [ScaleType; 4] = [
    ScaleType::Major,
    ScaleType::NaturalMinor,
    ScaleType::HarmonicMinor,
    ScaleType::MelodicMinor,
];

impl ScaleType {
    /// Semitone steps of the seven scale degrees above the root.
    pub const fn intervals(self) -> [u8; 7] {
        match self {
            ScaleType::Major => [0, 2, 4, 5, 7, 9, 11],
            ScaleType::NaturalMinor => [0, 2, 3, 5, 7, 8, 10],
            ScaleType::HarmonicMinor => [0, 2, 3, 5, 7, 8, 11],
            ScaleType::MelodicMinor => [0, 2, 3, 5, 7, 9, 11],
        }
    }
}

impl Display for ScaleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Best-matching key for one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TonalityResult {
    /// Root pitch class of the detected key.
    pub root: PitchClass,
    /// Scale template that matched best.
    pub scale: ScaleType,
    /// Minimal-magnitude semitone shift that brings the root to C.
    pub transpose_semitones: i8,
    /// Match score; higher is better. Comparable only within one
    /// detection run.
    pub score: f64,
}

/// Score all 12 roots against all four scale templates and return the
/// best match.
///
/// Returns `None` when the folded aggregate carries no occurrence or
/// no duration mass (a silent or empty track), rather than producing
/// an undefined score.
pub fn detect_key(folded: &[NoteStats; SEMITONES]) -> Option<TonalityResult> {
    let total_occurrence: u32 = folded.iter().map(|s| s.occurrences).sum();
    let total_duration: f64 = folded.iter().map(|s| s.total_duration).sum();
    if total_occurrence == 0 || total_duration <= 0.0 {
        return None;
    }
    let total_occurrence = f64::from(total_occurrence);

    let mut best: Option<TonalityResult> = None;
    let mut best_score = -1.0f64;

    for root in 0..SEMITONES {
        for scale in SCALE_TYPES {
            let degrees = scale
                .intervals()
                .map(|step| (root + usize::from(step)) % SEMITONES);

            let occurrence_at = |degree: usize| f64::from(folded[degrees[degree]].occurrences);
            let weighted_rank = (occurrence_at(0) * TONIC_WEIGHT
                + occurrence_at(4) * DOMINANT_WEIGHT
                + occurrence_at(3) * SUBDOMINANT_WEIGHT
                + occurrence_at(1) * SUPERTONIC_WEIGHT)
                / total_occurrence;

            let occurrence_coverage = degrees
                .iter()
                .map(|&class| f64::from(folded[class].occurrences))
                .sum::<f64>()
                / total_occurrence;
            let duration_coverage = degrees
                .iter()
                .map(|&class| folded[class].total_duration)
                .sum::<f64>()
                / total_duration;
            let coverage = occurrence_coverage + duration_coverage / 2.0;

            let score = coverage * weighted_rank;
            if score > best_score {
                best_score = score;
                best = Some(TonalityResult {
                    root: PitchClass::from_index(root),
                    scale,
                    transpose_semitones: transpose_to_c(root),
                    score,
                });
            }
        }
    }

    best
}

/// Minimal-magnitude shift that moves `root` to pitch class 0.
const fn transpose_to_c(root: usize) -> i8 {
    if root > 6 {
        (SEMITONES - root) as i8
    } else {
        -(root as i8)
    }
}
