//! Chord banks and their Markov transition matrices.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::error::{AuraError, Result};

/// Bank definition as written in data files, before validation.
#[derive(Debug, Clone, Deserialize)]
struct RawChordBank {
    name: String,
    asset_dir: String,
    chords: Vec<String>,
    transitions: Vec<Vec<f64>>,
}

/// A named chord set with a square transition matrix.
///
/// Row `i` holds the authored weights for moving from chord `i` to every
/// chord in the bank. Rows need not sum to one and may contain zeros; both
/// are handled by [`ChordBank::smoothed_row`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChordBank")]
pub struct ChordBank {
    name: String,
    asset_dir: String,
    chords: Vec<String>,
    transitions: Vec<Vec<f64>>,
}

impl TryFrom<RawChordBank> for ChordBank {
    type Error = AuraError;

    fn try_from(raw: RawChordBank) -> Result<Self> {
        ChordBank::new(raw.name, raw.asset_dir, raw.chords, raw.transitions)
    }
}

impl ChordBank {
    /// Build and validate a bank.
    ///
    /// # Errors
    /// Returns `AuraError::InvalidBank` if the bank is empty, the matrix is
    /// not `n × n`, or any weight is negative or non-finite.
    pub fn new(
        name: impl Into<String>,
        asset_dir: impl Into<String>,
        chords: Vec<String>,
        transitions: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let bank = Self {
            name: name.into(),
            asset_dir: asset_dir.into(),
            chords,
            transitions,
        };
        bank.validate()?;
        Ok(bank)
    }

    /// Authored bank data, trusted as-is.
    fn authored(name: &str, asset_dir: &str, chords: &[&str], rows: &[&[f64]]) -> Self {
        Self {
            name: name.to_string(),
            asset_dir: asset_dir.to_string(),
            chords: chords.iter().map(ToString::to_string).collect(),
            transitions: rows.iter().map(|row| row.to_vec()).collect(),
        }
    }

    /// Check shape and weights.
    ///
    /// # Errors
    /// See [`ChordBank::new`].
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| AuraError::InvalidBank {
            bank: self.name.clone(),
            reason,
        };
        let n = self.chords.len();
        if n == 0 {
            return Err(invalid("bank has no chords".to_string()));
        }
        if self.transitions.len() != n {
            return Err(invalid(format!(
                "expected {n} transition rows, found {}",
                self.transitions.len()
            )));
        }
        for (i, row) in self.transitions.iter().enumerate() {
            if row.len() != n {
                return Err(invalid(format!("row {i} has {} entries, expected {n}", row.len())));
            }
            if let Some(w) = row.iter().find(|w| !w.is_finite() || **w < 0.0) {
                return Err(invalid(format!("row {i} contains invalid weight {w}")));
            }
        }
        Ok(())
    }

    /// Bank name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of chords.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chords.len()
    }

    /// Always false for a validated bank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    /// Chord names in matrix order.
    #[must_use]
    pub fn chords(&self) -> &[String] {
        &self.chords
    }

    /// Chord name at `index`, wrapped into range.
    #[must_use]
    pub fn chord(&self, index: usize) -> &str {
        &self.chords[self.wrap(index)]
    }

    /// Audio asset path for the chord at `index`, wrapped into range.
    #[must_use]
    pub fn asset(&self, index: usize) -> String {
        format!("{}/{}.mp3", self.asset_dir, self.chord(index))
    }

    /// `index mod len`; every matrix lookup goes through this.
    #[must_use]
    pub fn wrap(&self, index: usize) -> usize {
        index % self.chords.len().max(1)
    }

    /// Transition row for `index` with `epsilon` added to every entry and
    /// renormalized to sum to one.
    ///
    /// With `epsilon > 0` every entry is strictly positive, so no chord is
    /// ever unreachable.
    #[must_use]
    pub fn smoothed_row(&self, index: usize, epsilon: f64) -> Vec<f64> {
        let row = &self.transitions[self.wrap(index)];
        let shifted: Vec<f64> = row.iter().map(|w| w + epsilon).collect();
        let sum: f64 = shifted.iter().sum();
        if sum > 0.0 {
            shifted.iter().map(|w| w / sum).collect()
        } else {
            let uniform = 1.0 / row.len() as f64;
            vec![uniform; row.len()]
        }
    }

    /// Sample the successor of `current` from the smoothed row.
    pub fn next_index<R: Rng + ?Sized>(&self, current: usize, epsilon: f64, rng: &mut R) -> usize {
        let row = self.smoothed_row(current, epsilon);
        match WeightedIndex::new(&row) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..self.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Bank families
// ---------------------------------------------------------------------------

/// The four banks the engine draws from.
///
/// Calm moods use `calm` with `calm_low` as the alternate; approach and
/// combat both use `tension` with `tension_turbo` as the alternate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordBankSet {
    /// Primary calm bank.
    pub calm: ChordBank,
    /// Alternate calm bank.
    pub calm_low: ChordBank,
    /// Primary tension bank.
    pub tension: ChordBank,
    /// Alternate tension bank.
    pub tension_turbo: ChordBank,
}

impl ChordBankSet {
    /// Parse a bank set from TOML (`[calm]`, `[calm_low]`, `[tension]`,
    /// `[tension_turbo]` tables).
    ///
    /// # Errors
    /// Returns `AuraError::Config` on malformed TOML or an invalid bank.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| AuraError::Config(e.to_string()))
    }
}

impl Default for ChordBankSet {
    fn default() -> Self {
        Self {
            calm: calm_bank(),
            calm_low: calm_low_bank(),
            tension: tension_bank(),
            tension_turbo: tension_turbo_bank(),
        }
    }
}

fn calm_bank() -> ChordBank {
    ChordBank::authored(
        "calm",
        "test2",
        &["C Major", "Dm7", "G7", "Cmaj7", "Am", "Dm", "G Major", "F Major"],
        &[
            &[0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.5, 0.0],
            &[0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            &[0.5, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0],
            &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            &[0.0, 0.0, 0.5, 0.0, 0.5, 0.0, 0.0, 0.0],
            &[0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5],
            &[0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.5, 0.0],
        ],
    )
}

fn calm_low_bank() -> ChordBank {
    ChordBank::authored(
        "calm_low",
        "test3",
        &["C", "F", "G", "Am", "Dm", "Em", "A"],
        &[
            &[0.0, 0.3, 0.3, 0.1, 0.1, 0.1, 0.1],
            &[0.5, 0.0, 0.4, 0.1, 0.0, 0.0, 0.0],
            &[0.3, 0.0, 0.0, 0.2, 0.2, 0.0, 0.3],
            &[0.3, 0.1, 0.3, 0.0, 0.3, 0.0, 0.0],
            &[0.3, 0.0, 0.7, 0.0, 0.0, 0.0, 0.0],
            &[0.3, 0.3, 0.4, 0.0, 0.0, 0.0, 0.0],
            &[0.3, 0.3, 0.4, 0.0, 0.0, 0.0, 0.0],
        ],
    )
}

fn tension_bank() -> ChordBank {
    ChordBank::authored(
        "tension",
        "test2",
        &["G Major", "C Major", "Am", "F Major", "E Major", "Dm7", "G7", "Cmaj7", "A7"],
        &[
            &[0.0, 0.5, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.5, 0.0, 0.0],
            &[0.25, 0.0, 0.0, 0.5, 0.0, 0.25, 0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.5, 0.0, 0.0],
            &[0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.5, 0.0],
            &[0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0],
            &[0.5, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0],
            &[0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0],
            &[0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0],
        ],
    )
}

fn tension_turbo_bank() -> ChordBank {
    ChordBank::authored(
        "tension_turbo",
        "test3",
        &["Am", "G", "F", "C", "E", "Bb", "Ab", "Cm", "Dm"],
        &[
            &[0.1, 0.3, 0.2, 0.1, 0.1, 0.0, 0.0, 0.0, 0.2],
            &[0.2, 0.1, 0.2, 0.3, 0.0, 0.0, 0.0, 0.1, 0.1],
            &[0.2, 0.2, 0.0, 0.3, 0.0, 0.1, 0.0, 0.0, 0.2],
            &[0.0, 0.3, 0.3, 0.1, 0.0, 0.2, 0.0, 0.1, 0.0],
            &[0.5, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.0],
            &[0.5, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0],
            &[0.0, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ],
    )
}
