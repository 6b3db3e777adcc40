use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Ordinal quality tier. Ordering is ascending, so `Tier::S` compares
/// greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    D,
    C,
    B,
    A,
    S,
}

impl Tier {
    pub fn from_overall(overall: u8) -> Self {
        match overall {
            90.. => Tier::S,
            80..=89 => Tier::A,
            65..=79 => Tier::B,
            50..=64 => Tier::C,
            _ => Tier::D,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::S => "S",
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
            Tier::D => "D",
        }
    }
}

/// Battle scenarios a track is rated as suited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Opener,
    BassDuel,
    ClarityDuel,
    CrowdHype,
    Finisher,
}

/// Per-track heuristic scores, computed once by the external scorer and
/// cached here. All metric fields are 0–100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRating {
    pub bass_impact: u8,
    pub clarity: u8,
    pub energy: u8,
    pub drop_potential: u8,
    pub crowd_appeal: u8,
    pub overall: u8,
    pub tier: Tier,
    #[serde(default)]
    pub best_for: Vec<Scenario>,
}

impl SongRating {
    /// Convenience constructor that derives the tier from the overall score.
    pub fn scored(
        bass_impact: u8,
        clarity: u8,
        energy: u8,
        drop_potential: u8,
        crowd_appeal: u8,
        overall: u8,
    ) -> Self {
        Self {
            bass_impact,
            clarity,
            energy,
            drop_potential,
            crowd_appeal,
            overall,
            tier: Tier::from_overall(overall),
            best_for: Vec::new(),
        }
    }

    pub fn with_best_for(mut self, scenarios: Vec<Scenario>) -> Self {
        self.best_for = scenarios;
        self
    }
}

/// Lookup table of cached per-track ratings. The decision engine only ever
/// reads it; re-scoring a track is an insert by the external scorer.
#[derive(Debug, Default, Clone)]
pub struct SongRatingIndex {
    ratings: HashMap<String, SongRating>,
}

impl SongRatingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an index from the JSON map the external scorer emits:
    /// `{"track-id": {"bass_impact": 90, ...}, ...}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let ratings: HashMap<String, SongRating> = serde_json::from_str(json)?;
        Ok(Self { ratings })
    }

    pub fn insert(&mut self, track_id: impl Into<String>, rating: SongRating) {
        self.ratings.insert(track_id.into(), rating);
    }

    pub fn get(&self, track_id: &str) -> Option<&SongRating> {
        self.ratings.get(track_id)
    }

    pub fn track_ids(&self) -> impl Iterator<Item = &str> {
        self.ratings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// The track maximising `metric` among those with at least `min_overall`.
    /// Ties break on the higher overall score, then on track id so the choice
    /// is deterministic.
    pub fn best_by(
        &self,
        min_overall: u8,
        metric: impl Fn(&SongRating) -> u8,
    ) -> Option<(&str, &SongRating)> {
        self.ratings
            .iter()
            .filter(|(_, rating)| rating.overall >= min_overall)
            .max_by(|(id_a, a), (id_b, b)| {
                metric(a)
                    .cmp(&metric(b))
                    .then(a.overall.cmp(&b.overall))
                    .then(id_b.cmp(id_a))
            })
            .map(|(id, rating)| (id.as_str(), rating))
    }

    /// The highest-rated track overall.
    pub fn best_overall(&self) -> Option<(&str, &SongRating)> {
        self.best_by(0, |rating| rating.overall)
    }
}
