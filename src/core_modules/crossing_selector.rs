// THEORY:
// The crossing selector picks the handful of cloudy crossings that get a
// high-resolution follow-up capture. It wants the strongest cloud signal first and
// geographic spread second, so that the captures do not all land on the same cloud
// mass.
//
// Algorithm (greedy, deterministic):
// 1.  Sort candidates by probability, highest first; ties go to the lower index.
// 2.  The top candidate is always taken and becomes the primary.
// 3.  Until the budget is spent or candidates run out, scan the remaining ones in
//     rank order and take the first that is at least `min_distance` from every
//     pick. If none is, retry at `min_distance / 2`. If still none, take the
//     highest-ranked remaining candidate unconditionally.
//
// It is a relaxation-based packing, not an optimum. Every pick records which level
// of the spread constraint it satisfied, so callers (and tests) can tell a
// properly spread pick from a forced one.

use crate::core_modules::point_evaluator::Verdict;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Which spread constraint a pick satisfied when it was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadLevel {
    /// The first pick, or a pick at least `min_distance` from every earlier pick.
    Full,
    /// At least `min_distance / 2` from every earlier pick.
    Relaxed,
    /// Taken unconditionally; the spread constraint was abandoned.
    Forced,
}

/// One chosen crossing.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedCrossing {
    pub verdict: Verdict,
    pub is_primary: bool,
    pub spread: SpreadLevel,
}

/// The ordered picks of one run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub crossings: Vec<SelectedCrossing>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.crossings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crossings.is_empty()
    }

    pub fn primary(&self) -> Option<&SelectedCrossing> {
        self.crossings.iter().find(|c| c.is_primary)
    }

    /// True when every pick satisfied the full distance constraint.
    pub fn is_fully_spread(&self) -> bool {
        self.crossings.iter().all(|c| c.spread == SpreadLevel::Full)
    }
}

/// Greedy, spread-aware selection limits.
#[derive(Debug, Clone, Copy)]
pub struct CrossingSelector {
    pub max_crossings: usize,
    pub min_distance: f32,
}

fn by_rank(a: &Verdict, b: &Verdict) -> Ordering {
    b.probability
        .total_cmp(&a.probability)
        .then_with(|| a.index.cmp(&b.index))
}

impl CrossingSelector {
    pub fn new(max_crossings: usize, min_distance: f32) -> Self {
        Self {
            max_crossings,
            min_distance,
        }
    }

    fn is_spread(candidate: &Verdict, picked: &[SelectedCrossing], distance: f32) -> bool {
        picked
            .iter()
            .all(|s| candidate.point.distance(&s.verdict.point) >= distance)
    }

    /// Selects from the cloudy verdicts only; clear verdicts are ignored.
    pub fn select(&self, verdicts: &[Verdict]) -> Selection {
        let mut remaining: Vec<Verdict> = verdicts.iter().filter(|v| v.is_cloud).cloned().collect();
        remaining.sort_by(by_rank);

        let mut picked: Vec<SelectedCrossing> = Vec::with_capacity(self.max_crossings.min(remaining.len()));
        if self.max_crossings == 0 || remaining.is_empty() {
            return Selection { crossings: picked };
        }

        let top = remaining.remove(0);
        debug!("Primary crossing {} (p={:.3})", top.index, top.probability);
        picked.push(SelectedCrossing {
            verdict: top,
            is_primary: true,
            spread: SpreadLevel::Full,
        });

        while picked.len() < self.max_crossings && !remaining.is_empty() {
            let full = remaining
                .iter()
                .position(|c| Self::is_spread(c, &picked, self.min_distance));
            let (position, spread) = match full {
                Some(i) => (i, SpreadLevel::Full),
                None => match remaining
                    .iter()
                    .position(|c| Self::is_spread(c, &picked, self.min_distance / 2.0))
                {
                    Some(i) => (i, SpreadLevel::Relaxed),
                    None => (0, SpreadLevel::Forced),
                },
            };

            let verdict = remaining.remove(position);
            match spread {
                SpreadLevel::Full => debug!("Picked crossing {} (p={:.3})", verdict.index, verdict.probability),
                SpreadLevel::Relaxed => debug!(
                    "Picked crossing {} (p={:.3}) at relaxed distance {:.1}",
                    verdict.index,
                    verdict.probability,
                    self.min_distance / 2.0
                ),
                SpreadLevel::Forced => warn!(
                    "No crossing left at {:.1}px spread; forcing crossing {} (p={:.3})",
                    self.min_distance / 2.0,
                    verdict.index,
                    verdict.probability
                ),
            }
            picked.push(SelectedCrossing {
                verdict,
                is_primary: false,
                spread,
            });
        }

        Selection { crossings: picked }
    }
}
