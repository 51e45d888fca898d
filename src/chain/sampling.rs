//! Weighted and uniform draws used by generation.

use crate::brain::Transition;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution as _;
use rand::Rng;

/// Draw one transition with probability proportional to its count.
///
/// `None` for an empty slice or when no transition carries positive weight.
pub fn sample_transition<'a, R: Rng>(
    rng: &mut R,
    transitions: &'a [Transition],
) -> Option<&'a Transition> {
    let weights = transitions
        .iter()
        .map(|transition| transition.count.max(0) as u64);
    let index = WeightedIndex::new(weights).ok()?;
    transitions.get(index.sample(rng))
}

/// Split `max_words` into a reverse-prefix budget and a forward budget.
///
/// The prefix share is the minimum of three uniform draws, which skews babble
/// toward short lead-ins and long continuations.
pub fn split_budget<R: Rng>(rng: &mut R, max_words: usize) -> (usize, usize) {
    let share = (0..3)
        .map(|_| rng.random::<f64>())
        .fold(1.0_f64, f64::min);
    let before = ((share * max_words as f64) as usize).min(max_words);
    (before, max_words - before)
}
