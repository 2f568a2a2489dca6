//! Common random number streams.
//!
//! Every stochastic decision in a simulation draws from a named stream. A
//! stream does not own generator state; each call builds a key from the
//! stream name, the current simulation date, an optional additional key and
//! the seed, hashes it, and addresses a draw by the simulant's row number.
//! Two simulations with the same seed therefore give each simulant identical
//! draws at every decision point, no matter which components run, in what
//! order, or over which subsets - the common random number property that
//! lets counterfactual scenarios be compared without sampling noise.
//!
//! Components get streams from the builder during setup:
//!
//! ```ignore
//! fn setup(&mut self, builder: &mut Builder) -> Result<()> {
//!     self.stream = Some(builder.get_stream("healthcare_access")?);
//!     Ok(())
//! }
//! ```

use chrono::NaiveDate;
use indexmap::IndexSet;

use ceam_foundation::{draw_f64, fnv1a64_str, normal_from_draws, StreamId};

use crate::config::ConfigTree;
use crate::error::{Error, Result};
use crate::population::SimulantIndex;

/// A probability placeholder that absorbs leftover weight so a row of choice
/// weights sums to one: `[0.2, 0.2, Residual]` means `[0.2, 0.2, 0.6]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChoiceWeight {
    /// An explicit relative weight.
    Weight(f64),
    /// The residual probability for the row.
    Residual,
}

/// Weights for a [`RandomnessStream::choice`] call.
#[derive(Debug, Clone)]
pub enum ChoiceWeights {
    /// One weight per choice, shared by every simulant.
    Broadcast(Vec<ChoiceWeight>),
    /// One row of weights per simulant in the index.
    PerSimulant(Vec<Vec<ChoiceWeight>>),
}

/// Convert an event rate into the probability the event occurs at least
/// once over the period the rate is scaled to.
pub fn rate_to_probability(rate: f64) -> f64 {
    1.0 - (-rate).exp()
}

/// A handle for producing common random numbers.
///
/// Cheap to clone; carries no generator state. Obtained from
/// [`RandomnessManager::get_stream`] during setup.
#[derive(Debug, Clone)]
pub struct RandomnessStream {
    key: StreamId,
    seed: u64,
}

impl RandomnessStream {
    /// The stream's name.
    pub fn key(&self) -> &StreamId {
        &self.key
    }

    /// Uniform draws in [0, 1), one per simulant in the index.
    ///
    /// The draw for a simulant depends only on the stream key, the date, the
    /// additional key, the seed and the simulant's row - not on which other
    /// simulants are in the index.
    pub fn get_draw(
        &self,
        index: &SimulantIndex,
        additional_key: Option<&str>,
        time: NaiveDate,
    ) -> Vec<f64> {
        let seed = self.decision_seed(additional_key, time);
        index.iter().map(|row| draw_f64(seed, row as u64)).collect()
    }

    /// Standard normal draws, one per simulant in the index.
    ///
    /// Same addressing as [`RandomnessStream::get_draw`]; the normal and
    /// uniform draws for one decision point do not collide.
    pub fn normal_draws(
        &self,
        index: &SimulantIndex,
        additional_key: Option<&str>,
        time: NaiveDate,
    ) -> Vec<f64> {
        let seed = self.decision_seed(additional_key, time);
        index
            .iter()
            .map(|row| normal_from_draws(seed, row as u64))
            .collect()
    }

    /// The sub-population for which an event with the given probabilities
    /// occurred.
    ///
    /// `probabilities` aligns with the index. An empty index yields an empty
    /// index.
    pub fn filter_for_probability(
        &self,
        index: &SimulantIndex,
        probabilities: &[f64],
        additional_key: Option<&str>,
        time: NaiveDate,
    ) -> Result<SimulantIndex> {
        if index.is_empty() {
            return Ok(SimulantIndex::default());
        }
        if probabilities.len() != index.len() {
            return Err(Error::Randomness(format!(
                "stream '{}': {} probabilities for an index of {}",
                self.key,
                probabilities.len(),
                index.len()
            )));
        }
        let draws = self.get_draw(index, additional_key, time);
        Ok(index
            .iter()
            .zip(draws.iter().zip(probabilities))
            .filter(|(_, (draw, p))| **draw < **p)
            .map(|(row, _)| row)
            .collect())
    }

    /// The sub-population for which an event with the given rates occurred.
    ///
    /// Rates must already be scaled to the time-step size.
    pub fn filter_for_rate(
        &self,
        index: &SimulantIndex,
        rates: &[f64],
        additional_key: Option<&str>,
        time: NaiveDate,
    ) -> Result<SimulantIndex> {
        let probabilities: Vec<f64> = rates.iter().copied().map(rate_to_probability).collect();
        self.filter_for_probability(index, &probabilities, additional_key, time)
    }

    /// A weighted (or uniform, when `weights` is `None`) decision among
    /// `choices` for every simulant in the index.
    pub fn choice<T: Clone>(
        &self,
        index: &SimulantIndex,
        choices: &[T],
        weights: Option<&ChoiceWeights>,
        additional_key: Option<&str>,
        time: NaiveDate,
    ) -> Result<Vec<T>> {
        if choices.is_empty() {
            return Err(Error::Randomness(format!(
                "stream '{}': choice requires at least one option",
                self.key
            )));
        }

        let draws = self.get_draw(index, additional_key, time);
        let mut out = Vec::with_capacity(index.len());
        for (position, draw) in draws.into_iter().enumerate() {
            let row_weights = match weights {
                None => normalized_uniform(choices.len()),
                Some(ChoiceWeights::Broadcast(w)) => self.normalize_row(w, choices.len())?,
                Some(ChoiceWeights::PerSimulant(rows)) => {
                    let row = rows.get(position).ok_or_else(|| {
                        Error::Randomness(format!(
                            "stream '{}': {} weight rows for an index of {}",
                            self.key,
                            rows.len(),
                            index.len()
                        ))
                    })?;
                    self.normalize_row(row, choices.len())?
                }
            };

            // Walk the cumulative distribution.
            let mut cumulative = 0.0;
            let mut selected = choices.len() - 1;
            for (i, p) in row_weights.iter().enumerate() {
                cumulative += p;
                if draw < cumulative {
                    selected = i;
                    break;
                }
            }
            out.push(choices[selected].clone());
        }
        Ok(out)
    }

    /// Normalize one row of weights, resolving a residual placeholder.
    fn normalize_row(&self, weights: &[ChoiceWeight], n_choices: usize) -> Result<Vec<f64>> {
        if weights.len() != n_choices {
            return Err(Error::Randomness(format!(
                "stream '{}': {} weights for {} choices",
                self.key,
                weights.len(),
                n_choices
            )));
        }

        let residuals = weights
            .iter()
            .filter(|w| matches!(w, ChoiceWeight::Residual))
            .count();
        if residuals > 1 {
            return Err(Error::Randomness(format!(
                "stream '{}': more than one residual choice supplied for a single set of weights",
                self.key
            )));
        }

        let explicit_sum: f64 = weights
            .iter()
            .filter_map(|w| match w {
                ChoiceWeight::Weight(v) => Some(*v),
                ChoiceWeight::Residual => None,
            })
            .sum();

        let mut resolved: Vec<f64> = Vec::with_capacity(weights.len());
        if residuals == 1 {
            let residual = 1.0 - explicit_sum;
            if residual < 0.0 {
                return Err(Error::Randomness(format!(
                    "stream '{}': residual choice supplied with weights that summed to more than 1",
                    self.key
                )));
            }
            for w in weights {
                resolved.push(match w {
                    ChoiceWeight::Weight(v) => *v,
                    ChoiceWeight::Residual => residual,
                });
            }
        } else {
            if explicit_sum <= 0.0 {
                return Err(Error::Randomness(format!(
                    "stream '{}': choice weights must have positive sum",
                    self.key
                )));
            }
            for w in weights {
                let ChoiceWeight::Weight(v) = w else { unreachable!() };
                resolved.push(*v / explicit_sum);
            }
            return Ok(resolved);
        }
        Ok(resolved)
    }

    /// Hashable key for one decision point, combining stream identity,
    /// simulation time, the caller's additional key and the seed.
    fn decision_seed(&self, additional_key: Option<&str>, time: NaiveDate) -> u64 {
        let additional = additional_key.unwrap_or("None");
        fnv1a64_str(&format!("{}_{}_{}_{}", self.key, time, additional, self.seed))
    }
}

fn normalized_uniform(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Owns the seed and hands out randomness streams.
#[derive(Debug)]
pub struct RandomnessManager {
    seed: u64,
    base_seed: u64,
    input_draw: u64,
    streams: IndexSet<StreamId>,
}

impl RandomnessManager {
    /// Build from `randomness.seed` and `randomness.input_draw` in the
    /// configuration. The effective seed combines both so that every draw
    /// of a multi-draw run explores an independent stream space.
    pub fn from_config(config: &ConfigTree) -> Result<Self> {
        let seed = config.get_u64("randomness.seed")?;
        let input_draw = if config.contains("randomness.input_draw") {
            config.get_u64("randomness.input_draw")?
        } else {
            0
        };
        Ok(Self {
            seed: seed.wrapping_add(input_draw),
            base_seed: seed,
            input_draw,
            streams: IndexSet::new(),
        })
    }

    /// The effective seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The configured seed, before the draw number is folded in. Reported
    /// alongside results.
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// The configured input draw number, reported alongside results.
    pub fn input_draw(&self) -> u64 {
        self.input_draw
    }

    /// Get (or re-get) the stream with the given key.
    ///
    /// Streams are identified by key; asking twice returns an equivalent
    /// handle.
    pub fn get_stream(&mut self, key: impl Into<StreamId>) -> RandomnessStream {
        let key = key.into();
        self.streams.insert(key.clone());
        RandomnessStream {
            key,
            seed: self.seed,
        }
    }

    /// Keys of all streams handed out so far.
    pub fn stream_keys(&self) -> impl Iterator<Item = &StreamId> {
        self.streams.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stream(key: &str, seed: u64) -> RandomnessStream {
        RandomnessStream {
            key: StreamId::from(key),
            seed,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_draws_identical_across_subsets() {
        let s = stream("ihd_incidence", 0);
        let t = date("2005-01-01");
        let full = SimulantIndex::from_range(0..100);
        let subset = SimulantIndex::new(vec![3, 41, 97]);

        let full_draws = s.get_draw(&full, None, t);
        let subset_draws = s.get_draw(&subset, None, t);

        assert_eq!(subset_draws[0], full_draws[3]);
        assert_eq!(subset_draws[1], full_draws[41]);
        assert_eq!(subset_draws[2], full_draws[97]);
    }

    #[test]
    fn test_draws_stable_under_population_growth() {
        use crate::population::PopulationTable;

        let s = stream("ihd_incidence", 0);
        let t = date("2005-01-01");
        let mut table = PopulationTable::new();
        table.grow(50);
        let before = s.get_draw(&table.full_index(), None, t);

        // Rows are never removed or reordered, so growth cannot shift the
        // draw index of an existing simulant.
        table.grow(50);
        let after = s.get_draw(&table.full_index(), None, t);
        assert_eq!(after.len(), 100);
        assert_eq!(&before[..], &after[..50]);
    }

    #[test]
    fn test_normal_draws_identical_across_subsets() {
        let s = stream("blood_pressure", 0);
        let t = date("2005-01-01");
        let full = SimulantIndex::from_range(0..100);
        let subset = SimulantIndex::new(vec![7, 64]);

        let full_draws = s.normal_draws(&full, Some("initial_sbp"), t);
        let subset_draws = s.normal_draws(&subset, Some("initial_sbp"), t);
        assert_eq!(subset_draws[0], full_draws[7]);
        assert_eq!(subset_draws[1], full_draws[64]);
        // Normal and uniform draws at one decision point are independent.
        assert_ne!(full_draws[7], s.get_draw(&subset, Some("initial_sbp"), t)[0]);
    }

    #[test]
    fn test_draws_vary_with_time_key_and_seed() {
        let index = SimulantIndex::from_range(0..10);
        let s = stream("ihd_incidence", 0);
        let base = s.get_draw(&index, None, date("2005-01-01"));

        assert_ne!(base, s.get_draw(&index, None, date("2005-01-31")));
        assert_ne!(base, s.get_draw(&index, Some("followup"), date("2005-01-01")));
        assert_ne!(
            base,
            stream("ihd_incidence", 1).get_draw(&index, None, date("2005-01-01"))
        );
        // Same everything → same draws.
        assert_eq!(base, s.get_draw(&index, None, date("2005-01-01")));
    }

    #[test]
    fn test_filter_for_probability_extremes() {
        let s = stream("mortality", 0);
        let t = date("2005-01-01");
        let index = SimulantIndex::from_range(0..50);

        let none = s
            .filter_for_probability(&index, &vec![0.0; 50], None, t)
            .unwrap();
        assert!(none.is_empty());

        let everyone = s
            .filter_for_probability(&index, &vec![1.0; 50], None, t)
            .unwrap();
        assert_eq!(everyone, index);

        let empty = s
            .filter_for_probability(&SimulantIndex::default(), &[], None, t)
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_filter_for_probability_length_mismatch() {
        let s = stream("mortality", 0);
        let index = SimulantIndex::from_range(0..10);
        let err = s
            .filter_for_probability(&index, &[0.5; 3], None, date("2005-01-01"))
            .unwrap_err();
        assert!(matches!(err, Error::Randomness(_)));
    }

    #[test]
    fn test_filter_for_rate_matches_probability_transform() {
        let s = stream("mortality", 0);
        let t = date("2005-01-01");
        let index = SimulantIndex::from_range(0..200);
        let rates = vec![0.35; 200];
        let probabilities: Vec<f64> = rates.iter().copied().map(rate_to_probability).collect();

        let by_rate = s.filter_for_rate(&index, &rates, None, t).unwrap();
        let by_prob = s
            .filter_for_probability(&index, &probabilities, None, t)
            .unwrap();
        assert_eq!(by_rate, by_prob);
    }

    #[test]
    fn test_choice_residual_weight() {
        let s = stream("medication", 0);
        let t = date("2005-01-01");
        let index = SimulantIndex::from_range(0..10_000);
        let weights = ChoiceWeights::Broadcast(vec![
            ChoiceWeight::Weight(0.2),
            ChoiceWeight::Weight(0.2),
            ChoiceWeight::Residual,
        ]);

        let picks = s
            .choice(&index, &["a", "b", "c"], Some(&weights), None, t)
            .unwrap();
        let c_share =
            picks.iter().filter(|p| **p == "c").count() as f64 / index.len() as f64;
        // Residual absorbs 0.6 of the probability mass.
        assert!((c_share - 0.6).abs() < 0.03, "residual share {c_share}");
    }

    #[test]
    fn test_choice_residual_misuse() {
        let s = stream("medication", 0);
        let t = date("2005-01-01");
        let index = SimulantIndex::from_range(0..5);

        let two_residuals = ChoiceWeights::Broadcast(vec![
            ChoiceWeight::Residual,
            ChoiceWeight::Residual,
        ]);
        assert!(s
            .choice(&index, &["a", "b"], Some(&two_residuals), None, t)
            .is_err());

        let overweight = ChoiceWeights::Broadcast(vec![
            ChoiceWeight::Weight(0.9),
            ChoiceWeight::Weight(0.9),
            ChoiceWeight::Residual,
        ]);
        assert!(s
            .choice(&index, &["a", "b", "c"], Some(&overweight), None, t)
            .is_err());
    }

    #[test]
    fn test_choice_per_simulant_rows() {
        let s = stream("assignment", 0);
        let t = date("2005-01-01");
        let index = SimulantIndex::from_range(0..2);
        // First simulant can only get "a", second only "b".
        let weights = ChoiceWeights::PerSimulant(vec![
            vec![ChoiceWeight::Weight(1.0), ChoiceWeight::Weight(0.0)],
            vec![ChoiceWeight::Weight(0.0), ChoiceWeight::Weight(1.0)],
        ]);
        let picks = s
            .choice(&index, &["a", "b"], Some(&weights), None, t)
            .unwrap();
        assert_eq!(picks, vec!["a", "b"]);
    }

    #[test]
    fn test_rate_to_probability_bounds() {
        assert_eq!(rate_to_probability(0.0), 0.0);
        assert!(rate_to_probability(100.0) <= 1.0);
        assert!((rate_to_probability(0.01) - 0.00995).abs() < 1e-4);
    }
}
