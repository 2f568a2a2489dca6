//! Standard results observers.

use ceam_foundation::{ColumnId, ComponentId, StratificationId};
use ceam_framework::{
    Aggregator, Builder, CompareOp, Component, Observation, Predicate, Result, ScalarValue,
    Stratification, ALIVE_COLUMN, SIMULATION_END,
};

use crate::demographics::SEX_COLUMN;

/// Records final death counts and population size, stratified by sex.
#[derive(Debug, Default)]
pub struct DeathObserver;

impl DeathObserver {
    /// Create the observer.
    pub fn new() -> Self {
        Self
    }
}

impl Component for DeathObserver {
    fn name(&self) -> ComponentId {
        ComponentId::from("death_observer")
    }

    fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
        builder.add_stratification(Stratification {
            name: StratificationId::from(SEX_COLUMN),
            sources: vec![ColumnId::from(SEX_COLUMN)],
            categories: vec!["Male".to_string(), "Female".to_string()],
            mapper: Box::new(|table, row| {
                Ok(table.strs(&ColumnId::from(SEX_COLUMN))?[row].clone())
            }),
        })?;

        // Gathered once, when the simulation ends; gathering these on every
        // step would recount the same dead simulants.
        builder.register_observation(
            Observation::new("dead_count", Aggregator::Count)
                .with_filter(Predicate::single(
                    ALIVE_COLUMN,
                    CompareOp::Eq,
                    ScalarValue::Bool(false),
                ))
                .on(SIMULATION_END)
                .stratified_by([StratificationId::from(SEX_COLUMN)]),
        )?;
        builder.register_observation(
            Observation::new("final_population", Aggregator::Count).on(SIMULATION_END),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demographics::Demographics;
    use ceam_foundation::MeasureId;
    use ceam_framework::{run_simulation, ConfigTree};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_counts_gathered_once_at_end() {
        let config = ConfigTree::from_overrides(
            json!({
                "time": {"start": "2005-01-01", "end": "2005-07-01", "step_size": 30},
                "population": {"population_size": 120},
                "randomness": {"seed": 0},
            }),
            "test",
        )
        .unwrap();
        let simulation = run_simulation(
            config,
            vec![Box::new(Demographics::new()), Box::new(DeathObserver::new())],
            None,
        )
        .unwrap();

        // Nobody dies in this model; the point is that multiple steps still
        // produce a single end-of-run gathering.
        let results = simulation.results();
        let total: f64 = ["Male", "Female"]
            .iter()
            .map(|sex| {
                results
                    .value(&MeasureId::from("dead_count"), &[sex.to_string()])
                    .unwrap()
            })
            .sum();
        assert_eq!(total, 0.0);
        assert_eq!(
            results.value(&MeasureId::from("final_population"), &["all".to_string()]),
            Some(120.0)
        );
    }
}
