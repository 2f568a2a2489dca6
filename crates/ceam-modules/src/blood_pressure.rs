//! Systolic blood pressure.
//!
//! Initializes `systolic_blood_pressure` from an age-dependent normal draw
//! and drifts it upward each step. The screening module reads this column to
//! categorize simulants and writes it back down when medication takes
//! effect.

use chrono::NaiveDate;

use ceam_foundation::{ColumnId, ComponentId};
use ceam_framework::{
    Builder, Column, Component, Error, Event, EventContext, PopulationUpdater, RandomnessStream,
    ResourceRef, Result, SimulantIndex, TIME_STEP,
};

use crate::demographics::AGE_COLUMN;

/// Systolic blood pressure in mmHg.
pub const SBP_COLUMN: &str = "systolic_blood_pressure";

/// Annual upward drift in mmHg.
const DRIFT_PER_YEAR: f64 = 0.8;
/// Standard deviation of the initial distribution.
const INITIAL_SD: f64 = 15.0;

/// Initializes and drifts systolic blood pressure.
#[derive(Debug, Default)]
pub struct BloodPressure {
    stream: Option<RandomnessStream>,
    start: Option<NaiveDate>,
}

impl BloodPressure {
    /// Create the component.
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self) -> Result<&RandomnessStream> {
        self.stream
            .as_ref()
            .ok_or_else(|| Error::ComponentConfig("blood pressure used before setup".to_string()))
    }
}

impl Component for BloodPressure {
    fn name(&self) -> ComponentId {
        ComponentId::from("blood_pressure")
    }

    fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
        self.start = Some(builder.clock().start());
        self.stream = Some(builder.get_stream("blood_pressure")?);
        builder.initializes_simulants(
            vec![ColumnId::from(SBP_COLUMN)],
            vec![
                ResourceRef::column(AGE_COLUMN),
                ResourceRef::stream("blood_pressure"),
            ],
        )?;
        builder.register_event_listener(TIME_STEP, 1)
    }

    fn on_initialize_simulants(
        &mut self,
        index: &SimulantIndex,
        population: &mut PopulationUpdater<'_>,
    ) -> Result<()> {
        let start = self
            .start
            .ok_or_else(|| Error::ComponentConfig("blood pressure used before setup".to_string()))?;
        let normals = self.stream()?.normal_draws(index, Some("initial_sbp"), start);

        let ages: Vec<f64> = {
            let age = population.table().f64s(&ColumnId::from(AGE_COLUMN))?;
            index.iter().map(|row| age[row]).collect()
        };
        let sbp: Vec<f64> = ages
            .iter()
            .zip(&normals)
            .map(|(age, z)| {
                let mean = 112.0 + 0.5 * age;
                (mean + INITIAL_SD * z).clamp(80.0, 260.0)
            })
            .collect();
        population.append_column(ColumnId::from(SBP_COLUMN), Column::F64(sbp))
    }

    fn on_event(&mut self, event: &Event, ctx: &mut EventContext<'_>) -> Result<()> {
        let living = ctx.population.living()?;
        let drift = DRIFT_PER_YEAR * event.step_size_days as f64 / 365.0;
        let column = ColumnId::from(SBP_COLUMN);
        let drifted: Vec<f64> = {
            let sbp = ctx.population.f64s(&column)?;
            living.iter().map(|row| sbp[row] + drift).collect()
        };
        ctx.population.set_f64(&column, &living, &drifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demographics::Demographics;
    use ceam_framework::{run_simulation, ConfigTree};
    use serde_json::json;

    #[test]
    fn test_initial_distribution_and_drift() {
        let config = ConfigTree::from_overrides(
            json!({
                "time": {"start": "2005-01-01", "end": "2006-01-01", "step_size": 365},
                "population": {"population_size": 2000},
                "randomness": {"seed": 0},
            }),
            "test",
        )
        .unwrap();
        let simulation = run_simulation(
            config,
            vec![Box::new(Demographics::new()), Box::new(BloodPressure::new())],
            None,
        )
        .unwrap();

        let sbp = simulation
            .population()
            .f64s(&ColumnId::from(SBP_COLUMN))
            .unwrap();
        assert!(sbp.iter().all(|v| *v >= 80.0 && *v <= 260.0 + 1.0));
        let mean: f64 = sbp.iter().sum::<f64>() / sbp.len() as f64;
        // Mean age ~50 → mean SBP ~137, one year of drift on top.
        assert!((125.0..150.0).contains(&mean), "mean sbp {mean}");
    }
}
