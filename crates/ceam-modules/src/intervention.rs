//! A population-level intervention arm.
//!
//! From a configured start year, the intervention costs a fixed amount per
//! living adult per year and halves the incidence rates it targets. The
//! targeted rates are named at construction; the components sourcing those
//! pipelines never learn the intervention exists.

use chrono::Datelike;
use serde_json::{json, Value};

use ceam_foundation::{ColumnId, ComponentId, PipelineId};
use ceam_framework::{
    Builder, Component, Event, EventContext, ResourceRef, Result, TIME_STEP,
};

use crate::cost::CostLedger;
use crate::demographics::AGE_COLUMN;

/// Cost per covered adult per year.
const ANNUAL_COST_PER_ADULT: f64 = 2.0;
/// Intervention coverage starts at this age.
const ADULT_AGE: f64 = 25.0;

/// Tracks intervention cost and halves targeted incidence rates.
#[derive(Debug)]
pub struct InterventionCostTracker {
    ledger: CostLedger,
    targets: Vec<PipelineId>,
    start_year: i32,
}

impl InterventionCostTracker {
    /// Create the tracker. `targets` are the rate pipelines to halve.
    pub fn new(ledger: CostLedger, targets: Vec<PipelineId>) -> Self {
        Self {
            ledger,
            targets,
            start_year: 0,
        }
    }
}

impl Component for InterventionCostTracker {
    fn name(&self) -> ComponentId {
        ComponentId::from("intervention_cost_tracker")
    }

    fn configuration_defaults(&self) -> Option<Value> {
        Some(json!({"intervention": {"start_year": 1995}}))
    }

    fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
        self.start_year = builder.config().get_u64("intervention.start_year")? as i32;
        let start_year = self.start_year;

        for target in &self.targets {
            builder.register_value_modifier(
                target.clone(),
                5,
                vec![ResourceRef::column(AGE_COLUMN)],
                Box::new(move |values, table, index, time| {
                    if time.year() < start_year {
                        return Ok(values);
                    }
                    let ages = table.f64s(&ColumnId::from(AGE_COLUMN))?;
                    Ok(values
                        .into_iter()
                        .zip(index.iter())
                        .map(|(rate, row)| {
                            if ages[row] >= ADULT_AGE {
                                rate * 0.5
                            } else {
                                rate
                            }
                        })
                        .collect())
                }),
            )?;
        }
        builder.register_event_listener(TIME_STEP, 9)
    }

    fn on_event(&mut self, event: &Event, ctx: &mut EventContext<'_>) -> Result<()> {
        if event.time.year() < self.start_year {
            return Ok(());
        }
        let covered = {
            let living = ctx.population.living()?;
            let ages = ctx.population.f64s(&ColumnId::from(AGE_COLUMN))?;
            living.iter().filter(|&row| ages[row] >= ADULT_AGE).count()
        };
        let step_years = event.step_size_days as f64 / 365.0;
        self.ledger.add(
            event.time.year(),
            ANNUAL_COST_PER_ADULT * covered as f64 * step_years,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demographics::Demographics;
    use ceam_framework::{run_simulation, ConfigTree, PostProcessor};
    use std::sync::{Arc, Mutex};

    /// Sources a flat annual incidence rate and records what consumers see.
    struct Incidence {
        observed: Arc<Mutex<Vec<f64>>>,
    }

    impl Component for Incidence {
        fn name(&self) -> ComponentId {
            ComponentId::from("ihd")
        }

        fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
            builder.register_value_producer(
                "ihd.incidence_rate",
                PostProcessor::Rate,
                vec![],
                Box::new(|_, index, _| Ok(vec![0.2; index.len()])),
            )?;
            builder.register_event_listener(TIME_STEP, 3)
        }

        fn on_event(&mut self, event: &Event, ctx: &mut EventContext<'_>) -> Result<()> {
            let rates = ctx.get_value(
                &PipelineId::from("ihd.incidence_rate"),
                &event.index,
            )?;
            self.observed.lock().unwrap().extend(rates);
            Ok(())
        }
    }

    #[test]
    fn test_rates_halved_for_covered_adults() {
        let config = ConfigTree::from_overrides(
            json!({
                "time": {"start": "2005-01-01", "end": "2005-01-31", "step_size": 30},
                "population": {"population_size": 50},
                "randomness": {"seed": 0},
            }),
            "test",
        )
        .unwrap();

        let observed = Arc::new(Mutex::new(Vec::new()));
        let ledger = CostLedger::new();
        let simulation = run_simulation(
            config,
            vec![
                Box::new(Demographics::new()),
                Box::new(Incidence {
                    observed: observed.clone(),
                }),
                Box::new(InterventionCostTracker::new(
                    ledger.clone(),
                    vec![PipelineId::from("ihd.incidence_rate")],
                )),
            ],
            None,
        )
        .unwrap();

        let ages = simulation
            .population()
            .f64s(&ColumnId::from(AGE_COLUMN))
            .unwrap()
            .to_vec();
        let observed = observed.lock().unwrap();
        assert_eq!(observed.len(), 50);
        let step_scale = 30.0 / 365.0;
        // Aging runs at priority 0, before the rates are read, so the final
        // ages are the ages the modifier saw.
        for (rate, age) in observed.iter().zip(&ages) {
            let expected = if *age >= ADULT_AGE {
                0.2 * 0.5 * step_scale
            } else {
                0.2 * step_scale
            };
            assert!((rate - expected).abs() < 1e-9, "age {age}: {rate}");
        }

        let adults = ages.iter().filter(|a| **a >= ADULT_AGE).count();
        let expected_cost = ANNUAL_COST_PER_ADULT * adults as f64 * step_scale;
        assert!((ledger.total() - expected_cost).abs() < 1e-9);
    }

    #[test]
    fn test_inert_before_start_year() {
        let config = ConfigTree::from_overrides(
            json!({
                "time": {"start": "1990-01-01", "end": "1990-01-31", "step_size": 30},
                "population": {"population_size": 20},
                "randomness": {"seed": 0},
            }),
            "test",
        )
        .unwrap();

        let ledger = CostLedger::new();
        run_simulation(
            config,
            vec![
                Box::new(Demographics::new()),
                Box::new(InterventionCostTracker::new(ledger.clone(), vec![])),
            ],
            None,
        )
        .unwrap();
        assert_eq!(ledger.total(), 0.0);
    }
}
