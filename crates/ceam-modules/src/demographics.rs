//! Basic population demographics.
//!
//! Creates the `age`, `sex` and `alive` columns and ages the living with the
//! clock. Every other module depends on at least one of these columns, so
//! this component sits at the root of the initialization order.

use chrono::NaiveDate;
use serde_json::{json, Value};

use ceam_foundation::{ColumnId, ComponentId};
use ceam_framework::{
    Builder, ChoiceWeight, ChoiceWeights, Column, Component, Error, Event, EventContext,
    PopulationUpdater, RandomnessStream, Result, SimulantIndex, ALIVE_COLUMN, TIME_STEP,
};

/// Age in years.
pub const AGE_COLUMN: &str = "age";
/// Simulant sex, `Male` or `Female`.
pub const SEX_COLUMN: &str = "sex";

/// Creates and ages the base population.
#[derive(Debug, Default)]
pub struct Demographics {
    stream: Option<RandomnessStream>,
    start: Option<NaiveDate>,
    max_age: f64,
}

impl Demographics {
    /// Create the component.
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self) -> Result<&RandomnessStream> {
        self.stream
            .as_ref()
            .ok_or_else(|| Error::ComponentConfig("demographics used before setup".to_string()))
    }

    fn start(&self) -> Result<NaiveDate> {
        self.start
            .ok_or_else(|| Error::ComponentConfig("demographics used before setup".to_string()))
    }
}

impl Component for Demographics {
    fn name(&self) -> ComponentId {
        ComponentId::from("demographics")
    }

    fn configuration_defaults(&self) -> Option<Value> {
        Some(json!({
            "population": {"population_size": 1000},
            "demographics": {"max_initial_age": 100.0},
        }))
    }

    fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
        self.max_age = builder.config().get_f64("demographics.max_initial_age")?;
        self.start = Some(builder.clock().start());
        self.stream = Some(builder.get_stream("demographics")?);
        builder.initializes_simulants(
            vec![
                ColumnId::from(AGE_COLUMN),
                ColumnId::from(SEX_COLUMN),
                ColumnId::from(ALIVE_COLUMN),
            ],
            vec![],
        )?;
        // Aging runs before everything else on the step.
        builder.register_event_listener(TIME_STEP, 0)
    }

    fn on_initialize_simulants(
        &mut self,
        index: &SimulantIndex,
        population: &mut PopulationUpdater<'_>,
    ) -> Result<()> {
        let start = self.start()?;
        let stream = self.stream()?;

        let ages: Vec<f64> = stream
            .get_draw(index, Some("initial_age"), start)
            .into_iter()
            .map(|draw| draw * self.max_age)
            .collect();
        let sexes = stream.choice(
            index,
            &["Male".to_string(), "Female".to_string()],
            Some(&ChoiceWeights::Broadcast(vec![
                ChoiceWeight::Weight(0.5),
                ChoiceWeight::Residual,
            ])),
            Some("initial_sex"),
            start,
        )?;

        population.append_column(ColumnId::from(AGE_COLUMN), Column::F64(ages))?;
        population.append_column(ColumnId::from(SEX_COLUMN), Column::Str(sexes))?;
        population.append_column(
            ColumnId::from(ALIVE_COLUMN),
            Column::Bool(vec![true; index.len()]),
        )
    }

    fn on_event(&mut self, event: &Event, ctx: &mut EventContext<'_>) -> Result<()> {
        let living = ctx.population.living()?;
        let step_years = event.step_size_days as f64 / 365.0;
        let age_column = ColumnId::from(AGE_COLUMN);
        let aged: Vec<f64> = {
            let ages = ctx.population.f64s(&age_column)?;
            living.iter().map(|row| ages[row] + step_years).collect()
        };
        ctx.population.set_f64(&age_column, &living, &aged)
    }
}
