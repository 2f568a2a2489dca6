//! Healthcare access events.
//!
//! Each step, living simulants visit a clinic in one of two ways: a general
//! visit drawn from an annual utilization rate, or a follow-up visit when
//! the appointment date another module scheduled falls inside the step. Both
//! kinds are announced as events so that screening-style modules can react
//! without this module knowing they exist. General appointment costs accrue
//! here; follow-up costs are charged by whoever ordered the follow-up.

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::debug;

use ceam_foundation::{ColumnId, ComponentId};
use ceam_framework::{
    Builder, Column, Component, Error, Event, EventContext, PopulationUpdater, RandomnessStream,
    Result, SimulantIndex, TIME_STEP,
};

use crate::cost::CostLedger;

/// Emitted with the simulants making a general clinic visit this step.
pub const GENERAL_HEALTHCARE_ACCESS: &str = "general_healthcare_access";
/// Emitted with the simulants whose follow-up appointment came due.
pub const FOLLOWUP_HEALTHCARE_ACCESS: &str = "followup_healthcare_access";

/// Scheduled follow-up date as days from the common era; `0` means none.
pub const FOLLOWUP_DATE_COLUMN: &str = "healthcare_followup_date";

/// A date as a day number for storage in an integer column.
pub fn date_to_days(date: NaiveDate) -> i64 {
    use chrono::Datelike;
    i64::from(date.num_days_from_ce())
}

/// Emits general and follow-up healthcare access events.
#[derive(Debug)]
pub struct HealthcareAccess {
    stream: Option<RandomnessStream>,
    ledger: CostLedger,
    annual_rate: f64,
    appointment_cost: f64,
}

impl HealthcareAccess {
    /// Create the component, accruing appointment costs into `ledger`.
    pub fn new(ledger: CostLedger) -> Self {
        Self {
            stream: None,
            ledger,
            annual_rate: 0.0,
            appointment_cost: 0.0,
        }
    }

    fn stream(&self) -> Result<&RandomnessStream> {
        self.stream.as_ref().ok_or_else(|| {
            Error::ComponentConfig("healthcare access used before setup".to_string())
        })
    }
}

impl Component for HealthcareAccess {
    fn name(&self) -> ComponentId {
        ComponentId::from("healthcare_access")
    }

    fn configuration_defaults(&self) -> Option<Value> {
        Some(json!({
            "appointments": {"cost": 7.29},
            "healthcare_access": {"annual_utilization_rate": 0.9},
        }))
    }

    fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
        self.annual_rate = builder
            .config()
            .get_f64("healthcare_access.annual_utilization_rate")?;
        self.appointment_cost = builder.config().get_f64("appointments.cost")?;
        self.stream = Some(builder.get_stream("healthcare_access")?);
        builder.initializes_simulants(vec![ColumnId::from(FOLLOWUP_DATE_COLUMN)], vec![])?;
        builder.register_event_listener(TIME_STEP, 2)
    }

    fn on_initialize_simulants(
        &mut self,
        index: &SimulantIndex,
        population: &mut PopulationUpdater<'_>,
    ) -> Result<()> {
        population.append_column(
            ColumnId::from(FOLLOWUP_DATE_COLUMN),
            Column::I64(vec![0; index.len()]),
        )
    }

    fn on_event(&mut self, event: &Event, ctx: &mut EventContext<'_>) -> Result<()> {
        use chrono::Datelike;

        let living = ctx.population.living()?;
        let today = date_to_days(event.time);
        let column = ColumnId::from(FOLLOWUP_DATE_COLUMN);

        // Follow-ups that came due on or before today. The date is cleared
        // so a missed appointment is not revisited every step.
        let due: SimulantIndex = {
            let dates = ctx.population.i64s(&column)?;
            living
                .iter()
                .filter(|&row| dates[row] != 0 && dates[row] <= today)
                .collect()
        };
        if !due.is_empty() {
            ctx.population.fill_i64(&column, &due, 0)?;
            ctx.emit(FOLLOWUP_HEALTHCARE_ACCESS, due);
        }

        // Independent general visits from the annual utilization rate.
        let step_rate = self.annual_rate * event.step_size_days as f64 / 365.0;
        let rates = vec![step_rate; living.len()];
        let general =
            self.stream()?
                .filter_for_rate(&living, &rates, Some("general_access"), event.time)?;
        if !general.is_empty() {
            debug!(time = %event.time, visits = general.len(), "general healthcare access");
            self.ledger
                .add(event.time.year(), general.len() as f64 * self.appointment_cost);
            ctx.emit(GENERAL_HEALTHCARE_ACCESS, general);
        }
        Ok(())
    }
}
