//! Opportunistic blood pressure screening.
//!
//! Simulants have their blood pressure tested whenever they access health
//! care. Hypertensives are prescribed medication from a fixed four-drug
//! ladder and scheduled for follow-up; a simulant still hypertensive on all
//! four drugs gets no further treatment. Test, appointment and medication
//! costs accrue by calendar year, and prescribed medication pulls blood
//! pressure down each step in proportion to the simulant's adherence.

use serde_json::{json, Value};
use tracing::debug;

use chrono::Datelike;

use ceam_foundation::{ColumnId, ComponentId};
use ceam_framework::{
    Builder, Column, Component, Error, Event, EventContext, PopulationTable, PopulationUpdater,
    RandomnessStream, ResourceRef, Result, SimulantIndex, ChoiceWeight, ChoiceWeights, TIME_STEP,
};

use crate::blood_pressure::SBP_COLUMN;
use crate::cost::CostLedger;
use crate::demographics::AGE_COLUMN;
use crate::healthcare_access::{
    date_to_days, FOLLOWUP_DATE_COLUMN, FOLLOWUP_HEALTHCARE_ACCESS, GENERAL_HEALTHCARE_ACCESS,
};

/// Number of drugs currently prescribed, `0..=MEDICATIONS.len()`.
pub const MEDICATION_COUNT_COLUMN: &str = "medication_count";
/// Whether the simulant actually takes prescribed drugs (1.0 or 0.0).
pub const DRUG_ADHERENCE_COLUMN: &str = "drug_adherence";

/// One rung of the medication ladder.
#[derive(Debug, Clone, Copy)]
pub struct Medication {
    /// Drug class name.
    pub name: &'static str,
    /// Column holding the day number the supply runs out; `0` means none.
    pub supplied_until_column: &'static str,
    /// Cost per simulant-day of supply.
    pub daily_cost: f64,
    /// Reduction of systolic blood pressure in mmHg at full adherence.
    pub efficacy: f64,
}

/// The medication ladder, prescribed in order.
pub const MEDICATIONS: [Medication; 4] = [
    Medication {
        name: "Thiazide-type diuretics",
        supplied_until_column: "thiazide_type_diuretics_supplied_until",
        daily_cost: 0.009,
        efficacy: 8.8,
    },
    Medication {
        name: "Calcium-channel blockers",
        supplied_until_column: "calcium_channel_blockers_supplied_until",
        daily_cost: 0.166,
        efficacy: 8.8,
    },
    Medication {
        name: "ACE Inhibitors",
        supplied_until_column: "ace_inhibitors_supplied_until",
        daily_cost: 0.059,
        efficacy: 10.3,
    },
    Medication {
        name: "Beta blockers",
        supplied_until_column: "beta_blockers_supplied_until",
        daily_cost: 0.048,
        efficacy: 9.2,
    },
];

/// Follow-up intervals, as whole days per the 30.5-day model month.
fn months(n: f64) -> i64 {
    (30.5 * n).round() as i64
}

/// Partition an index into normotensive, hypertensive and severely
/// hypertensive simulants.
///
/// Under 60 the boundaries are 140 and 180 mmHg; from 60 on the normotensive
/// boundary relaxes to 150. Severe hypertension is 180 and above at any age.
pub fn hypertensive_categories(
    table: &PopulationTable,
    index: &SimulantIndex,
) -> Result<(SimulantIndex, SimulantIndex, SimulantIndex)> {
    let ages = table.f64s(&ColumnId::from(AGE_COLUMN))?;
    let sbp = table.f64s(&ColumnId::from(SBP_COLUMN))?;

    let mut normotensive = Vec::new();
    let mut hypertensive = Vec::new();
    let mut severe = Vec::new();
    for row in index.iter() {
        let threshold = if ages[row] < 60.0 { 140.0 } else { 150.0 };
        if sbp[row] >= 180.0 {
            severe.push(row);
        } else if sbp[row] >= threshold {
            hypertensive.push(row);
        } else {
            normotensive.push(row);
        }
    }
    Ok((
        SimulantIndex::new(normotensive),
        SimulantIndex::new(hypertensive),
        SimulantIndex::new(severe),
    ))
}

/// Screens simulants at healthcare access and medicates hypertensives.
#[derive(Debug)]
pub struct OpportunisticScreening {
    stream: Option<RandomnessStream>,
    start: Option<chrono::NaiveDate>,
    ledger: CostLedger,
    /// When false, costs still accrue but no state is mutated; used for the
    /// do-nothing counterfactual arm.
    active: bool,
    adherence: f64,
    test_cost: f64,
    appointment_cost: f64,
}

impl OpportunisticScreening {
    /// Create the component, accruing costs into `ledger`.
    pub fn new(ledger: CostLedger) -> Self {
        Self {
            stream: None,
            start: None,
            ledger,
            active: true,
            adherence: 0.0,
            test_cost: 0.0,
            appointment_cost: 0.0,
        }
    }

    /// The counterfactual arm: observe and cost the tests, prescribe
    /// nothing.
    pub fn inactive(ledger: CostLedger) -> Self {
        Self {
            active: false,
            ..Self::new(ledger)
        }
    }

    fn stream(&self) -> Result<&RandomnessStream> {
        self.stream
            .as_ref()
            .ok_or_else(|| Error::ComponentConfig("screening used before setup".to_string()))
    }

    /// Raise medication counts over an index, capped at the ladder length.
    fn add_medications(
        &self,
        ctx: &mut EventContext<'_>,
        index: &SimulantIndex,
        count: i64,
    ) -> Result<()> {
        let column = ColumnId::from(MEDICATION_COUNT_COLUMN);
        let raised: Vec<i64> = {
            let counts = ctx.population.i64s(&column)?;
            index
                .iter()
                .map(|row| (counts[row] + count).min(MEDICATIONS.len() as i64))
                .collect()
        };
        ctx.population.set_i64(&column, index, &raised)
    }

    /// Schedule a follow-up `days` out for an index.
    fn schedule_followup(
        &self,
        ctx: &mut EventContext<'_>,
        index: &SimulantIndex,
        days: i64,
    ) -> Result<()> {
        let due = date_to_days(ctx.time()) + days;
        ctx.population
            .fill_i64(&ColumnId::from(FOLLOWUP_DATE_COLUMN), index, due)
    }

    /// Charge medication supply out to each simulant's follow-up date.
    ///
    /// For every drug a simulant is on, supply already paid for counts
    /// against the days until their next appointment; only the shortfall is
    /// bought and costed.
    fn medication_costs(&self, ctx: &mut EventContext<'_>, index: &SimulantIndex) -> Result<()> {
        let today = date_to_days(ctx.time());
        let year = ctx.time().year();
        let count_column = ColumnId::from(MEDICATION_COUNT_COLUMN);
        let followup_column = ColumnId::from(FOLLOWUP_DATE_COLUMN);

        for (number, medication) in MEDICATIONS.iter().enumerate() {
            let supplied_column = ColumnId::from(medication.supplied_until_column);
            let (affected, supplied_until, cost): (SimulantIndex, Vec<i64>, f64) = {
                let counts = ctx.population.i64s(&count_column)?;
                let followups = ctx.population.i64s(&followup_column)?;
                let supplied = ctx.population.i64s(&supplied_column)?;

                let affected: SimulantIndex = index
                    .iter()
                    .filter(|&row| counts[row] > number as i64)
                    .collect();
                let mut until = Vec::with_capacity(affected.len());
                let mut days_bought = 0_i64;
                for row in affected.iter() {
                    let remaining = (supplied[row] - today).max(0);
                    let needed = (followups[row] - today).max(0);
                    days_bought += (needed - remaining).max(0);
                    until.push(today + needed.max(remaining));
                }
                (affected, until, days_bought as f64 * medication.daily_cost)
            };
            if affected.is_empty() {
                continue;
            }
            self.ledger.add(year, cost);
            if self.active {
                ctx.population
                    .set_i64(&supplied_column, &affected, &supplied_until)?;
            }
        }
        Ok(())
    }

    /// A general visit: test everyone, triage, schedule, prescribe.
    fn general_blood_pressure_test(
        &mut self,
        event: &Event,
        ctx: &mut EventContext<'_>,
    ) -> Result<()> {
        self.ledger
            .add(event.time.year(), event.index.len() as f64 * self.test_cost);

        let (normotensive, hypertensive, severe) =
            hypertensive_categories(ctx.population, &event.index)?;
        if self.active {
            self.schedule_followup(ctx, &normotensive, months(60.0))?;
            self.schedule_followup(ctx, &hypertensive, months(1.0))?;
            self.schedule_followup(ctx, &severe, months(6.0))?;
            self.add_medications(ctx, &severe, 2)?;
        }
        self.medication_costs(ctx, &event.index)
    }

    /// A follow-up visit: the appointment itself is costed here, and the
    /// prescription ladder moves one rung for anyone still hypertensive.
    fn followup_blood_pressure_test(
        &mut self,
        event: &Event,
        ctx: &mut EventContext<'_>,
    ) -> Result<()> {
        self.ledger.add(
            event.time.year(),
            event.index.len() as f64 * (self.appointment_cost + self.test_cost),
        );

        let (normotensive, hypertensive, severe) =
            hypertensive_categories(ctx.population, &event.index)?;

        let (nonmedicated, medicated): (SimulantIndex, SimulantIndex) = {
            let counts = ctx.population.i64s(&ColumnId::from(MEDICATION_COUNT_COLUMN))?;
            (
                normotensive.iter().filter(|&r| counts[r] == 0).collect(),
                normotensive.iter().filter(|&r| counts[r] > 0).collect(),
            )
        };

        if self.active {
            debug!(
                time = %event.time,
                prescribed = hypertensive.len() + severe.len(),
                "follow-up moved simulants up the medication ladder"
            );
            self.schedule_followup(ctx, &nonmedicated, months(60.0))?;
            self.schedule_followup(ctx, &medicated, months(11.0))?;
            self.schedule_followup(ctx, &hypertensive, months(6.0))?;
            self.add_medications(ctx, &hypertensive, 1)?;
            self.schedule_followup(ctx, &severe, months(6.0))?;
            self.add_medications(ctx, &severe, 1)?;
        }
        self.medication_costs(ctx, &event.index)
    }

    /// Medication takes effect: each drug a living simulant is on pulls
    /// blood pressure down by its efficacy scaled by adherence.
    fn adjust_blood_pressure(&mut self, ctx: &mut EventContext<'_>) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let living = ctx.population.living()?;
        let sbp_column = ColumnId::from(SBP_COLUMN);
        for (number, medication) in MEDICATIONS.iter().enumerate() {
            let (affected, lowered): (SimulantIndex, Vec<f64>) = {
                let counts = ctx.population.i64s(&ColumnId::from(MEDICATION_COUNT_COLUMN))?;
                let adherence = ctx.population.f64s(&ColumnId::from(DRUG_ADHERENCE_COLUMN))?;
                let sbp = ctx.population.f64s(&sbp_column)?;
                let affected: SimulantIndex = living
                    .iter()
                    .filter(|&row| counts[row] > number as i64)
                    .collect();
                let lowered = affected
                    .iter()
                    .map(|row| sbp[row] - medication.efficacy * adherence[row])
                    .collect();
                (affected, lowered)
            };
            ctx.population.set_f64(&sbp_column, &affected, &lowered)?;
        }
        Ok(())
    }
}

impl Component for OpportunisticScreening {
    fn name(&self) -> ComponentId {
        ComponentId::from("opportunistic_screening")
    }

    fn configuration_defaults(&self) -> Option<Value> {
        Some(json!({
            "opportunistic_screening": {
                "adherence": 0.6,
                "blood_pressure_test_cost": 2.43,
            },
        }))
    }

    fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
        self.adherence = builder
            .config()
            .get_f64("opportunistic_screening.adherence")?;
        self.test_cost = builder
            .config()
            .get_f64("opportunistic_screening.blood_pressure_test_cost")?;
        self.appointment_cost = builder.config().get_f64("appointments.cost")?;
        self.start = Some(builder.clock().start());
        self.stream = Some(builder.get_stream("opportunistic_screening")?);

        let mut creates = vec![
            ColumnId::from(MEDICATION_COUNT_COLUMN),
            ColumnId::from(DRUG_ADHERENCE_COLUMN),
        ];
        creates.extend(
            MEDICATIONS
                .iter()
                .map(|m| ColumnId::from(m.supplied_until_column)),
        );
        builder.initializes_simulants(
            creates,
            vec![
                ResourceRef::column(SBP_COLUMN),
                ResourceRef::column(FOLLOWUP_DATE_COLUMN),
            ],
        )?;

        builder.register_event_listener(GENERAL_HEALTHCARE_ACCESS, 5)?;
        builder.register_event_listener(FOLLOWUP_HEALTHCARE_ACCESS, 5)?;
        // After blood pressure drift on the same step.
        builder.register_event_listener(TIME_STEP, 8)
    }

    fn on_initialize_simulants(
        &mut self,
        index: &SimulantIndex,
        population: &mut PopulationUpdater<'_>,
    ) -> Result<()> {
        // Adherence is decided once, at the start of a simulant's life.
        let start = self
            .start
            .ok_or_else(|| Error::ComponentConfig("screening used before setup".to_string()))?;
        let adherence = self.stream()?.choice(
            index,
            &[1.0, 0.0],
            Some(&ChoiceWeights::Broadcast(vec![
                ChoiceWeight::Weight(self.adherence),
                ChoiceWeight::Residual,
            ])),
            Some("adherence"),
            start,
        )?;

        population.append_column(
            ColumnId::from(DRUG_ADHERENCE_COLUMN),
            Column::F64(adherence),
        )?;
        population.append_column(
            ColumnId::from(MEDICATION_COUNT_COLUMN),
            Column::I64(vec![0; index.len()]),
        )?;
        for medication in &MEDICATIONS {
            population.append_column(
                ColumnId::from(medication.supplied_until_column),
                Column::I64(vec![0; index.len()]),
            )?;
        }
        Ok(())
    }

    fn on_event(&mut self, event: &Event, ctx: &mut EventContext<'_>) -> Result<()> {
        match event.id.as_str().as_str() {
            GENERAL_HEALTHCARE_ACCESS => self.general_blood_pressure_test(event, ctx),
            FOLLOWUP_HEALTHCARE_ACCESS => self.followup_blood_pressure_test(event, ctx),
            TIME_STEP => self.adjust_blood_pressure(ctx),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceam_framework::ALIVE_COLUMN;
    use pretty_assertions::assert_eq;

    fn table(ages: &[f64], sbp: &[f64]) -> PopulationTable {
        let mut table = PopulationTable::new();
        table.grow(ages.len());
        table
            .append_column(ColumnId::from(AGE_COLUMN), Column::F64(ages.to_vec()))
            .unwrap();
        table
            .append_column(ColumnId::from(SBP_COLUMN), Column::F64(sbp.to_vec()))
            .unwrap();
        table
            .append_column(
                ColumnId::from(ALIVE_COLUMN),
                Column::Bool(vec![true; ages.len()]),
            )
            .unwrap();
        table
    }

    #[test]
    fn test_hypertensive_boundaries_under_60() {
        let table = table(&[45.0, 45.0, 45.0, 45.0], &[139.9, 140.0, 179.9, 180.0]);
        let (normo, hyper, severe) =
            hypertensive_categories(&table, &table.full_index()).unwrap();
        assert_eq!(normo, SimulantIndex::new(vec![0]));
        assert_eq!(hyper, SimulantIndex::new(vec![1, 2]));
        assert_eq!(severe, SimulantIndex::new(vec![3]));
    }

    #[test]
    fn test_hypertensive_boundary_relaxes_at_60() {
        let table = table(&[59.9, 60.0, 60.0, 60.0], &[145.0, 145.0, 150.0, 185.0]);
        let (normo, hyper, severe) =
            hypertensive_categories(&table, &table.full_index()).unwrap();
        assert_eq!(normo, SimulantIndex::new(vec![1]));
        assert_eq!(hyper, SimulantIndex::new(vec![0, 2]));
        assert_eq!(severe, SimulantIndex::new(vec![3]));
    }

    #[test]
    fn test_medication_ladder_table() {
        assert_eq!(MEDICATIONS.len(), 4);
        assert_eq!(MEDICATIONS[0].name, "Thiazide-type diuretics");
        assert!((MEDICATIONS[1].daily_cost - 0.166).abs() < 1e-12);
        assert!((MEDICATIONS[2].efficacy - 10.3).abs() < 1e-12);
    }

    #[test]
    fn test_followup_months() {
        assert_eq!(months(1.0), 31);
        assert_eq!(months(6.0), 183);
        assert_eq!(months(60.0), 1830);
    }
}
