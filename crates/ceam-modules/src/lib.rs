//! Reference model components for CEAM simulations.
//!
//! These components model a blood-pressure screening program: demographics
//! create and age the population, blood pressure drifts with age, simulants
//! access health care, and the screening module tests and medicates
//! hypertensives while cost ledgers keep the books. Together they exercise
//! every framework surface - columns, streams, pipelines, events, results -
//! and serve as the template for writing new modules.
//!
//! # Components
//!
//! - [`Demographics`] - `age`, `sex` and `alive` columns; aging
//! - [`BloodPressure`] - `systolic_blood_pressure` with age drift
//! - [`HealthcareAccess`] - general and follow-up access events
//! - [`OpportunisticScreening`] - testing, medication, cost accounting
//! - [`InterventionCostTracker`] - rate-halving intervention arm
//! - [`DeathObserver`] - end-of-run death and population counts

pub mod blood_pressure;
pub mod cost;
pub mod demographics;
pub mod healthcare_access;
pub mod intervention;
pub mod observers;
pub mod screening;

pub use blood_pressure::{BloodPressure, SBP_COLUMN};
pub use cost::CostLedger;
pub use demographics::{Demographics, AGE_COLUMN, SEX_COLUMN};
pub use healthcare_access::{
    HealthcareAccess, FOLLOWUP_DATE_COLUMN, FOLLOWUP_HEALTHCARE_ACCESS,
    GENERAL_HEALTHCARE_ACCESS,
};
pub use intervention::InterventionCostTracker;
pub use observers::DeathObserver;
pub use screening::{
    hypertensive_categories, Medication, OpportunisticScreening, DRUG_ADHERENCE_COLUMN,
    MEDICATIONS, MEDICATION_COUNT_COLUMN,
};
