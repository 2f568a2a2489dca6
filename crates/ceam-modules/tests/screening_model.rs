//! End-to-end run of the blood-pressure screening model.

use serde_json::json;

use ceam_foundation::ColumnId;
use ceam_framework::{run_simulation, Component, ConfigTree, SimulationContext};
use ceam_modules::{
    BloodPressure, CostLedger, DeathObserver, Demographics, HealthcareAccess,
    OpportunisticScreening, MEDICATIONS, MEDICATION_COUNT_COLUMN, SBP_COLUMN,
};

fn config(seed: u64) -> ConfigTree {
    ConfigTree::from_overrides(
        json!({
            "time": {"start": "2005-01-01", "end": "2007-01-01", "step_size": 30},
            "population": {"population_size": 500},
            "randomness": {"seed": seed},
        }),
        "screening_model",
    )
    .unwrap()
}

fn components(
    healthcare: &CostLedger,
    screening: &CostLedger,
) -> Vec<Box<dyn Component>> {
    vec![
        Box::new(Demographics::new()),
        Box::new(BloodPressure::new()),
        Box::new(HealthcareAccess::new(healthcare.clone())),
        Box::new(OpportunisticScreening::new(screening.clone())),
        Box::new(DeathObserver::new()),
    ]
}

fn run(seed: u64) -> (SimulationContext, CostLedger, CostLedger) {
    let healthcare = CostLedger::new();
    let screening = CostLedger::new();
    let simulation = run_simulation(
        config(seed),
        components(&healthcare, &screening),
        None,
    )
    .unwrap();
    (simulation, healthcare, screening)
}

#[test]
fn test_full_model_runs_and_medicates() {
    let (simulation, healthcare, screening) = run(0);
    let table = simulation.population();
    assert_eq!(table.len(), 500);

    let counts = table
        .i64s(&ColumnId::from(MEDICATION_COUNT_COLUMN))
        .unwrap();
    assert!(counts.iter().all(|c| (0..=MEDICATIONS.len() as i64).contains(c)));
    // Two years of visits in a 500-person population with age-driven blood
    // pressure reaches the medication ladder for someone.
    assert!(counts.iter().any(|c| *c > 0));

    // Appointments happened and every test was costed.
    assert!(healthcare.total() > 0.0);
    assert!(screening.total() > 0.0);
    // Costs landed in the simulated years only.
    let snapshot = screening.snapshot();
    assert!(snapshot.keys().all(|year| (2005..=2006).contains(year)));
}

#[test]
fn test_medication_lowers_blood_pressure() {
    let (with_screening, _, _) = run(11);

    let inert_healthcare = CostLedger::new();
    let inert_screening = CostLedger::new();
    let without = run_simulation(
        config(11),
        vec![
            Box::new(Demographics::new()),
            Box::new(BloodPressure::new()),
            Box::new(HealthcareAccess::new(inert_healthcare.clone())),
            Box::new(OpportunisticScreening::inactive(inert_screening.clone())),
            Box::new(DeathObserver::new()),
        ],
        None,
    )
    .unwrap();

    let treated: f64 = with_screening
        .population()
        .f64s(&ColumnId::from(SBP_COLUMN))
        .unwrap()
        .iter()
        .sum();
    let untreated: f64 = without
        .population()
        .f64s(&ColumnId::from(SBP_COLUMN))
        .unwrap()
        .iter()
        .sum();
    // Same seed, same draws; the only difference is treatment.
    assert!(
        treated < untreated,
        "treated {treated} !< untreated {untreated}"
    );
}

#[test]
fn test_same_seed_reproduces_costs_and_state() {
    let (a, a_healthcare, a_screening) = run(7);
    let (b, b_healthcare, b_screening) = run(7);

    assert_eq!(a_healthcare.snapshot(), b_healthcare.snapshot());
    assert_eq!(a_screening.snapshot(), b_screening.snapshot());
    assert_eq!(
        a.population().f64s(&ColumnId::from(SBP_COLUMN)).unwrap(),
        b.population().f64s(&ColumnId::from(SBP_COLUMN)).unwrap()
    );
    assert_eq!(
        a.population()
            .i64s(&ColumnId::from(MEDICATION_COUNT_COLUMN))
            .unwrap(),
        b.population()
            .i64s(&ColumnId::from(MEDICATION_COUNT_COLUMN))
            .unwrap()
    );
}

#[test]
fn test_different_seeds_diverge() {
    let (a, _, _) = run(1);
    let (b, _, _) = run(2);
    assert_ne!(
        a.population().f64s(&ColumnId::from(SBP_COLUMN)).unwrap(),
        b.population().f64s(&ColumnId::from(SBP_COLUMN)).unwrap()
    );
}

#[test]
fn test_results_report_written() {
    let healthcare = CostLedger::new();
    let screening = CostLedger::new();
    let dir = tempfile::tempdir().unwrap();
    run_simulation(
        config(0),
        components(&healthcare, &screening),
        Some(dir.path()),
    )
    .unwrap();

    let report = std::fs::read_to_string(dir.path().join("final_population.csv")).unwrap();
    let mut lines = report.lines();
    assert_eq!(
        lines.next().unwrap(),
        "group,measure,random_seed,input_draw,value"
    );
    assert_eq!(lines.next().unwrap(), "all,final_population,0,0,500");
    assert!(dir.path().join("dead_count.csv").exists());
}
