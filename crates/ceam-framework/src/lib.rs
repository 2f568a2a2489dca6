//! Microsimulation framework for cost-effectiveness analysis.
//!
//! A simulation is a population of simulants stepped through time by a set
//! of components. Components declare the state columns they own, subscribe to
//! lifecycle events, draw common random numbers, publish and modify value
//! pipelines, and record stratified observations. The engine wires them
//! together, orders their initializers by resource dependencies, and drives
//! the lifecycle from setup to the results report.
//!
//! # Architecture
//!
//! - [`config`] - Layered configuration tree
//! - [`lifecycle`] - Phase tracking and enforcement
//! - [`time`] - The date-based simulation clock
//! - [`component`] - The [`Component`](component::Component) trait and registry
//! - [`population`] - The columnar population state table
//! - [`resource`] - Dependency graph over produced resources
//! - [`randomness`] - Common-random-number streams
//! - [`values`] - Cross-component value pipelines
//! - [`event`] - Lifecycle and domain events
//! - [`results`] - Stratified observation gathering and CSV reports
//! - [`engine`] - [`SimulationContext`](engine::SimulationContext) and the
//!   main loop

pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod population;
pub mod randomness;
pub mod resource;
pub mod results;
pub mod time;
pub mod values;

pub use component::{Component, ComponentManager};
pub use config::{ConfigLayer, ConfigTree};
pub use engine::{run_simulation, Builder, EventContext, SimulationContext};
pub use error::{Error, Result};
pub use event::{
    Event, EventManager, COLLECT_METRICS, POST_SETUP, SIMULATION_END, TIME_STEP,
    TIME_STEP_CLEANUP, TIME_STEP_PREPARE,
};
pub use lifecycle::{LifecycleManager, LifecyclePhase};
pub use population::{
    Column, CompareOp, Comparison, PopulationTable, PopulationUpdater, Predicate, ScalarValue,
    SimulantIndex, ALIVE_COLUMN,
};
pub use randomness::{ChoiceWeight, ChoiceWeights, RandomnessManager, RandomnessStream};
pub use resource::{ResourceGraph, ResourceKind, ResourceProducer, ResourceRef};
pub use results::{Aggregator, Observation, ResultsContext, Stratification};
pub use time::SimulationClock;
pub use values::{PostProcessor, ValuesManager};
