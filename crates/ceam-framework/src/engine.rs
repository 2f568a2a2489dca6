//! The simulation engine.
//!
//! [`SimulationContext`] owns every manager and drives the lifecycle: apply
//! configuration defaults, set up managers then components, create the
//! initial population in dependency order, run the main loop, finalize, and
//! report. Components see the rest of the simulation only through two narrow
//! windows: a [`Builder`] during setup and an [`EventContext`] during
//! dispatch.
//!
//! Each time step emits four events in a fixed order: prepare, the step
//! itself, cleanup, then metric collection. Events a component emits while
//! handling one are dispatched after the current event's listeners finish,
//! in emission order.
//!
//! # Key Types
//!
//! - [`SimulationContext`] - Owns the managers, drives the lifecycle
//! - [`Builder`] - Registration interface handed to component setup
//! - [`EventContext`] - Simulation access handed to event listeners
//! - [`run_simulation`] - The whole lifecycle in one call

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use serde_json::json;
use tracing::{debug, info, warn};

use ceam_foundation::{ColumnId, ComponentId, EventId, PipelineId, StreamId};

use crate::component::{find_component, Component, ComponentManager};
use crate::config::{ConfigLayer, ConfigTree};
use crate::error::{Error, Result};
use crate::event::{
    Event, EventManager, COLLECT_METRICS, POST_SETUP, SIMULATION_END, TIME_STEP,
    TIME_STEP_CLEANUP, TIME_STEP_PREPARE,
};
use crate::lifecycle::{LifecycleManager, LifecyclePhase};
use crate::population::{
    Column, InitializerRegistration, PopulationManager, PopulationTable, PopulationUpdater,
    SimulantIndex, ALIVE_COLUMN,
};
use crate::randomness::{RandomnessManager, RandomnessStream};
use crate::resource::{ResourceGraph, ResourceKind, ResourceProducer, ResourceRef};
use crate::results::{Observation, ResultsContext, Stratification};
use crate::time::SimulationClock;
use crate::values::{PostProcessor, ValueModifier, ValueSource, ValuesManager};

static SIMULATION_COUNT: AtomicU64 = AtomicU64::new(0);

fn next_simulation_name() -> String {
    let n = SIMULATION_COUNT.fetch_add(1, Ordering::Relaxed) + 1;
    format!("simulation_{n}")
}

/// Registration interface handed to [`Component::setup`].
///
/// All registrations are attributed to the component currently being set up
/// and are only valid during the setup phase.
pub struct Builder<'a> {
    current: ComponentId,
    config: &'a ConfigTree,
    lifecycle: &'a LifecycleManager,
    clock: &'a SimulationClock,
    component_names: &'a [ComponentId],
    population: &'a mut PopulationManager,
    randomness: &'a mut RandomnessManager,
    resources: &'a mut ResourceGraph,
    values: &'a mut ValuesManager,
    events: &'a mut EventManager,
    results: &'a mut ResultsContext,
}

impl<'a> Builder<'a> {
    /// The resolved configuration.
    pub fn config(&self) -> &ConfigTree {
        self.config
    }

    /// The simulation clock.
    pub fn clock(&self) -> &SimulationClock {
        self.clock
    }

    /// Names of every component in the simulation, in registration order.
    pub fn components(&self) -> &[ComponentId] {
        self.component_names
    }

    /// Get a common-random-number stream, registering it as a resource.
    pub fn get_stream(&mut self, key: impl Into<StreamId>) -> Result<RandomnessStream> {
        let key = key.into();
        self.lifecycle
            .require(LifecyclePhase::Setup, &format!("get stream '{key}'"))?;
        self.resources.add_producer(ResourceProducer {
            component: self.current.clone(),
            kind: ResourceKind::Stream,
            names: vec![key.as_str()],
            dependencies: Vec::new(),
        })?;
        Ok(self.randomness.get_stream(key))
    }

    /// Declare that this component initializes population columns.
    ///
    /// `creates` are the columns the component's
    /// [`Component::on_initialize_simulants`] will append; `requires` are the
    /// resources it reads, which fix its place in the initialization order.
    pub fn initializes_simulants(
        &mut self,
        creates: Vec<ColumnId>,
        requires: Vec<ResourceRef>,
    ) -> Result<()> {
        self.lifecycle
            .require(LifecyclePhase::Setup, "register simulant initializer")?;
        self.resources.add_producer(ResourceProducer {
            component: self.current.clone(),
            kind: ResourceKind::Column,
            names: creates.iter().map(|c| c.as_str()).collect(),
            dependencies: requires.clone(),
        })?;
        self.population.register_initializer(InitializerRegistration {
            component: self.current.clone(),
            creates,
            requires,
        });
        Ok(())
    }

    /// Register the source of a value pipeline.
    pub fn register_value_producer(
        &mut self,
        name: impl Into<PipelineId>,
        post_processor: PostProcessor,
        requires: Vec<ResourceRef>,
        source: ValueSource,
    ) -> Result<()> {
        let name = name.into();
        self.lifecycle.require(
            LifecyclePhase::Setup,
            &format!("register value producer '{name}'"),
        )?;
        self.resources.add_producer(ResourceProducer {
            component: self.current.clone(),
            kind: ResourceKind::ValueSource,
            names: vec![name.as_str()],
            dependencies: requires,
        })?;
        self.values
            .register_producer(name, self.current.clone(), post_processor, source)
    }

    /// Register a modifier on a value pipeline.
    pub fn register_value_modifier(
        &mut self,
        name: impl Into<PipelineId>,
        priority: u8,
        requires: Vec<ResourceRef>,
        modifier: ValueModifier,
    ) -> Result<()> {
        let name = name.into();
        self.lifecycle.require(
            LifecyclePhase::Setup,
            &format!("register value modifier on '{name}'"),
        )?;
        self.resources.add_producer(ResourceProducer {
            component: self.current.clone(),
            kind: ResourceKind::ValueModifier,
            names: vec![format!("{name}.{}", self.current)],
            dependencies: requires,
        })?;
        self.values
            .register_modifier(name, self.current.clone(), priority, modifier);
        Ok(())
    }

    /// Subscribe this component to an event.
    pub fn register_event_listener(
        &mut self,
        event: impl Into<EventId>,
        priority: u8,
    ) -> Result<()> {
        self.events
            .register_listener(self.lifecycle, event, self.current.clone(), priority)
    }

    /// Set the stratifications observations get by default.
    pub fn set_default_stratifications(
        &mut self,
        defaults: Vec<ceam_foundation::StratificationId>,
    ) -> Result<()> {
        self.lifecycle
            .require(LifecyclePhase::Setup, "set default stratifications")?;
        self.results.set_default_stratifications(defaults)
    }

    /// Register a results stratification.
    pub fn add_stratification(&mut self, stratification: Stratification) -> Result<()> {
        self.lifecycle
            .require(LifecyclePhase::Setup, "register stratification")?;
        self.results.add_stratification(stratification)
    }

    /// Register a results observation.
    ///
    /// An observation with no explicit stratifications picks up the defaults
    /// when they are set.
    pub fn register_observation(&mut self, mut observation: Observation) -> Result<()> {
        self.lifecycle
            .require(LifecyclePhase::Setup, "register observation")?;
        if observation.stratifications.is_empty() {
            if let Some(defaults) = self.results.default_stratifications() {
                observation.stratifications = defaults.to_vec();
            }
        }
        self.results.register_observation(observation)
    }
}

/// Simulation access handed to [`Component::on_event`].
pub struct EventContext<'a> {
    /// The population state table.
    pub population: &'a mut PopulationTable,
    values: &'a ValuesManager,
    events: &'a mut EventManager,
    clock: &'a SimulationClock,
}

impl<'a> EventContext<'a> {
    /// The current simulation date.
    pub fn time(&self) -> NaiveDate {
        self.clock.time()
    }

    /// The clock's step size in days.
    pub fn step_size_days(&self) -> i64 {
        self.clock.step_size_days()
    }

    /// Compute a value pipeline over an index.
    pub fn get_value(&self, name: &PipelineId, index: &SimulantIndex) -> Result<Vec<f64>> {
        self.values.produce(
            name,
            self.population,
            index,
            self.clock.time(),
            self.clock.step_size_days(),
        )
    }

    /// Emit a derived event, dispatched after the current one finishes.
    pub fn emit(&mut self, id: impl Into<EventId>, index: SimulantIndex) {
        self.events.emit(Event::new(
            id,
            index,
            self.clock.time(),
            self.clock.step_size_days(),
        ));
    }
}

/// A complete simulation: managers, components and lifecycle state.
pub struct SimulationContext {
    name: String,
    config: ConfigTree,
    lifecycle: LifecycleManager,
    clock: Option<SimulationClock>,
    randomness: Option<RandomnessManager>,
    components: ComponentManager,
    population: PopulationManager,
    resources: ResourceGraph,
    values: ValuesManager,
    events: EventManager,
    results: ResultsContext,
}

impl std::fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationContext")
            .field("name", &self.name)
            .field("phase", &self.lifecycle.current())
            .field("components", &self.components.len())
            .field("population", &self.population.table().len())
            .finish()
    }
}

impl SimulationContext {
    /// Create a simulation with a generated unique name.
    pub fn new(config: ConfigTree, components: Vec<Box<dyn Component>>) -> Result<Self> {
        Self::with_name(next_simulation_name(), config, components)
    }

    /// Create a simulation with a caller-supplied name.
    pub fn with_name(
        name: impl Into<String>,
        mut config: ConfigTree,
        components: Vec<Box<dyn Component>>,
    ) -> Result<Self> {
        config.update_layer(
            json!({"randomness": {"seed": 0}}),
            ConfigLayer::Base,
            "framework",
        )?;

        let mut manager = ComponentManager::new();
        for component in components {
            manager.add(component)?;
        }

        Ok(Self {
            name: name.into(),
            config,
            lifecycle: LifecycleManager::new(),
            clock: None,
            randomness: None,
            components: manager,
            population: PopulationManager::new(),
            resources: ResourceGraph::new(),
            values: ValuesManager::new(),
            events: EventManager::new(),
            results: ResultsContext::new(),
        })
    }

    /// The simulation's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> LifecyclePhase {
        self.lifecycle.current()
    }

    /// The resolved configuration.
    pub fn config(&self) -> &ConfigTree {
        &self.config
    }

    /// The population state table.
    pub fn population(&self) -> &PopulationTable {
        self.population.table()
    }

    /// The results context.
    pub fn results(&self) -> &ResultsContext {
        &self.results
    }

    /// The simulation clock. Available once setup has run.
    pub fn clock(&self) -> Result<&SimulationClock> {
        self.clock
            .as_ref()
            .ok_or_else(|| Error::ComponentConfig("clock accessed before setup".to_string()))
    }

    fn randomness(&self) -> Result<&RandomnessManager> {
        self.randomness
            .as_ref()
            .ok_or_else(|| Error::ComponentConfig("randomness accessed before setup".to_string()))
    }

    /// Apply defaults, set up managers then components, emit `post_setup`.
    pub fn setup(&mut self) -> Result<()> {
        self.lifecycle.require(LifecyclePhase::Setup, "setup")?;
        info!(simulation = %self.name, components = self.components.len(), "setting up");

        // Component defaults land in the component_configs layer, below the
        // model override, before any component reads configuration.
        let mut components = self.components.take_all();
        for component in &components {
            if let Some(defaults) = component.configuration_defaults() {
                let source = component.name().as_str();
                self.config
                    .update_layer(defaults, ConfigLayer::ComponentConfigs, &source)?;
            }
        }

        // Managers before components: clock, then randomness.
        let clock = SimulationClock::from_config(&self.config)?;
        let mut randomness = RandomnessManager::from_config(&self.config)?;

        let component_names: Vec<ComponentId> =
            components.iter().map(|c| c.name()).collect();
        let mut setup_result = Ok(());
        for component in &mut components {
            let mut builder = Builder {
                current: component.name(),
                config: &self.config,
                lifecycle: &self.lifecycle,
                clock: &clock,
                component_names: &component_names,
                population: &mut self.population,
                randomness: &mut randomness,
                resources: &mut self.resources,
                values: &mut self.values,
                events: &mut self.events,
                results: &mut self.results,
            };
            setup_result = component.setup(&mut builder);
            if setup_result.is_err() {
                break;
            }
        }
        self.components.restore(components);
        setup_result?;

        for pipeline in self.values.unsourced() {
            warn!(pipeline = %pipeline, "value pipeline has modifiers but no source");
        }
        self.results.finalize_registration()?;

        self.clock = Some(clock);
        self.randomness = Some(randomness);

        self.lifecycle.advance_to(LifecyclePhase::PostSetup)?;
        let event = {
            let clock = self.clock()?;
            Event::new(
                POST_SETUP,
                SimulantIndex::default(),
                clock.time(),
                clock.step_size_days(),
            )
        };
        self.dispatch(event)?;
        info!(simulation = %self.name, "setup complete");
        Ok(())
    }

    /// Create the initial population without advancing the clock.
    ///
    /// Initializers run in resource-dependency order; afterwards every
    /// declared column must cover every simulant.
    pub fn initialize_simulants(&mut self) -> Result<()> {
        self.lifecycle
            .require(LifecyclePhase::PostSetup, "initialize simulants")?;
        self.lifecycle.advance_to(LifecyclePhase::Initialization)?;

        let size = self.config.get_u64("population.population_size")? as usize;
        let order = self.resources.initialization_order()?;
        info!(simulation = %self.name, size, initializers = order.len(), "creating population");

        let new_index = self.population.table_mut().grow(size);
        let mut components = self.components.take_all();
        let mut init_result = Ok(());
        for component_id in &order {
            let Some(registration) = self.population.initializer_for(component_id) else {
                continue;
            };
            let creates = registration.creates.clone();
            let Some(component) = find_component(&mut components, component_id) else {
                warn!(component = %component_id, "initializer registered by unknown component");
                continue;
            };
            let mut updater =
                PopulationUpdater::new(self.population.table_mut(), component_id, &creates);
            init_result = component.on_initialize_simulants(&new_index, &mut updater);
            if init_result.is_err() {
                break;
            }
        }
        self.components.restore(components);
        init_result?;

        self.population.table().validate_complete()?;
        self.lifecycle.advance_to(LifecyclePhase::MainLoop)?;
        Ok(())
    }

    /// Execute one time step: the four step events in order, then advance
    /// the clock.
    pub fn step(&mut self) -> Result<()> {
        self.lifecycle.require(LifecyclePhase::MainLoop, "step")?;
        let (time, step_size_days) = {
            let clock = self.clock()?;
            (clock.time(), clock.step_size_days())
        };
        debug!(simulation = %self.name, time = %time, "executing time step");

        let index = self.population.table().full_index();
        for event_id in [TIME_STEP_PREPARE, TIME_STEP, TIME_STEP_CLEANUP, COLLECT_METRICS] {
            self.dispatch(Event::new(event_id, index.clone(), time, step_size_days))?;
        }

        if let Some(clock) = self.clock.as_mut() {
            clock.step_forward();
        }
        Ok(())
    }

    /// Step until the clock reaches the end date.
    pub fn run(&mut self) -> Result<()> {
        self.lifecycle.require(LifecyclePhase::MainLoop, "run")?;
        while !self.clock()?.is_finished() {
            self.step()?;
        }
        Ok(())
    }

    /// Emit `simulation_end`.
    pub fn finalize(&mut self) -> Result<()> {
        self.lifecycle.advance_to(LifecyclePhase::Finalization)?;
        let event = {
            let clock = self.clock()?;
            Event::new(
                SIMULATION_END,
                self.population.table().full_index(),
                clock.time(),
                clock.step_size_days(),
            )
        };
        self.dispatch(event)?;
        info!(simulation = %self.name, "simulation finished");
        Ok(())
    }

    /// Write results CSVs under `results_root`.
    pub fn report(&mut self, results_root: &Path) -> Result<()> {
        self.lifecycle.advance_to(LifecyclePhase::Report)?;
        let randomness = self.randomness()?;
        self.results.report(
            results_root,
            randomness.base_seed(),
            randomness.input_draw(),
        )?;
        info!(simulation = %self.name, results = %results_root.display(), "results written");
        Ok(())
    }

    /// Dispatch an event to its listeners, gather any observations on it,
    /// then dispatch events the listeners emitted, in emission order.
    fn dispatch(&mut self, event: Event) -> Result<()> {
        let mut pending = VecDeque::new();
        pending.push_back(event);

        while let Some(event) = pending.pop_front() {
            let listeners = self.events.listeners_for(&event.id);
            let mut components = self.components.take_all();
            let mut dispatch_result = Ok(());
            for listener in &listeners {
                let Some(component) = find_component(&mut components, listener) else {
                    warn!(component = %listener, event = %event.id, "listener component not found");
                    continue;
                };
                let clock = match self.clock.as_ref() {
                    Some(clock) => clock,
                    None => {
                        dispatch_result = Err(Error::ComponentConfig(
                            "event dispatched before setup".to_string(),
                        ));
                        break;
                    }
                };
                let mut ctx = EventContext {
                    population: self.population.table_mut(),
                    values: &self.values,
                    events: &mut self.events,
                    clock,
                };
                dispatch_result = component.on_event(&event, &mut ctx);
                if dispatch_result.is_err() {
                    break;
                }
            }
            self.components.restore(components);
            dispatch_result?;

            self.results
                .gather_results(self.population.table(), &event)?;
            pending.extend(self.events.drain_queue());
        }
        Ok(())
    }
}

/// Run a complete simulation: setup, initialize, main loop, finalize, and
/// optionally report.
pub fn run_simulation(
    config: ConfigTree,
    components: Vec<Box<dyn Component>>,
    results_root: Option<&Path>,
) -> Result<SimulationContext> {
    let mut simulation = SimulationContext::new(config, components)?;
    simulation.setup()?;
    simulation.initialize_simulants()?;
    simulation.run()?;
    simulation.finalize()?;
    if let Some(root) = results_root {
        simulation.report(root)?;
    }
    Ok(simulation)
}

/// A demographics-style helper: append the standard `alive` column for new
/// simulants, all living.
pub fn initialize_alive(updater: &mut PopulationUpdater<'_>, count: usize) -> Result<()> {
    updater.append_column(
        ColumnId::from(ALIVE_COLUMN),
        Column::Bool(vec![true; count]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{CompareOp, Predicate, ScalarValue};
    use crate::results::Aggregator;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn test_config() -> ConfigTree {
        ConfigTree::from_overrides(
            json!({
                "time": {"start": "2005-01-01", "end": "2005-03-02", "step_size": 30},
                "population": {"population_size": 100},
                "randomness": {"seed": 7},
            }),
            "test",
        )
        .unwrap()
    }

    /// Creates `age` and `alive`, bumps age each step, records every event
    /// it sees.
    struct Aging {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Component for Aging {
        fn name(&self) -> ComponentId {
            ComponentId::from("aging")
        }

        fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
            builder.initializes_simulants(
                vec![ColumnId::from("age"), ColumnId::from(ALIVE_COLUMN)],
                vec![],
            )?;
            for event in [
                POST_SETUP,
                TIME_STEP_PREPARE,
                TIME_STEP,
                TIME_STEP_CLEANUP,
                COLLECT_METRICS,
                SIMULATION_END,
            ] {
                builder.register_event_listener(event, 5)?;
            }
            Ok(())
        }

        fn on_initialize_simulants(
            &mut self,
            index: &SimulantIndex,
            population: &mut PopulationUpdater<'_>,
        ) -> Result<()> {
            population.append_column(
                ColumnId::from("age"),
                Column::F64(vec![40.0; index.len()]),
            )?;
            initialize_alive(population, index.len())
        }

        fn on_event(&mut self, event: &Event, ctx: &mut EventContext<'_>) -> Result<()> {
            self.log.lock().unwrap().push(event.id.as_str());
            if event.id == EventId::from(TIME_STEP) {
                let ages: Vec<f64> = ctx
                    .population
                    .f64s(&ColumnId::from("age"))?
                    .iter()
                    .map(|a| a + event.step_size_days as f64 / 365.0)
                    .collect();
                ctx.population
                    .set_f64(&ColumnId::from("age"), &event.index, &ages)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_lifecycle_event_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let simulation = run_simulation(
            test_config(),
            vec![Box::new(Aging { log: log.clone() })],
            None,
        )
        .unwrap();
        assert_eq!(simulation.phase(), LifecyclePhase::Finalization);

        let log = log.lock().unwrap();
        // 60 days / 30-day steps = 2 steps of 4 events each.
        let mut expected = vec![POST_SETUP.to_string()];
        for _ in 0..2 {
            expected.extend(
                [TIME_STEP_PREPARE, TIME_STEP, TIME_STEP_CLEANUP, COLLECT_METRICS]
                    .map(String::from),
            );
        }
        expected.push(SIMULATION_END.to_string());
        assert_eq!(*log, expected);
    }

    #[test]
    fn test_ages_advance_with_the_clock() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let simulation =
            run_simulation(test_config(), vec![Box::new(Aging { log })], None).unwrap();

        let ages = simulation
            .population()
            .f64s(&ColumnId::from("age"))
            .unwrap();
        assert_eq!(ages.len(), 100);
        let expected = 40.0 + 2.0 * 30.0 / 365.0;
        assert!((ages[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_simulation_names_are_unique() {
        let a = SimulationContext::new(test_config(), vec![]).unwrap();
        let b = SimulationContext::new(test_config(), vec![]).unwrap();
        assert_ne!(a.name(), b.name());
        assert!(a.name().starts_with("simulation_"));

        let named =
            SimulationContext::with_name("bp_screening", test_config(), vec![]).unwrap();
        assert_eq!(named.name(), "bp_screening");
    }

    #[test]
    fn test_lifecycle_methods_enforce_phase() {
        let mut simulation = SimulationContext::new(test_config(), vec![]).unwrap();
        assert!(matches!(
            simulation.step(),
            Err(Error::PhaseViolation { .. })
        ));
        assert!(matches!(
            simulation.initialize_simulants(),
            Err(Error::PhaseViolation { .. })
        ));

        simulation.setup().unwrap();
        assert!(matches!(
            simulation.setup(),
            Err(Error::PhaseViolation { .. })
        ));
    }

    /// Declares a column and never fills it.
    struct Negligent;

    impl Component for Negligent {
        fn name(&self) -> ComponentId {
            ComponentId::from("negligent")
        }

        fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
            builder.initializes_simulants(vec![ColumnId::from("forgotten")], vec![])
        }
    }

    #[test]
    fn test_unfilled_declared_column_fails_initialization() {
        let mut simulation =
            SimulationContext::new(test_config(), vec![Box::new(Negligent)]).unwrap();
        simulation.setup().unwrap();
        assert!(simulation.initialize_simulants().is_err());
    }

    /// Writes a column it never declared.
    struct Trespasser;

    impl Component for Trespasser {
        fn name(&self) -> ComponentId {
            ComponentId::from("trespasser")
        }

        fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
            builder.initializes_simulants(vec![ColumnId::from(ALIVE_COLUMN)], vec![])
        }

        fn on_initialize_simulants(
            &mut self,
            index: &SimulantIndex,
            population: &mut PopulationUpdater<'_>,
        ) -> Result<()> {
            population.append_column(
                ColumnId::from("undeclared"),
                Column::F64(vec![0.0; index.len()]),
            )
        }
    }

    #[test]
    fn test_undeclared_column_write_rejected() {
        let mut simulation =
            SimulationContext::new(test_config(), vec![Box::new(Trespasser)]).unwrap();
        simulation.setup().unwrap();
        let err = simulation.initialize_simulants().unwrap_err();
        assert!(matches!(err, Error::UndeclaredColumn { .. }));
    }

    /// Emits a derived event on each step; a second listener counts them.
    struct Emitter;

    impl Component for Emitter {
        fn name(&self) -> ComponentId {
            ComponentId::from("emitter")
        }

        fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
            builder.initializes_simulants(vec![ColumnId::from(ALIVE_COLUMN)], vec![])?;
            builder.register_event_listener(TIME_STEP, 5)
        }

        fn on_initialize_simulants(
            &mut self,
            index: &SimulantIndex,
            population: &mut PopulationUpdater<'_>,
        ) -> Result<()> {
            initialize_alive(population, index.len())
        }

        fn on_event(&mut self, event: &Event, ctx: &mut EventContext<'_>) -> Result<()> {
            ctx.emit("appointment", event.index.clone());
            Ok(())
        }
    }

    struct Counter {
        seen: Arc<Mutex<usize>>,
    }

    impl Component for Counter {
        fn name(&self) -> ComponentId {
            ComponentId::from("counter")
        }

        fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
            builder.register_event_listener("appointment", 5)
        }

        fn on_event(&mut self, event: &Event, _ctx: &mut EventContext<'_>) -> Result<()> {
            *self.seen.lock().unwrap() += event.index.len();
            Ok(())
        }
    }

    #[test]
    fn test_derived_events_reach_listeners() {
        let seen = Arc::new(Mutex::new(0));
        run_simulation(
            test_config(),
            vec![
                Box::new(Emitter),
                Box::new(Counter { seen: seen.clone() }),
            ],
            None,
        )
        .unwrap();
        // 100 simulants per step, 2 steps.
        assert_eq!(*seen.lock().unwrap(), 200);
    }

    #[test]
    fn test_observations_flow_into_report() {
        struct Observer;

        impl Component for Observer {
            fn name(&self) -> ComponentId {
                ComponentId::from("observer")
            }

            fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
                builder.register_observation(
                    Observation::new("living_simulant_steps", Aggregator::Count).with_filter(
                        Predicate::single(ALIVE_COLUMN, CompareOp::Eq, ScalarValue::Bool(true)),
                    ),
                )
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut simulation = run_simulation(
            test_config(),
            vec![Box::new(Aging { log }), Box::new(Observer)],
            None,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        simulation.report(dir.path()).unwrap();
        let text =
            std::fs::read_to_string(dir.path().join("living_simulant_steps.csv")).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "group,measure,random_seed,input_draw,value"
        );
        // 100 living simulants observed on each of 2 collect_metrics events.
        assert_eq!(
            lines.next().unwrap(),
            "all,living_simulant_steps,7,0,200"
        );
    }
}
