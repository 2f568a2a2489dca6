//! Lifecycle and domain events.
//!
//! The main loop emits a fixed sequence of events each time step, in order:
//! prepare, the step itself, cleanup, then metric collection. Components
//! subscribe during setup with a priority in `0..=9`; within one event,
//! listeners run in ascending priority with registration order breaking
//! ties, so dispatch is deterministic for a fixed component list.
//!
//! Components can also emit their own events while handling one (a
//! healthcare-access module announcing that simulants showed up to an
//! appointment). Those land on a queue the engine drains after the current
//! dispatch, so a listener set never changes under a running dispatch.

use chrono::NaiveDate;
use indexmap::IndexMap;

use ceam_foundation::{ComponentId, EventId};

use crate::error::{Error, Result};
use crate::lifecycle::{LifecycleManager, LifecyclePhase};
use crate::population::SimulantIndex;

/// Emitted before each time step; components stage state here.
pub const TIME_STEP_PREPARE: &str = "time_step__prepare";
/// The time step proper; most model dynamics listen here.
pub const TIME_STEP: &str = "time_step";
/// Emitted after each time step; components finish bookkeeping here.
pub const TIME_STEP_CLEANUP: &str = "time_step__cleanup";
/// Emitted last in each step; observations are recorded here.
pub const COLLECT_METRICS: &str = "collect_metrics";
/// Emitted once after setup completes.
pub const POST_SETUP: &str = "post_setup";
/// Emitted once when the clock runs out.
pub const SIMULATION_END: &str = "simulation_end";

/// The default listener priority.
pub const DEFAULT_PRIORITY: u8 = 5;

/// A dispatched event: what happened, to whom, and when.
#[derive(Debug, Clone)]
pub struct Event {
    /// The event name.
    pub id: EventId,
    /// Simulants the event concerns.
    pub index: SimulantIndex,
    /// Simulation date at emission.
    pub time: NaiveDate,
    /// Step size of the emitting clock, in days.
    pub step_size_days: i64,
}

impl Event {
    /// Build an event.
    pub fn new(
        id: impl Into<EventId>,
        index: SimulantIndex,
        time: NaiveDate,
        step_size_days: i64,
    ) -> Self {
        Self {
            id: id.into(),
            index,
            time,
            step_size_days,
        }
    }

    /// The same event narrowed to a sub-population.
    pub fn split(&self, index: SimulantIndex) -> Self {
        Self {
            id: self.id.clone(),
            index,
            time: self.time,
            step_size_days: self.step_size_days,
        }
    }
}

#[derive(Debug, Clone)]
struct Listener {
    component: ComponentId,
    priority: u8,
    order: usize,
}

/// Listener registry plus the derived-event queue.
#[derive(Debug, Default)]
pub struct EventManager {
    listeners: IndexMap<EventId, Vec<Listener>>,
    queue: Vec<Event>,
}

impl EventManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a component to an event. Setup phase only.
    pub fn register_listener(
        &mut self,
        lifecycle: &LifecycleManager,
        event: impl Into<EventId>,
        component: ComponentId,
        priority: u8,
    ) -> Result<()> {
        let event = event.into();
        lifecycle.require(
            LifecyclePhase::Setup,
            &format!("register listener for '{event}'"),
        )?;
        if priority > 9 {
            return Err(Error::ComponentConfig(format!(
                "listener priority {priority} for '{event}' is outside 0..=9"
            )));
        }
        let listeners = self.listeners.entry(event).or_default();
        let order = listeners.len();
        listeners.push(Listener {
            component,
            priority,
            order,
        });
        listeners.sort_by_key(|l| (l.priority, l.order));
        Ok(())
    }

    /// Components subscribed to an event, in dispatch order.
    pub fn listeners_for(&self, event: &EventId) -> Vec<ComponentId> {
        self.listeners
            .get(event)
            .map(|ls| ls.iter().map(|l| l.component.clone()).collect())
            .unwrap_or_default()
    }

    /// Event names with at least one listener.
    pub fn subscribed_events(&self) -> impl Iterator<Item = &EventId> {
        self.listeners.keys()
    }

    /// Queue a derived event for dispatch after the current one finishes.
    pub fn emit(&mut self, event: Event) {
        self.queue.push(event);
    }

    /// Take everything off the derived-event queue.
    pub fn drain_queue(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn setup_lifecycle() -> LifecycleManager {
        LifecycleManager::new()
    }

    #[test]
    fn test_dispatch_order_is_priority_then_registration() {
        let lifecycle = setup_lifecycle();
        let mut events = EventManager::new();
        events
            .register_listener(&lifecycle, TIME_STEP, ComponentId::from("c"), 7)
            .unwrap();
        events
            .register_listener(&lifecycle, TIME_STEP, ComponentId::from("a"), 5)
            .unwrap();
        events
            .register_listener(&lifecycle, TIME_STEP, ComponentId::from("b"), 5)
            .unwrap();

        assert_eq!(
            events.listeners_for(&EventId::from(TIME_STEP)),
            vec![
                ComponentId::from("a"),
                ComponentId::from("b"),
                ComponentId::from("c"),
            ]
        );
    }

    #[test]
    fn test_out_of_range_priority_rejected() {
        let lifecycle = setup_lifecycle();
        let mut events = EventManager::new();
        let err = events
            .register_listener(&lifecycle, TIME_STEP, ComponentId::from("eager"), 10)
            .unwrap_err();
        assert!(matches!(err, Error::ComponentConfig(_)));
    }

    #[test]
    fn test_registration_rejected_after_setup() {
        let mut lifecycle = setup_lifecycle();
        lifecycle.advance_to(LifecyclePhase::MainLoop).unwrap();

        let mut events = EventManager::new();
        assert!(events
            .register_listener(&lifecycle, TIME_STEP, ComponentId::from("late"), 5)
            .is_err());
    }

    #[test]
    fn test_derived_events_queue_until_drained() {
        let mut events = EventManager::new();
        let time = NaiveDate::from_ymd_opt(2005, 1, 1).unwrap();
        events.emit(Event::new(
            "general_healthcare_access",
            SimulantIndex::new(vec![1, 2]),
            time,
            30,
        ));
        events.emit(Event::new(
            "followup_healthcare_access",
            SimulantIndex::new(vec![3]),
            time,
            30,
        ));

        let drained = events.drain_queue();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id, EventId::from("general_healthcare_access"));
        assert!(events.drain_queue().is_empty());
    }

    #[test]
    fn test_split_narrows_index_only() {
        let time = NaiveDate::from_ymd_opt(2005, 1, 1).unwrap();
        let event = Event::new(TIME_STEP, SimulantIndex::from_range(0..10), time, 30);
        let narrowed = event.split(SimulantIndex::new(vec![4]));
        assert_eq!(narrowed.id, event.id);
        assert_eq!(narrowed.time, event.time);
        assert_eq!(narrowed.index, SimulantIndex::new(vec![4]));
    }
}
