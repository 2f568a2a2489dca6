//! The component interface and the ordered component registry.
//!
//! A component is a unit of model behavior: it contributes configuration
//! defaults, registers its resources and listeners during setup, initializes
//! the columns it declared, and reacts to events during the main loop. The
//! framework itself knows nothing about blood pressure or screening visits;
//! everything a model does lives behind this trait.

use indexmap::IndexSet;
use serde_json::Value;

use ceam_foundation::ComponentId;

use crate::engine::{Builder, EventContext};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::population::{PopulationUpdater, SimulantIndex};

/// A unit of simulation behavior.
///
/// All methods except [`Component::name`] have do-nothing defaults; a
/// component implements only the lifecycle hooks it cares about.
pub trait Component: Send {
    /// The component's unique name.
    fn name(&self) -> ComponentId;

    /// Configuration defaults merged into the `component_configs` layer
    /// before setup.
    fn configuration_defaults(&self) -> Option<Value> {
        None
    }

    /// Register resources, streams, listeners and observations.
    fn setup(&mut self, builder: &mut Builder<'_>) -> Result<()> {
        let _ = builder;
        Ok(())
    }

    /// Populate declared columns for newly created simulants.
    fn on_initialize_simulants(
        &mut self,
        index: &SimulantIndex,
        population: &mut PopulationUpdater<'_>,
    ) -> Result<()> {
        let _ = (index, population);
        Ok(())
    }

    /// Handle an event this component subscribed to.
    fn on_event(&mut self, event: &Event, ctx: &mut EventContext<'_>) -> Result<()> {
        let _ = (event, ctx);
        Ok(())
    }
}

/// The ordered registry of a simulation's components.
///
/// Components keep their registration order, which fixes dispatch order for
/// equal-priority listeners. Names are unique; two components with the same
/// name would produce colliding resources and configuration sources.
#[derive(Default)]
pub struct ComponentManager {
    components: Vec<Box<dyn Component>>,
    names: IndexSet<ComponentId>,
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.names)
            .finish()
    }
}

impl ComponentManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component. Names are unique.
    pub fn add(&mut self, component: Box<dyn Component>) -> Result<()> {
        let name = component.name();
        if !self.names.insert(name.clone()) {
            return Err(Error::ComponentConfig(format!(
                "component '{name}' is already registered"
            )));
        }
        self.components.push(component);
        Ok(())
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no components are registered.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &ComponentId> {
        self.names.iter()
    }

    /// Whether a component with the name exists.
    pub fn contains(&self, name: &ComponentId) -> bool {
        self.names.contains(name)
    }

    /// Take ownership of the component list for a dispatch pass.
    ///
    /// The engine moves components out while it hands them mutable access to
    /// the rest of the simulation, then puts them back with
    /// [`ComponentManager::restore`].
    pub fn take_all(&mut self) -> Vec<Box<dyn Component>> {
        std::mem::take(&mut self.components)
    }

    /// Return components taken with [`ComponentManager::take_all`].
    pub fn restore(&mut self, components: Vec<Box<dyn Component>>) {
        self.components = components;
    }
}

/// Find a component by name in a taken component list.
pub fn find_component<'a>(
    components: &'a mut [Box<dyn Component>],
    name: &ComponentId,
) -> Option<&'a mut Box<dyn Component>> {
    components.iter_mut().find(|c| &c.name() == name)
}
