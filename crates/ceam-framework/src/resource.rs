//! Resource dependency management.
//!
//! Components create resources - state-table columns, value pipelines,
//! randomness streams - and other components consume them. Because a column
//! must exist before an initializer can read it, initializer execution is
//! ordered by a dependency graph over the registered producers: Kahn's
//! algorithm with deterministic tie-breaking, cycles rejected.
//!
//! A resource has exactly one producer. A dependency on a resource nobody
//! produces is only a warning: plenty of models read columns that an
//! external data layer is expected to provide.

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use ceam_foundation::ComponentId;

use crate::error::{Error, Result};

/// The kinds of resource a component can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A population state-table column.
    Column,
    /// A named value pipeline.
    Value,
    /// The source of a value pipeline.
    ValueSource,
    /// A modifier on a value pipeline.
    ValueModifier,
    /// A randomness stream.
    Stream,
}

impl ResourceKind {
    fn prefix(&self) -> &'static str {
        match self {
            ResourceKind::Column => "column",
            ResourceKind::Value => "value",
            ResourceKind::ValueSource => "value_source",
            ResourceKind::ValueModifier => "value_modifier",
            ResourceKind::Stream => "stream",
        }
    }
}

/// A reference to a resource: kind plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// What kind of resource is referenced.
    pub kind: ResourceKind,
    /// The resource name.
    pub name: String,
}

impl ResourceRef {
    /// Build a reference.
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// A column reference.
    pub fn column(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Column, name)
    }

    /// A stream reference.
    pub fn stream(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Stream, name)
    }

    /// A value pipeline reference.
    pub fn value(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Value, name)
    }

    /// The graph key, e.g. `column.age`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.kind.prefix(), self.name)
    }
}

/// A registered producer of one or more resources.
#[derive(Debug, Clone)]
pub struct ResourceProducer {
    /// The component that owns the producer.
    pub component: ComponentId,
    /// What kind of resources it produces.
    pub kind: ResourceKind,
    /// The produced resource names.
    pub names: Vec<String>,
    /// Resources the producer reads before it can produce.
    pub dependencies: Vec<ResourceRef>,
}

impl ResourceProducer {
    fn keys(&self) -> impl Iterator<Item = String> + '_ {
        let prefix = self.kind.prefix();
        self.names.iter().map(move |n| format!("{prefix}.{n}"))
    }
}

/// Dependency graph over resource producers.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    producers: Vec<ResourceProducer>,
    /// Resource key → index into `producers`.
    resources: IndexMap<String, usize>,
    /// Components that have registered a column producer. A component gets
    /// one initializer, so a second column group from the same component is
    /// rejected.
    column_producers: IndexSet<ComponentId>,
}

impl ResourceGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer.
    pub fn add_producer(&mut self, producer: ResourceProducer) -> Result<()> {
        if producer.kind == ResourceKind::Column
            && !self.column_producers.insert(producer.component.clone())
        {
            return Err(Error::DuplicateResource(format!(
                "component '{}' registered a second column initializer",
                producer.component
            )));
        }

        let idx = self.producers.len();
        for key in producer.keys() {
            if self.resources.contains_key(&key) {
                return Err(Error::DuplicateResource(key));
            }
            self.resources.insert(key, idx);
        }
        self.producers.push(producer);
        Ok(())
    }

    /// Whether any producer claims the resource.
    pub fn is_produced(&self, resource: &ResourceRef) -> bool {
        self.resources.contains_key(&resource.key())
    }

    /// Column producers in dependency order.
    ///
    /// Kahn's algorithm over the producer graph, with ties broken by
    /// producer key for deterministic scheduling. Only column producers are
    /// returned; values and streams do not initialize state but still
    /// participate as dependencies.
    pub fn initialization_order(&self) -> Result<Vec<ComponentId>> {
        if self.producers.is_empty() {
            return Ok(Vec::new());
        }

        // In-degrees from dependencies with a registered producer,
        // deduplicated so a producer depending twice on the same upstream
        // counts once.
        let mut in_degree: Vec<usize> = vec![0; self.producers.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.producers.len()];
        for (idx, producer) in self.producers.iter().enumerate() {
            let mut seen: IndexSet<usize> = IndexSet::new();
            for dep in &producer.dependencies {
                match self.resources.get(&dep.key()) {
                    Some(&dep_idx) if dep_idx != idx => {
                        if seen.insert(dep_idx) {
                            in_degree[idx] += 1;
                            dependents[dep_idx].push(idx);
                        }
                    }
                    Some(_) => {}
                    None => {
                        warn!(
                            resource = %dep.key(),
                            needed_by = %producer.component,
                            "resource is not provided by any component"
                        );
                    }
                }
            }
        }

        let mut ready: Vec<usize> = (0..self.producers.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::new();
        let mut processed = 0;

        while !ready.is_empty() {
            // Sort for determinism.
            ready.sort_by(|&a, &b| self.sort_key(a).cmp(&self.sort_key(b)));
            let mut next = Vec::new();
            for &idx in &ready {
                processed += 1;
                if self.producers[idx].kind == ResourceKind::Column {
                    order.push(self.producers[idx].component.clone());
                }
                for &dep in &dependents[idx] {
                    in_degree[dep] -= 1;
                    if in_degree[dep] == 0 {
                        next.push(dep);
                    }
                }
            }
            ready = next;
        }

        if processed != self.producers.len() {
            let resources = self
                .producers
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .flat_map(|(_, p)| p.keys())
                .collect();
            return Err(Error::CycleDetected { resources });
        }

        Ok(order)
    }

    fn sort_key(&self, idx: usize) -> String {
        self.producers[idx]
            .keys()
            .next()
            .unwrap_or_else(|| self.producers[idx].component.as_str())
    }
}
