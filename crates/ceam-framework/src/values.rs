//! Dynamic value pipelines.
//!
//! A pipeline is a named, cross-component value: one component registers the
//! source, any number of others register modifiers, and consumers ask for
//! the combined result without knowing who contributed. An intervention that
//! halves treatment costs is a modifier on the `treatment_cost` pipeline; the
//! module that bills treatment neither knows nor cares that the intervention
//! exists.
//!
//! Rate pipelines carry annualized rates. Sources and modifiers work in
//! annual space; the rate post-processor rescales the final values to the
//! clock's step size.

use chrono::NaiveDate;
use indexmap::IndexMap;

use ceam_foundation::{ComponentId, PipelineId};

use crate::error::{Error, Result};
use crate::population::{PopulationTable, SimulantIndex};

/// Produces a pipeline's base values, one per simulant in the index.
pub type ValueSource =
    Box<dyn Fn(&PopulationTable, &SimulantIndex, NaiveDate) -> Result<Vec<f64>> + Send + Sync>;

/// Transforms a pipeline's values on their way to the consumer.
pub type ValueModifier = Box<
    dyn Fn(Vec<f64>, &PopulationTable, &SimulantIndex, NaiveDate) -> Result<Vec<f64>>
        + Send
        + Sync,
>;

/// What happens to a pipeline's combined values before they are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessor {
    /// Values pass through unchanged.
    None,
    /// Values are annualized rates; rescale by `step_days / 365`.
    Rate,
}

const DAYS_PER_YEAR: f64 = 365.0;

struct RegisteredModifier {
    component: ComponentId,
    priority: u8,
    order: usize,
    modify: ValueModifier,
}

/// One named pipeline: a source plus ordered modifiers.
pub struct Pipeline {
    name: PipelineId,
    source: Option<(ComponentId, ValueSource)>,
    modifiers: Vec<RegisteredModifier>,
    post_processor: PostProcessor,
}

impl Pipeline {
    fn new(name: PipelineId, post_processor: PostProcessor) -> Self {
        Self {
            name,
            source: None,
            modifiers: Vec::new(),
            post_processor,
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("sourced", &self.source.is_some())
            .field("modifiers", &self.modifiers.len())
            .field("post_processor", &self.post_processor)
            .finish()
    }
}

/// Registry of value pipelines.
#[derive(Debug, Default)]
pub struct ValuesManager {
    pipelines: IndexMap<PipelineId, Pipeline>,
}

impl ValuesManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the source of a pipeline. A pipeline has exactly one source.
    pub fn register_producer(
        &mut self,
        name: impl Into<PipelineId>,
        component: ComponentId,
        post_processor: PostProcessor,
        source: ValueSource,
    ) -> Result<()> {
        let name = name.into();
        let pipeline = self
            .pipelines
            .entry(name.clone())
            .or_insert_with(|| Pipeline::new(name.clone(), post_processor));
        if let Some((first, _)) = &pipeline.source {
            return Err(Error::DuplicateResource(format!(
                "value source for '{name}' registered by both '{first}' and '{component}'"
            )));
        }
        pipeline.source = Some((component, source));
        pipeline.post_processor = post_processor;
        Ok(())
    }

    /// Register a modifier on a pipeline.
    ///
    /// Modifiers run in ascending `priority` (0 first, 9 last), with
    /// registration order breaking ties. The pipeline need not be sourced
    /// yet; components set up in arbitrary order.
    pub fn register_modifier(
        &mut self,
        name: impl Into<PipelineId>,
        component: ComponentId,
        priority: u8,
        modify: ValueModifier,
    ) {
        let name = name.into();
        let pipeline = self
            .pipelines
            .entry(name.clone())
            .or_insert_with(|| Pipeline::new(name, PostProcessor::None));
        let order = pipeline.modifiers.len();
        pipeline.modifiers.push(RegisteredModifier {
            component,
            priority,
            order,
            modify,
        });
        pipeline
            .modifiers
            .sort_by_key(|m| (m.priority, m.order));
    }

    /// Whether the pipeline has a registered source.
    pub fn is_sourced(&self, name: &PipelineId) -> bool {
        self.pipelines
            .get(name)
            .is_some_and(|p| p.source.is_some())
    }

    /// Pipelines with modifiers but no source. Checked after setup; asking
    /// such a pipeline for values would fail anyway, but failing at
    /// validation names the problem before the simulation invests any time.
    pub fn unsourced(&self) -> Vec<PipelineId> {
        self.pipelines
            .values()
            .filter(|p| p.source.is_none())
            .map(|p| p.name.clone())
            .collect()
    }

    /// The component that sourced each pipeline, with its modifier owners.
    pub fn registrations(&self) -> impl Iterator<Item = (&PipelineId, Option<&ComponentId>, Vec<&ComponentId>)> {
        self.pipelines.values().map(|p| {
            (
                &p.name,
                p.source.as_ref().map(|(c, _)| c),
                p.modifiers.iter().map(|m| &m.component).collect(),
            )
        })
    }

    /// Compute a pipeline's values over an index.
    pub fn produce(
        &self,
        name: &PipelineId,
        table: &PopulationTable,
        index: &SimulantIndex,
        time: NaiveDate,
        step_days: i64,
    ) -> Result<Vec<f64>> {
        let pipeline = self
            .pipelines
            .get(name)
            .ok_or_else(|| Error::UnsourcedPipeline(name.clone()))?;
        let (_, source) = pipeline
            .source
            .as_ref()
            .ok_or_else(|| Error::UnsourcedPipeline(name.clone()))?;

        let mut values = source(table, index, time)?;
        if values.len() != index.len() {
            return Err(Error::Values(format!(
                "pipeline '{name}' source produced {} values for an index of {}",
                values.len(),
                index.len()
            )));
        }
        for modifier in &pipeline.modifiers {
            values = (modifier.modify)(values, table, index, time)?;
            if values.len() != index.len() {
                return Err(Error::Values(format!(
                    "pipeline '{name}' modifier from '{}' changed the value count",
                    modifier.component
                )));
            }
        }

        if pipeline.post_processor == PostProcessor::Rate {
            let scale = step_days as f64 / DAYS_PER_YEAR;
            for v in &mut values {
                *v *= scale;
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2005, 1, 1).unwrap()
    }

    fn empty_table_of(len: usize) -> PopulationTable {
        let mut table = PopulationTable::new();
        table.grow(len);
        table
    }

    #[test]
    fn test_source_then_modifiers_in_priority_order() {
        let mut values = ValuesManager::new();
        values
            .register_producer(
                "treatment_cost",
                ComponentId::from("treatment"),
                PostProcessor::None,
                Box::new(|_, index, _| Ok(vec![100.0; index.len()])),
            )
            .unwrap();
        // Registered first but priority 9: runs last.
        values.register_modifier(
            "treatment_cost",
            ComponentId::from("late"),
            9,
            Box::new(|v, _, _, _| Ok(v.into_iter().map(|x| x + 1.0).collect())),
        );
        values.register_modifier(
            "treatment_cost",
            ComponentId::from("intervention"),
            5,
            Box::new(|v, _, _, _| Ok(v.into_iter().map(|x| x * 0.5).collect())),
        );

        let table = empty_table_of(3);
        let out = values
            .produce(
                &PipelineId::from("treatment_cost"),
                &table,
                &table.full_index(),
                date(),
                30,
            )
            .unwrap();
        // (100 * 0.5) + 1, not (100 + 1) * 0.5.
        assert_eq!(out, vec![51.0, 51.0, 51.0]);
    }

    #[test]
    fn test_rate_pipeline_rescales_to_step_size() {
        let mut values = ValuesManager::new();
        values
            .register_producer(
                "mortality_rate",
                ComponentId::from("mortality"),
                PostProcessor::Rate,
                Box::new(|_, index, _| Ok(vec![0.365; index.len()])),
            )
            .unwrap();

        let table = empty_table_of(2);
        let out = values
            .produce(
                &PipelineId::from("mortality_rate"),
                &table,
                &table.full_index(),
                date(),
                365,
            )
            .unwrap();
        assert_eq!(out, vec![0.365, 0.365]);

        let out = values
            .produce(
                &PipelineId::from("mortality_rate"),
                &table,
                &table.full_index(),
                date(),
                73,
            )
            .unwrap();
        for v in out {
            assert!((v - 0.073).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unsourced_pipeline_is_an_error() {
        let mut values = ValuesManager::new();
        values.register_modifier(
            "orphan_rate",
            ComponentId::from("intervention"),
            5,
            Box::new(|v, _, _, _| Ok(v)),
        );

        assert_eq!(values.unsourced(), vec![PipelineId::from("orphan_rate")]);

        let table = empty_table_of(1);
        let err = values
            .produce(
                &PipelineId::from("orphan_rate"),
                &table,
                &table.full_index(),
                date(),
                30,
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsourcedPipeline(_)));
    }

    #[test]
    fn test_double_source_rejected() {
        let mut values = ValuesManager::new();
        values
            .register_producer(
                "mortality_rate",
                ComponentId::from("a"),
                PostProcessor::Rate,
                Box::new(|_, index, _| Ok(vec![0.0; index.len()])),
            )
            .unwrap();
        let err = values
            .register_producer(
                "mortality_rate",
                ComponentId::from("b"),
                PostProcessor::Rate,
                Box::new(|_, index, _| Ok(vec![0.0; index.len()])),
            )
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateResource(_)));
    }
}
