//! Stratified results collection.
//!
//! Observers describe what to measure - count the dead, sum the costs - and
//! how to slice it, by registering observations against stratifications.
//! The results context owns one measure table per observation, zero-filled
//! over the full cartesian product of the stratification categories, and
//! adds each gathering into it. Accumulation is monotonic for count and sum
//! measures, so a category nobody hit still reports an honest zero instead
//! of a missing row.
//!
//! # Key Types
//!
//! - [`Stratification`] - Maps simulants to category labels
//! - [`Observation`] - What to measure, when, filtered and sliced how
//! - [`Aggregator`] - How group rows collapse to one number
//! - [`ResultsContext`] - Registration, gathering and CSV reporting

use std::io::Write;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use tracing::info;

use ceam_foundation::{ColumnId, EventId, MeasureId, StratificationId};

use crate::error::{Error, Result};
use crate::event::{Event, COLLECT_METRICS, SIMULATION_END, TIME_STEP, TIME_STEP_CLEANUP, TIME_STEP_PREPARE};
use crate::population::{PopulationTable, Predicate, SimulantIndex};

/// Maps one simulant row to a category label.
pub type StratificationMapper =
    Box<dyn Fn(&PopulationTable, usize) -> Result<String> + Send + Sync>;

/// A named partition of the population into categories.
pub struct Stratification {
    /// The stratification name; doubles as the report column name.
    pub name: StratificationId,
    /// Columns the mapper reads.
    pub sources: Vec<ColumnId>,
    /// The complete set of labels the mapper may produce.
    pub categories: Vec<String>,
    /// Row → category label.
    pub mapper: StratificationMapper,
}

impl std::fmt::Debug for Stratification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stratification")
            .field("name", &self.name)
            .field("sources", &self.sources)
            .field("categories", &self.categories)
            .finish()
    }
}

/// How the rows of one stratification group collapse to a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregator {
    /// Number of simulants in the group.
    Count,
    /// Sum of a float column over the group.
    SumColumn(ColumnId),
}

impl Aggregator {
    fn apply(&self, table: &PopulationTable, rows: &[usize]) -> Result<f64> {
        match self {
            Aggregator::Count => Ok(rows.len() as f64),
            Aggregator::SumColumn(column) => {
                let values = table.f64s(column)?;
                Ok(rows.iter().map(|&r| values[r]).sum())
            }
        }
    }
}

/// A registered observation.
#[derive(Debug)]
pub struct Observation {
    /// The measure name; doubles as the report file name.
    pub name: MeasureId,
    /// Rows failing this predicate are ignored.
    pub pop_filter: Predicate,
    /// The event on which the observation gathers.
    pub when: EventId,
    /// Stratifications to group by. Empty means a single `all` group.
    pub stratifications: Vec<StratificationId>,
    /// How each group collapses to a value.
    pub aggregator: Aggregator,
}

impl Observation {
    /// An observation gathering on `collect_metrics` with no filter and no
    /// stratifications.
    pub fn new(name: impl Into<MeasureId>, aggregator: Aggregator) -> Self {
        Self {
            name: name.into(),
            pop_filter: Predicate::all(),
            when: EventId::from(COLLECT_METRICS),
            stratifications: Vec::new(),
            aggregator,
        }
    }

    /// Restrict to rows matching the predicate.
    pub fn with_filter(mut self, pop_filter: Predicate) -> Self {
        self.pop_filter = pop_filter;
        self
    }

    /// Gather on a different lifecycle event.
    pub fn on(mut self, when: impl Into<EventId>) -> Self {
        self.when = when.into();
        self
    }

    /// Group by the named stratifications.
    pub fn stratified_by(
        mut self,
        stratifications: impl IntoIterator<Item = StratificationId>,
    ) -> Self {
        self.stratifications = stratifications.into_iter().collect();
        self
    }
}

/// Label used for the single group of an unstratified observation.
const ALL_GROUP: &str = "all";

const GATHERING_EVENTS: [&str; 5] = [
    TIME_STEP_PREPARE,
    TIME_STEP,
    TIME_STEP_CLEANUP,
    COLLECT_METRICS,
    SIMULATION_END,
];

/// One measure's accumulated values, keyed by category tuple.
#[derive(Debug)]
struct MeasureTable {
    stratifications: Vec<StratificationId>,
    values: IndexMap<Vec<String>, f64>,
}

/// Registration, gathering and reporting of results.
#[derive(Debug, Default)]
pub struct ResultsContext {
    default_stratifications: Option<Vec<StratificationId>>,
    stratifications: IndexMap<StratificationId, Stratification>,
    observations: Vec<Observation>,
    tables: IndexMap<MeasureId, MeasureTable>,
}

impl ResultsContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stratifications applied when an observer asks for the
    /// defaults. May be set once.
    pub fn set_default_stratifications(
        &mut self,
        defaults: Vec<StratificationId>,
    ) -> Result<()> {
        if self.default_stratifications.is_some() {
            return Err(Error::ResultsConfiguration(
                "default stratifications are already set".to_string(),
            ));
        }
        self.default_stratifications = Some(defaults);
        Ok(())
    }

    /// The default stratifications, if set.
    pub fn default_stratifications(&self) -> Option<&[StratificationId]> {
        self.default_stratifications.as_deref()
    }

    /// Register a stratification. Names are unique.
    pub fn add_stratification(&mut self, stratification: Stratification) -> Result<()> {
        let name = stratification.name.clone();
        if stratification.categories.is_empty() {
            return Err(Error::ResultsConfiguration(format!(
                "stratification '{name}' declares no categories"
            )));
        }
        if self
            .stratifications
            .insert(name.clone(), stratification)
            .is_some()
        {
            return Err(Error::ResultsConfiguration(format!(
                "stratification '{name}' is already registered"
            )));
        }
        Ok(())
    }

    /// Register an observation.
    pub fn register_observation(&mut self, observation: Observation) -> Result<()> {
        if self
            .observations
            .iter()
            .any(|o| o.name == observation.name)
        {
            return Err(Error::ResultsConfiguration(format!(
                "measure '{}' is already observed",
                observation.name
            )));
        }
        if !GATHERING_EVENTS
            .iter()
            .any(|e| observation.when.as_str() == *e)
        {
            return Err(Error::ResultsConfiguration(format!(
                "measure '{}' gathers on '{}', which is not a gathering event",
                observation.name, observation.when
            )));
        }
        self.observations.push(observation);
        Ok(())
    }

    /// Validate registrations and zero-initialize the measure tables.
    ///
    /// Run at the end of setup. Observations naming stratifications that were
    /// never registered produce a single error listing everything missing;
    /// registered stratifications nobody uses are noted at info level.
    pub fn finalize_registration(&mut self) -> Result<()> {
        let mut missing: Vec<(String, Vec<StratificationId>)> = Vec::new();
        for observation in &self.observations {
            let absent: Vec<StratificationId> = observation
                .stratifications
                .iter()
                .filter(|s| !self.stratifications.contains_key(*s))
                .cloned()
                .collect();
            if !absent.is_empty() {
                missing.push((observation.name.to_string(), absent));
            }
        }
        if !missing.is_empty() {
            missing.sort();
            return Err(Error::MissingStratifications { missing });
        }

        let used: IndexSet<&StratificationId> = self
            .observations
            .iter()
            .flat_map(|o| o.stratifications.iter())
            .collect();
        for name in self.stratifications.keys() {
            if !used.contains(name) {
                info!(stratification = %name, "registered stratification is not used by any observation");
            }
        }

        self.tables = self
            .observations
            .iter()
            .map(|o| (o.name.clone(), self.blank_table(o)))
            .collect();
        Ok(())
    }

    fn blank_table(&self, observation: &Observation) -> MeasureTable {
        let mut values = IndexMap::new();
        let category_sets: Vec<&[String]> = observation
            .stratifications
            .iter()
            .map(|s| self.stratifications[s].categories.as_slice())
            .collect();
        for key in cartesian_product(&category_sets) {
            values.insert(key, 0.0);
        }
        MeasureTable {
            stratifications: observation.stratifications.clone(),
            values,
        }
    }

    /// Gather every observation subscribed to the event and fold the results
    /// into the measure tables.
    pub fn gather_results(&mut self, table: &PopulationTable, event: &Event) -> Result<()> {
        for observation in &self.observations {
            if observation.when != event.id {
                continue;
            }
            let filtered = table.filter(&event.index, &observation.pop_filter)?;
            if filtered.is_empty() {
                continue;
            }

            let groups = self.group(table, &filtered, &observation.stratifications)?;
            let measure = self
                .tables
                .get_mut(&observation.name)
                .ok_or_else(|| {
                    Error::ResultsConfiguration(format!(
                        "measure '{}' gathered before registration was finalized",
                        observation.name
                    ))
                })?;
            for (key, rows) in groups {
                let value = observation.aggregator.apply(table, &rows)?;
                let slot = measure.values.get_mut(&key).ok_or_else(|| {
                    Error::ResultsConfiguration(format!(
                        "measure '{}' produced unregistered category tuple {key:?}",
                        observation.name
                    ))
                })?;
                *slot += value;
            }
        }
        Ok(())
    }

    /// Partition the filtered index into category-tuple groups.
    fn group(
        &self,
        table: &PopulationTable,
        index: &SimulantIndex,
        stratifications: &[StratificationId],
    ) -> Result<IndexMap<Vec<String>, Vec<usize>>> {
        let mut groups: IndexMap<Vec<String>, Vec<usize>> = IndexMap::new();
        for row in index.iter() {
            let mut key = Vec::with_capacity(stratifications.len().max(1));
            if stratifications.is_empty() {
                key.push(ALL_GROUP.to_string());
            }
            for name in stratifications {
                let stratification = &self.stratifications[name];
                let label = (stratification.mapper)(table, row)?;
                if !stratification.categories.contains(&label) {
                    return Err(Error::ResultsConfiguration(format!(
                        "stratification '{name}' mapped a simulant to '{label}', \
                         which is not a declared category"
                    )));
                }
                key.push(label);
            }
            groups.entry(key).or_default().push(row);
        }
        Ok(groups)
    }

    /// The accumulated value for a measure at a category tuple.
    pub fn value(&self, measure: &MeasureId, key: &[String]) -> Option<f64> {
        self.tables.get(measure)?.values.get(key).copied()
    }

    /// Write one CSV per measure under `results_root`.
    ///
    /// Columns are the stratification names, then `measure`, `random_seed`,
    /// `input_draw`, with `value` last.
    pub fn report(
        &self,
        results_root: &Path,
        random_seed: u64,
        input_draw: u64,
    ) -> Result<()> {
        std::fs::create_dir_all(results_root)?;
        for (name, measure) in &self.tables {
            let path = results_root.join(format!("{name}.csv"));
            let file = std::fs::File::create(&path)?;
            let mut out = std::io::BufWriter::new(file);

            let mut header: Vec<String> = measure
                .stratifications
                .iter()
                .map(|s| s.to_string())
                .collect();
            if measure.stratifications.is_empty() {
                header.push("group".to_string());
            }
            header.extend(
                ["measure", "random_seed", "input_draw", "value"]
                    .iter()
                    .map(|s| s.to_string()),
            );
            writeln!(out, "{}", header.join(","))?;

            for (key, value) in &measure.values {
                let mut row = key.clone();
                row.push(name.to_string());
                row.push(random_seed.to_string());
                row.push(input_draw.to_string());
                row.push(value.to_string());
                writeln!(out, "{}", row.join(","))?;
            }
            out.flush()?;
        }
        Ok(())
    }
}

/// Ordered cartesian product of category sets. The empty product is the
/// single `all` tuple.
fn cartesian_product(sets: &[&[String]]) -> Vec<Vec<String>> {
    if sets.is_empty() {
        return vec![vec![ALL_GROUP.to_string()]];
    }
    let mut out: Vec<Vec<String>> = vec![Vec::new()];
    for set in sets {
        let mut next = Vec::with_capacity(out.len() * set.len());
        for prefix in &out {
            for category in *set {
                let mut key = prefix.clone();
                key.push(category.clone());
                next.push(key);
            }
        }
        out = next;
    }
    out
}
