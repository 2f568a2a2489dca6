//! Framework errors for simulation configuration and execution.
//!
//! # Error Categories
//!
//! - **Configuration errors**: [`Error::DuplicatedConfiguration`],
//!   [`Error::MissingConfiguration`], [`Error::ConfigurationType`]
//! - **Component errors**: [`Error::ComponentConfig`]
//! - **Lifecycle errors**: [`Error::PhaseViolation`]
//! - **Resource errors**: [`Error::DuplicateResource`], [`Error::CycleDetected`]
//! - **Population errors**: [`Error::UnknownColumn`], [`Error::ColumnType`],
//!   [`Error::ColumnLength`], [`Error::UndeclaredColumn`]
//! - **Randomness errors**: [`Error::Randomness`]
//! - **Value errors**: [`Error::UnsourcedPipeline`], [`Error::Values`]
//! - **Results errors**: [`Error::ResultsConfiguration`]
//!
//! # Error Handling Policy
//!
//! The framework surfaces invalid state immediately rather than silently
//! correcting it. A misconfigured simulation that runs to completion and
//! reports plausible-looking numbers is worse than one that fails at setup.

use thiserror::Error;

use ceam_foundation::{ColumnId, ComponentId, PipelineId, StratificationId};

use crate::lifecycle::LifecyclePhase;

/// Framework result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or executing a simulation.
#[derive(Debug, Error)]
pub enum Error {
    /// Error while interpreting configuration or initializing components.
    #[error("component configuration error: {0}")]
    ComponentConfig(String),

    /// Two sources wrote the same configuration key in the same layer.
    ///
    /// Components may extend the configuration with their defaults but may
    /// not fight over a key; conflicting defaults indicate a modeling error.
    #[error("configuration key '{key}' set in layer '{layer}' by both '{first}' and '{second}'")]
    DuplicatedConfiguration {
        /// Dotted key path of the conflicting value.
        key: String,
        /// Layer in which the conflict occurred.
        layer: String,
        /// Source that wrote the key first.
        first: String,
        /// Source that attempted the second write.
        second: String,
    },

    /// A required configuration key is absent from every layer.
    #[error("missing configuration key '{0}'")]
    MissingConfiguration(String),

    /// A configuration value exists but has the wrong type.
    #[error("configuration key '{key}' is not a {expected}")]
    ConfigurationType {
        /// Dotted key path of the value.
        key: String,
        /// Type the caller asked for.
        expected: &'static str,
    },

    /// An operation was attempted in the wrong lifecycle phase.
    ///
    /// Registration (streams, listeners, initializers, observations) is only
    /// permitted during setup; mutation of the state table only during the
    /// main loop.
    #[error("phase violation: {operation} not allowed in {phase:?}")]
    PhaseViolation {
        /// Description of the attempted operation.
        operation: String,
        /// The phase in which the violation occurred.
        phase: LifecyclePhase,
    },

    /// More than one producer registered for the same resource.
    #[error("resource '{0}' already has a producer")]
    DuplicateResource(String),

    /// The resource dependency graph contains a cycle.
    ///
    /// Initializer ordering requires a DAG; the named resources could not be
    /// scheduled because they depend on each other.
    #[error("cycle detected in resource graph: {resources:?}")]
    CycleDetected {
        /// Resource keys involved in the dependency cycle.
        resources: Vec<String>,
    },

    /// Invalid use of the randomness system.
    #[error("randomness error: {0}")]
    Randomness(String),

    /// A population column was referenced that does not exist.
    #[error("unknown population column '{0}'")]
    UnknownColumn(ColumnId),

    /// A population column was accessed with the wrong type.
    #[error("population column '{column}' is not of type {expected}")]
    ColumnType {
        /// The column that was accessed.
        column: ColumnId,
        /// Type the caller asked for.
        expected: &'static str,
    },

    /// A column update had the wrong number of values for its index.
    #[error("column '{column}' update has {got} values for an index of {expected}")]
    ColumnLength {
        /// The column being updated.
        column: ColumnId,
        /// Length of the target index.
        expected: usize,
        /// Number of values supplied.
        got: usize,
    },

    /// An initializer wrote a column it did not declare.
    #[error("component '{component}' initialized undeclared column '{column}'")]
    UndeclaredColumn {
        /// The offending component.
        component: ComponentId,
        /// The column that was written.
        column: ColumnId,
    },

    /// A value pipeline was read before a source was registered for it.
    #[error("value pipeline '{0}' has no source")]
    UnsourcedPipeline(PipelineId),

    /// A pipeline source or modifier misbehaved.
    #[error("value pipeline error: {0}")]
    Values(String),

    /// Invalid results configuration.
    #[error("results configuration error: {0}")]
    ResultsConfiguration(String),

    /// Observers requested stratifications that were never registered.
    #[error("observers request unregistered stratifications: {missing:?}")]
    MissingStratifications {
        /// Measure name to the stratifications it requested but which do not
        /// exist, in sorted order.
        missing: Vec<(String, Vec<StratificationId>)>,
    },

    /// Filesystem failure while writing reports or reading specifications.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a configuration or specification file.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
