//! Unique identifiers for CEAM entities.
//!
//! Simulation resources are identified by typed string wrappers around a
//! hierarchical dot-path. The typed wrappers keep a column name from being
//! confused with a randomness stream name at compile time while sharing one
//! representation and serialization format.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A hierarchical identifier composed of dot-separated segments.
///
/// Paths name everything in a simulation: components
/// (`"screening.opportunistic"`), population columns
/// (`"systolic_blood_pressure"`), randomness streams, result measures.
/// Single-segment paths are common; the hierarchy exists for components that
/// namespace their resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// Creates a path from explicit segments.
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Creates a path from a dot-separated string.
    pub fn from_path_str(s: &str) -> Self {
        Self {
            segments: s.split('.').map(String::from).collect(),
        }
    }

    /// The ordered segments of the path.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last segment (leaf name).
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The parent path, or `None` for a single-segment path.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            None
        } else {
            Some(Self::new(self.segments[..self.segments.len() - 1].to_vec()))
        }
    }

    /// Append a segment, producing a new path.
    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self::new(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::from_path_str(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Self::from_path_str(&s)
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Path);

        impl $name {
            /// Creates a new identifier from a path.
            pub fn new(p: impl Into<Path>) -> Self {
                Self(p.into())
            }

            /// Returns the identifier as a dotted string.
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }

            /// Returns a reference to the underlying path.
            pub fn path(&self) -> &Path {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(Path::from_path_str(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Path::from_path_str(&s))
            }
        }

        impl From<Path> for $name {
            fn from(p: Path) -> Self {
                Self(p)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a simulation component
    ComponentId
);

define_id!(
    /// Unique identifier for a population state-table column
    ColumnId
);

define_id!(
    /// Unique identifier for a randomness stream
    StreamId
);

define_id!(
    /// Unique identifier for a named value pipeline
    PipelineId
);

define_id!(
    /// Unique identifier for a lifecycle event channel
    EventId
);

define_id!(
    /// Unique identifier for an observed result measure
    MeasureId
);

define_id!(
    /// Unique identifier for a results stratification
    StratificationId
);
