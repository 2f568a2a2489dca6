//! Layered configuration tree.
//!
//! Simulation configuration is a nested string-keyed tree of JSON values
//! resolved through layers. Layers exist so that a model override file can
//! win over a component's built-in defaults without either knowing about the
//! other:
//!
//! 1. `base` - framework defaults
//! 2. `component_configs` - defaults contributed by components during setup
//! 3. `model_override` - the user's simulation specification
//!
//! Reads resolve highest-priority layer first. Writes within one layer from
//! two different sources to the same key are rejected; the second component
//! to claim a default for `appointments.cost` is a modeling conflict, not a
//! tie to break silently.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Error, Result};

/// Configuration layers in ascending priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigLayer {
    /// Framework-provided defaults.
    Base,
    /// Defaults contributed by components.
    ComponentConfigs,
    /// The user's simulation specification.
    ModelOverride,
}

impl ConfigLayer {
    /// All layers from highest priority to lowest.
    pub const PRIORITY_ORDER: [ConfigLayer; 3] = [
        ConfigLayer::ModelOverride,
        ConfigLayer::ComponentConfigs,
        ConfigLayer::Base,
    ];

    fn name(&self) -> &'static str {
        match self {
            ConfigLayer::Base => "base",
            ConfigLayer::ComponentConfigs => "component_configs",
            ConfigLayer::ModelOverride => "model_override",
        }
    }
}

/// A value stored in one layer, with the source that wrote it.
#[derive(Debug, Clone)]
struct SourcedValue {
    value: Value,
    source: String,
}

/// Layered configuration tree.
///
/// Leaves are flattened to dotted key paths internally; nested JSON objects
/// passed to [`ConfigTree::update_layer`] are walked and merged leaf by leaf.
#[derive(Debug, Default)]
pub struct ConfigTree {
    /// Layer → dotted key path → sourced leaf value.
    layers: IndexMap<&'static str, IndexMap<String, SourcedValue>>,
}

impl ConfigTree {
    /// Create an empty configuration tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree with the given data in the model override layer.
    pub fn from_overrides(data: Value, source: &str) -> Result<Self> {
        let mut tree = Self::new();
        tree.update_layer(data, ConfigLayer::ModelOverride, source)?;
        Ok(tree)
    }

    /// Load a JSON file into the model override layer.
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let data: Value = serde_json::from_str(&text)?;
        Self::from_overrides(data, &path.display().to_string())
    }

    /// Merge a nested JSON object into a layer.
    ///
    /// Re-writing a key from the same source is idempotent (components may
    /// be configured more than once); writing it from a different source is
    /// a [`Error::DuplicatedConfiguration`].
    pub fn update_layer(&mut self, data: Value, layer: ConfigLayer, source: &str) -> Result<()> {
        let mut leaves = Vec::new();
        flatten("", &data, &mut leaves);

        let layer_map = self.layers.entry(layer.name()).or_default();
        for (key, value) in leaves {
            if let Some(existing) = layer_map.get(&key) {
                if existing.source != source {
                    return Err(Error::DuplicatedConfiguration {
                        key,
                        layer: layer.name().to_string(),
                        first: existing.source.clone(),
                        second: source.to_string(),
                    });
                }
            }
            layer_map.insert(
                key,
                SourcedValue {
                    value,
                    source: source.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Look up a raw value, resolving through layers highest-priority first.
    pub fn get(&self, key: &str) -> Option<&Value> {
        for layer in ConfigLayer::PRIORITY_ORDER {
            if let Some(sv) = self.layers.get(layer.name()).and_then(|m| m.get(key)) {
                return Some(&sv.value);
            }
        }
        None
    }

    /// Whether any layer holds the key.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// A required floating-point value.
    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.required(key)?.as_f64().ok_or(Error::ConfigurationType {
            key: key.to_string(),
            expected: "number",
        })
    }

    /// A required unsigned integer value.
    pub fn get_u64(&self, key: &str) -> Result<u64> {
        self.required(key)?.as_u64().ok_or(Error::ConfigurationType {
            key: key.to_string(),
            expected: "unsigned integer",
        })
    }

    /// A required boolean value.
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.required(key)?.as_bool().ok_or(Error::ConfigurationType {
            key: key.to_string(),
            expected: "boolean",
        })
    }

    /// A required string value.
    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.required(key)?.as_str().ok_or(Error::ConfigurationType {
            key: key.to_string(),
            expected: "string",
        })
    }

    /// An optional floating-point value.
    pub fn get_f64_opt(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(_) => self.get_f64(key).map(Some),
        }
    }

    fn required(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| Error::MissingConfiguration(key.to_string()))
    }
}

/// Walk a nested JSON object, collecting dotted-path leaves.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        leaf => out.push((prefix.to_string(), leaf.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_layer_precedence() {
        let mut tree = ConfigTree::new();
        tree.update_layer(
            json!({"population": {"population_size": 100}}),
            ConfigLayer::Base,
            "framework",
        )
        .unwrap();
        assert_eq!(tree.get_u64("population.population_size").unwrap(), 100);

        tree.update_layer(
            json!({"population": {"population_size": 5000}}),
            ConfigLayer::ModelOverride,
            "spec.json",
        )
        .unwrap();
        assert_eq!(tree.get_u64("population.population_size").unwrap(), 5000);
    }

    #[test]
    fn test_same_layer_conflict_rejected() {
        let mut tree = ConfigTree::new();
        tree.update_layer(
            json!({"appointments": {"cost": 7.29}}),
            ConfigLayer::ComponentConfigs,
            "healthcare_access",
        )
        .unwrap();

        let err = tree
            .update_layer(
                json!({"appointments": {"cost": 10.0}}),
                ConfigLayer::ComponentConfigs,
                "opportunistic_screening",
            )
            .unwrap_err();
        assert!(matches!(err, Error::DuplicatedConfiguration { .. }));
    }

    #[test]
    fn test_same_source_rewrite_is_idempotent() {
        let mut tree = ConfigTree::new();
        for _ in 0..2 {
            tree.update_layer(
                json!({"appointments": {"cost": 7.29}}),
                ConfigLayer::ComponentConfigs,
                "healthcare_access",
            )
            .unwrap();
        }
        assert_eq!(tree.get_f64("appointments.cost").unwrap(), 7.29);
    }

    #[test]
    fn test_missing_and_mistyped_keys() {
        let mut tree = ConfigTree::new();
        tree.update_layer(json!({"time": {"start": "2005-01-01"}}), ConfigLayer::Base, "t")
            .unwrap();

        assert!(matches!(
            tree.get_f64("time.step_size"),
            Err(Error::MissingConfiguration(_))
        ));
        assert!(matches!(
            tree.get_f64("time.start"),
            Err(Error::ConfigurationType { .. })
        ));
        assert_eq!(tree.get_str("time.start").unwrap(), "2005-01-01");
    }
}
