//! Unit registry and per-node instance memoization.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use crate::errors::PipelineError;
use crate::job::{NodeId, UnitDefinition};
use crate::units::{
    Foreach, Http, IfChange, Mail, ReadJson, ReadXml, Script, Select, Unit, UnitConfig, Where,
    WriteCsv,
};

/// Factory function type for creating units.
pub type UnitFactory = Box<dyn Fn(UnitConfig) -> Box<dyn Unit> + Send + Sync>;

/// Name to constructor table. Type names are case-insensitive.
#[derive(Default)]
pub struct UnitRegistry {
    factories: HashMap<String, UnitFactory>,
}

impl fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("units", &self.names())
            .finish()
    }
}

impl UnitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the bundled unit catalogue.
    #[must_use]
    pub fn with_builtin_units() -> Self {
        let mut registry = Self::new();
        registry.register("Foreach", |config| Box::new(Foreach::new(config)));
        registry.register("Select", |config| Box::new(Select::new(config)));
        registry.register("Where", |config| Box::new(Where::new(config)));
        registry.register("Script", |config| Box::new(Script::new(config)));
        registry.register("Http", |config| Box::new(Http::new(config)));
        registry.register("Mail", |config| Box::new(Mail::new(config)));
        registry.register("ReadJSON", |config| Box::new(ReadJson::new(config)));
        registry.register("ReadXML", |config| Box::new(ReadXml::new(config)));
        registry.register("WriteCSV", |config| Box::new(WriteCsv::new(config)));
        registry.register("IfChange", |config| Box::new(IfChange::new(config)));
        registry
    }

    /// Registers a constructor, replacing any previous one for `name`.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(UnitConfig) -> Box<dyn Unit> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_lowercase(), Box::new(factory));
    }

    /// Checks if a unit type is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    /// Lists registered type names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Constructs a fresh instance, or `None` for an unknown type.
    #[must_use]
    pub fn create(&self, config: UnitConfig) -> Option<Box<dyn Unit>> {
        let factory = self.factories.get(&config.unit_type().to_lowercase())?;
        Some(factory(config))
    }
}

/// Live unit instances keyed by declaration node.
///
/// An instance is created the first time its node runs and is reused for
/// every later activation, so cursors, cached rows and compiled scripts
/// survive until the table is cleared.
#[derive(Debug, Default)]
pub struct UnitStateTable {
    instances: HashMap<NodeId, Box<dyn Unit>>,
}

impl UnitStateTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the instance for `definition` out of the table, creating it on
    /// first use. Hand it back with [`UnitStateTable::release`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownUnitType`] if the type is not
    /// registered.
    pub fn resolve(
        &mut self,
        registry: &UnitRegistry,
        definition: &UnitDefinition,
    ) -> Result<Box<dyn Unit>, PipelineError> {
        if let Some(unit) = self.instances.remove(&definition.id) {
            return Ok(unit);
        }
        let unit = registry
            .create(definition.config())
            .ok_or_else(|| PipelineError::UnknownUnitType {
                job: definition.id.job.clone(),
                unit_type: definition.unit_type.clone(),
            })?;
        tracing::debug!(
            job = %definition.id.job,
            index = definition.id.index,
            unit_type = %definition.unit_type,
            "Created unit instance"
        );
        Ok(unit)
    }

    /// Returns an instance taken with [`UnitStateTable::resolve`].
    pub fn release(&mut self, definition: &UnitDefinition, unit: Box<dyn Unit>) {
        if let Entry::Vacant(slot) = self.instances.entry(definition.id.clone()) {
            slot.insert(unit);
        }
    }

    /// Returns the number of live instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns true if no instance exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drops every instance and the state it carries.
    pub fn clear(&mut self) {
        self.instances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::job::JobDefinition;
    use crate::testing::{RecordingUnit, TestEnv};
    use crate::units::UnitOutcome;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_catalogue() {
        let registry = UnitRegistry::with_builtin_units();
        assert_eq!(
            registry.names(),
            vec![
                "foreach", "http", "ifchange", "mail", "readjson", "readxml", "script", "select",
                "where", "writecsv"
            ]
        );
        assert!(registry.contains("READJSON"));
        assert!(!registry.contains("Sleep"));
    }

    #[test]
    fn test_create_passes_configuration() {
        let registry = UnitRegistry::with_builtin_units();
        let config = UnitConfig::new("foreach", [("label", "rows")], "");
        let unit = registry.create(config).unwrap();
        assert_eq!(unit.label(), "rows");
    }

    #[test]
    fn test_unknown_type_is_typed_error() {
        let registry = UnitRegistry::new();
        let job = JobDefinition::new("j").with_unit("Nope", Vec::<(&str, &str)>::new(), "");
        let mut states = UnitStateTable::new();

        let err = states.resolve(&registry, &job.units[0]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnknownUnitType { ref job, ref unit_type } if job == "j" && unit_type == "Nope"
        ));
        assert!(states.is_empty());
    }

    #[tokio::test]
    async fn test_instance_is_memoized_per_node() {
        let registry = UnitRegistry::with_builtin_units();
        let job = JobDefinition::new("j")
            .with_unit("Foreach", [("path", "items")], "")
            .with_unit("Foreach", [("path", "items")], "");
        let input = Context::from_json(serde_json::json!({"items": [1, 2]})).unwrap();
        let mut states = UnitStateTable::new();
        let mut test_env = TestEnv::new();

        let mut first = states.resolve(&registry, &job.units[0]).unwrap();
        first.execute(input.clone(), &mut test_env.env()).await.unwrap();
        states.release(&job.units[0], first);

        // Same node: the cursor moved on.
        let mut again = states.resolve(&registry, &job.units[0]).unwrap();
        let outcome = again.execute(input.clone(), &mut test_env.env()).await.unwrap();
        assert_eq!(outcome, UnitOutcome::emit(Context::new().with("value", 2)));
        states.release(&job.units[0], again);

        // Other node: fresh cursor.
        let mut other = states.resolve(&registry, &job.units[1]).unwrap();
        let outcome = other.execute(input, &mut test_env.env()).await.unwrap();
        assert!(outcome.has_more());
        states.release(&job.units[1], other);

        assert_eq!(states.len(), 2);
        states.clear();
        assert!(states.is_empty());
    }

    #[test]
    fn test_custom_registration() {
        let recorder = RecordingUnit::new("recorder");
        let mut registry = UnitRegistry::new();
        let shared = recorder.clone();
        registry.register("Recorder", move |_| Box::new(shared.clone()));

        let unit = registry
            .create(UnitConfig::new("RECORDER", Vec::<(&str, &str)>::new(), ""))
            .unwrap();
        assert_eq!(unit.label(), "recorder");
    }
}
