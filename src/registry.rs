//! The definition registry: component and ensemble types, loaded once.
//!
//! The registry is the explicit, build-time-populated replacement for
//! runtime discovery: a mapping from type name to its process templates and
//! initial knowledge (components) or its definition (ensembles). The core
//! treats its contents as immutable, fully-resolved input: deploying a
//! component stamps the templates into concrete [`SchedulableProcess`]es
//! bound to a fresh root, no type inspection involved.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::ensemble::EnsembleDefinition;
use crate::knowledge::RootId;
use crate::process::{Parameter, ProcessBody, SchedulableProcess};
use crate::scheduler::Trigger;

/// Blueprint of one component process: everything but the owning root.
#[derive(Clone)]
pub struct ProcessTemplate {
    pub name: String,
    pub trigger: Trigger,
    pub parameters: Vec<Parameter>,
    pub body: Arc<dyn ProcessBody>,
}

impl ProcessTemplate {
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        parameters: Vec<Parameter>,
        body: Arc<dyn ProcessBody>,
    ) -> Self {
        ProcessTemplate {
            name: name.into(),
            trigger,
            parameters,
            body,
        }
    }
}

/// One component type: its initial knowledge plus its process templates.
#[derive(Clone)]
pub struct ComponentType {
    pub name: String,
    pub initial_knowledge: Value,
    pub processes: Vec<ProcessTemplate>,
}

impl ComponentType {
    pub fn new(name: impl Into<String>, initial_knowledge: Value) -> Self {
        ComponentType {
            name: name.into(),
            initial_knowledge,
            processes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_process(mut self, template: ProcessTemplate) -> Self {
        self.processes.push(template);
        self
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("component type '{name}' is already registered")]
    #[diagnostic(code(murmuration::registry::duplicate_component))]
    DuplicateComponent { name: String },

    #[error("ensemble '{name}' is already registered")]
    #[diagnostic(code(murmuration::registry::duplicate_ensemble))]
    DuplicateEnsemble { name: String },

    #[error("unknown component type '{name}'")]
    #[diagnostic(code(murmuration::registry::unknown_component))]
    UnknownComponent { name: String },

    #[error("unknown ensemble '{name}'")]
    #[diagnostic(code(murmuration::registry::unknown_ensemble))]
    UnknownEnsemble { name: String },
}

/// All component and ensemble types known to a runtime.
#[derive(Default)]
pub struct DefinitionRegistry {
    components: FxHashMap<String, ComponentType>,
    ensembles: FxHashMap<String, Arc<EnsembleDefinition>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_component(&mut self, component: ComponentType) -> Result<(), RegistryError> {
        if self.components.contains_key(&component.name) {
            return Err(RegistryError::DuplicateComponent {
                name: component.name,
            });
        }
        self.components.insert(component.name.clone(), component);
        Ok(())
    }

    pub fn add_ensemble(&mut self, definition: EnsembleDefinition) -> Result<(), RegistryError> {
        if self.ensembles.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateEnsemble {
                name: definition.name,
            });
        }
        self.ensembles
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn component(&self, name: &str) -> Result<&ComponentType, RegistryError> {
        self.components
            .get(name)
            .ok_or_else(|| RegistryError::UnknownComponent {
                name: name.to_string(),
            })
    }

    pub fn ensemble(&self, name: &str) -> Result<&Arc<EnsembleDefinition>, RegistryError> {
        self.ensembles
            .get(name)
            .ok_or_else(|| RegistryError::UnknownEnsemble {
                name: name.to_string(),
            })
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn ensemble_names(&self) -> impl Iterator<Item = &str> {
        self.ensembles.keys().map(String::as_str)
    }

    /// Stamp a component type's templates into concrete processes owned by
    /// `root`. Process ids are `{root}/{type}.{template}`, unique as long
    /// as root ids are.
    pub fn instantiate(
        &self,
        type_name: &str,
        root: &RootId,
    ) -> Result<Vec<SchedulableProcess>, RegistryError> {
        let component = self.component(type_name)?;
        Ok(component
            .processes
            .iter()
            .map(|template| SchedulableProcess {
                id: format!("{root}/{}.{}", component.name, template.name),
                owner: root.clone(),
                trigger: template.trigger.clone(),
                parameters: template.parameters.clone(),
                body: Arc::clone(&template.body),
            })
            .collect())
    }
}
