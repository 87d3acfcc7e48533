use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::info;

use crate::ensemble::{EnsembleEngine, EnsembleRunner, FormationStrategy, PairwiseFormation};
use crate::knowledge::{KnowledgeError, KnowledgeRepository, LocalKnowledgeStore, RootId};
use crate::registry::{DefinitionRegistry, RegistryError};
use crate::scheduler::{ProcessRunner, RegistrationHandle, Scheduler, SchedulerError};

use super::config::RuntimeConfig;
use super::plugin::{Plugin, StartupError, dependency_order};

/// What a [`Plugin`] gets to see of the runtime during `init`.
#[derive(Clone)]
pub struct RuntimeHandle {
    pub store: Arc<dyn KnowledgeRepository>,
    pub scheduler: Arc<Scheduler>,
    pub config: RuntimeConfig,
}

/// Errors from deploying components and ensembles into a running container.
#[derive(Debug, Error, Diagnostic)]
pub enum DeployError {
    #[error(transparent)]
    #[diagnostic(code(murmuration::runtime::registry))]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(code(murmuration::runtime::knowledge))]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    #[diagnostic(code(murmuration::runtime::scheduler))]
    Scheduler(#[from] SchedulerError),
}

/// A deployed component instance: its root plus its process registrations.
pub struct DeployedComponent {
    pub root: RootId,
    pub processes: Vec<RegistrationHandle>,
}

/// Builds a [`Runtime`] from its parts, with sensible defaults for each:
/// in-memory store, pairwise formation, default config, no plugins.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    registry: DefinitionRegistry,
    store: Option<Arc<dyn KnowledgeRepository>>,
    strategy: Arc<dyn FormationStrategy>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        RuntimeBuilder {
            config: RuntimeConfig::default(),
            registry: DefinitionRegistry::new(),
            store: None,
            strategy: Arc::new(PairwiseFormation),
            plugins: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: DefinitionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Swap in a different knowledge backend (e.g. a distributed store).
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KnowledgeRepository>) -> Self {
        self.store = Some(store);
        self
    }

    /// Swap in a different role-assignment strategy.
    #[must_use]
    pub fn with_formation(mut self, strategy: Arc<dyn FormationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn build(self) -> Runtime {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(LocalKnowledgeStore::new()));
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&store)));
        let engine = Arc::new(EnsembleEngine::new(
            Arc::clone(&store),
            self.strategy,
            self.config.retry_policy(),
        ));
        Runtime {
            config: self.config,
            registry: self.registry,
            store,
            scheduler,
            engine,
            plugins: self.plugins,
        }
    }
}

/// The container: owns the store, the scheduler, the ensemble engine, and
/// the plugin set, and deploys definitions from the registry.
pub struct Runtime {
    config: RuntimeConfig,
    registry: DefinitionRegistry,
    store: Arc<dyn KnowledgeRepository>,
    scheduler: Arc<Scheduler>,
    engine: Arc<EnsembleEngine>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeRepository> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Initialize plugins in dependency order, fire their startup hooks,
    /// then start scheduling. Any plugin failure aborts the container start.
    pub async fn start(&self) -> Result<(), StartupError> {
        let order = dependency_order(&self.plugins)?;
        let handle = RuntimeHandle {
            store: Arc::clone(&self.store),
            scheduler: Arc::clone(&self.scheduler),
            config: self.config.clone(),
        };
        for &index in &order {
            let plugin = &self.plugins[index];
            plugin.init(&handle)?;
            info!(plugin = plugin.name(), "plugin initialized");
        }
        for &index in &order {
            let plugin = &self.plugins[index];
            plugin.on_startup().await?;
        }
        self.scheduler.start();
        info!("runtime started");
        Ok(())
    }

    /// Stop scheduling; in-flight invocations complete first.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        info!("runtime stopped");
    }

    /// Deploy one instance of a registered component type under a fresh
    /// root id.
    pub async fn deploy_component(&self, type_name: &str) -> Result<DeployedComponent, DeployError> {
        self.deploy_component_as(type_name, RootId::fresh()).await
    }

    /// Deploy under a caller-chosen root id (stable ids for tests and for
    /// nodes that re-join under their old identity).
    pub async fn deploy_component_as(
        &self,
        type_name: &str,
        root: RootId,
    ) -> Result<DeployedComponent, DeployError> {
        let component = self.registry.component(type_name)?;
        self.store
            .register_root(root.clone(), component.initial_knowledge.clone())
            .await?;
        let mut handles = Vec::new();
        for process in self.registry.instantiate(type_name, &root)? {
            let runner = ProcessRunner::new(
                process,
                Arc::clone(&self.store),
                self.config.retry_policy(),
            );
            handles.push(self.scheduler.register(Arc::new(runner))?);
        }
        info!(%root, component_type = type_name, processes = handles.len(), "component deployed");
        Ok(DeployedComponent {
            root,
            processes: handles,
        })
    }

    /// Put a registered ensemble definition into rotation.
    pub fn deploy_ensemble(&self, name: &str) -> Result<RegistrationHandle, DeployError> {
        let definition = self.registry.ensemble(name)?;
        let runner = EnsembleRunner::new(Arc::clone(definition), Arc::clone(&self.engine));
        let handle = self.scheduler.register(Arc::new(runner))?;
        info!(ensemble = name, "ensemble deployed");
        Ok(handle)
    }
}
