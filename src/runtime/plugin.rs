//! Collaborator plugins and their startup lifecycle.
//!
//! Integrations that live outside the core (network replication, sensors,
//! simulation clocks) attach as [`Plugin`]s. Container start initializes
//! them in dependency order (a missing dependency or a cycle is fatal),
//! then fires `on_startup` in the same order; a startup failure aborts the
//! whole container start. These are the only fatal errors in the system.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::RuntimeHandle;

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Names of plugins that must be initialized before this one.
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Wire the plugin to the runtime. Runs in dependency order.
    fn init(&self, runtime: &RuntimeHandle) -> Result<(), StartupError>;

    /// Fired after every plugin's `init` has run, in the same order.
    async fn on_startup(&self) -> Result<(), StartupError> {
        Ok(())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum StartupError {
    #[error("plugin '{plugin}' requires '{dependency}', which is not installed")]
    #[diagnostic(code(murmuration::runtime::missing_dependency))]
    MissingDependency { plugin: String, dependency: String },

    #[error("plugin dependency cycle through '{plugin}'")]
    #[diagnostic(code(murmuration::runtime::dependency_cycle))]
    DependencyCycle { plugin: String },

    #[error("plugin '{plugin}' failed to initialize: {reason}")]
    #[diagnostic(code(murmuration::runtime::init_failed))]
    InitFailed { plugin: String, reason: String },

    #[error("plugin '{plugin}' failed on startup: {reason}")]
    #[diagnostic(code(murmuration::runtime::startup_failed))]
    StartupFailed { plugin: String, reason: String },
}

impl StartupError {
    pub fn init(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        StartupError::InitFailed {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    pub fn startup(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        StartupError::StartupFailed {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}

/// Indices of `plugins` in initialization order (dependencies first).
pub(crate) fn dependency_order(
    plugins: &[std::sync::Arc<dyn Plugin>],
) -> Result<Vec<usize>, StartupError> {
    let by_name: FxHashMap<&str, usize> = plugins
        .iter()
        .enumerate()
        .map(|(i, plugin)| (plugin.name(), i))
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        index: usize,
        plugins: &[std::sync::Arc<dyn Plugin>],
        by_name: &FxHashMap<&str, usize>,
        marks: &mut [Mark],
        order: &mut Vec<usize>,
    ) -> Result<(), StartupError> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                return Err(StartupError::DependencyCycle {
                    plugin: plugins[index].name().to_string(),
                });
            }
            Mark::Unvisited => {}
        }
        marks[index] = Mark::InProgress;
        for dependency in plugins[index].dependencies() {
            let dep_index =
                *by_name
                    .get(dependency)
                    .ok_or_else(|| StartupError::MissingDependency {
                        plugin: plugins[index].name().to_string(),
                        dependency: dependency.to_string(),
                    })?;
            visit(dep_index, plugins, by_name, marks, order)?;
        }
        marks[index] = Mark::Done;
        order.push(index);
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; plugins.len()];
    let mut order = Vec::with_capacity(plugins.len());
    for index in 0..plugins.len() {
        visit(index, plugins, &by_name, &mut marks, &mut order)?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Stub {
        name: &'static str,
        needs: Vec<&'static str>,
    }

    #[async_trait]
    impl Plugin for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn dependencies(&self) -> Vec<&str> {
            self.needs.clone()
        }

        fn init(&self, _runtime: &RuntimeHandle) -> Result<(), StartupError> {
            Ok(())
        }
    }

    fn stub(name: &'static str, needs: &[&'static str]) -> Arc<dyn Plugin> {
        Arc::new(Stub {
            name,
            needs: needs.to_vec(),
        })
    }

    #[test]
    fn dependencies_come_first() {
        let plugins = vec![
            stub("network", &["marshalling"]),
            stub("marshalling", &[]),
            stub("robot", &["network"]),
        ];
        let order = dependency_order(&plugins).unwrap();
        let names: Vec<&str> = order.iter().map(|&i| plugins[i].name()).collect();
        let pos = |name: &str| names.iter().position(|n| *n == name).unwrap();
        assert!(pos("marshalling") < pos("network"));
        assert!(pos("network") < pos("robot"));
    }

    #[test]
    fn missing_dependency_is_fatal() {
        let plugins = vec![stub("network", &["marshalling"])];
        assert!(matches!(
            dependency_order(&plugins),
            Err(StartupError::MissingDependency { .. })
        ));
    }

    #[test]
    fn cycles_are_fatal() {
        let plugins = vec![stub("a", &["b"]), stub("b", &["a"])];
        assert!(matches!(
            dependency_order(&plugins),
            Err(StartupError::DependencyCycle { .. })
        ));
    }
}
