//! # Murmuration: ensemble-component middleware
//!
//! Murmuration is a runtime for ensemble-based component systems:
//! autonomous components own *knowledge* (a JSON tree per component root),
//! publish and consume it through transactional sessions, and dynamically
//! formed groups (*ensembles*) exchange knowledge between a coordinator
//! and its members whenever a declared membership condition holds.
//!
//! ## Core Concepts
//!
//! - **Knowledge**: key-addressable state owned by one component root,
//!   accessed only through atomic, retryable [`knowledge::Session`]s
//! - **Paths**: dotted/indexed expressions (`requests[member.id]`) resolved
//!   against the invoking component or an ensemble's coordinator/member
//! - **Processes**: parameter-bound async bodies run on periodic or
//!   knowledge-change triggers, with atomic output writeback
//! - **Ensembles**: declarative pairings re-evaluated every round; matching
//!   pairs run a knowledge exchange like any other invocation
//! - **Runtime**: the container wiring store, scheduler, engine, and
//!   collaborator plugins together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use murmuration::ensemble::{
//!     EnsembleDefinition, ExchangeMapping, Membership, RoleConstraints,
//! };
//! use murmuration::process::{Parameter, body_fn};
//! use murmuration::registry::{ComponentType, DefinitionRegistry};
//! use murmuration::runtime::Runtime;
//! use murmuration::scheduler::Trigger;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = DefinitionRegistry::new();
//! registry.add_component(ComponentType::new("Vendor", json!({"price": 10})))?;
//! registry.add_component(ComponentType::new("Buyer", json!({"price": 0})))?;
//! registry.add_ensemble(EnsembleDefinition {
//!     name: "price-sync".into(),
//!     trigger: Trigger::periodic(Duration::from_millis(100)),
//!     membership: Membership::always(),
//!     exchange: ExchangeMapping {
//!         parameters: vec![
//!             Parameter::input("coord.price")?,
//!             Parameter::output("member.price")?,
//!         ],
//!         body: body_fn(|args| {
//!             let price = args.required(0)?.clone();
//!             args.set_output(1, price)
//!         }),
//!     },
//!     roles: RoleConstraints::pairwise(),
//! })?;
//!
//! let runtime = Runtime::builder().with_registry(registry).build();
//! runtime.deploy_component("Vendor").await?;
//! runtime.deploy_component("Buyer").await?;
//! runtime.deploy_ensemble("price-sync")?;
//! runtime.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`knowledge`] - the store: roots, sessions, change notification
//! - [`path`] - path grammar, parsing, and evaluation
//! - [`process`] - parameters, binding, and atomic invocation
//! - [`scheduler`] - periodic and knowledge-change dispatch
//! - [`ensemble`] - definitions, formation strategies, the exchange engine
//! - [`registry`] - component/ensemble type definitions, loaded once
//! - [`runtime`] - the container, configuration, and plugin lifecycle
//! - [`marshal`] - value ↔ bytes seam for distributed backends
//! - [`telemetry`] - tracing subscriber setup

pub mod ensemble;
pub mod knowledge;
pub mod marshal;
pub mod path;
pub mod process;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;
