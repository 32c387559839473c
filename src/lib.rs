//! # lattice-di
//!
//! An inversion-of-control container with hierarchical lifetime scopes and
//! a phased resolution pipeline, inspired by Autofac.
//!
//! ## Features
//!
//! - **Service keys**: typed, keyed, and decorator services over a closed
//!   sum type
//! - **Lifetime scopes**: a tree of scopes with current-scope, root-scope,
//!   and matching-tagged-scope sharing, and deterministic disposal in
//!   reverse construction order (sync and async)
//! - **Resolution pipeline**: every construction flows through composable
//!   phased middleware with circular-dependency detection
//! - **Registration sources**: collections, `Lazy<T>`, `Owned<T>`,
//!   `Meta<T>`, factories, and keyed indexes synthesized on demand
//! - **Decorators**: registered wrappers applied outermost-last, shared
//!   correctly with shared components
//! - **Diagnostics**: structured events around operations, requests, and
//!   middleware, with a `tracing` bridge
//!
//! ## Quick start
//!
//! ```rust
//! use lattice_di::{provide, provide_arc, RegistryBuilder};
//! use std::sync::Arc;
//!
//! trait Notifier: Send + Sync {
//!     fn notify(&self, message: &str) -> String;
//! }
//!
//! struct EmailNotifier {
//!     from: Arc<Config>,
//! }
//!
//! impl Notifier for EmailNotifier {
//!     fn notify(&self, message: &str) -> String {
//!         format!("{} <{}>", message, self.from.address)
//!     }
//! }
//!
//! struct Config {
//!     address: String,
//! }
//!
//! let mut builder = RegistryBuilder::new();
//! builder
//!     .register(
//!         provide::<Config>(|_| {
//!             Ok(Config {
//!                 address: "noreply@example.com".to_string(),
//!             })
//!         })
//!         .single_instance(),
//!     )
//!     .unwrap();
//! builder
//!     .register(provide_arc::<dyn Notifier, _>(|ctx| {
//!         Ok(Arc::new(EmailNotifier {
//!             from: ctx.resolve::<Config>()?,
//!         }))
//!     }))
//!     .unwrap();
//!
//! let root = builder.build_container().unwrap();
//! let notifier = root.resolve::<dyn Notifier>().unwrap();
//! assert_eq!(
//!     notifier.notify("hello"),
//!     "hello <noreply@example.com>"
//! );
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use lattice_di::{provide, RegistryBuilder};
//!
//! struct RequestState;
//!
//! let mut builder = RegistryBuilder::new();
//! builder
//!     .register(provide::<RequestState>(|_| Ok(RequestState)).instance_per_scope())
//!     .unwrap();
//! let root = builder.build_container().unwrap();
//!
//! let request = root.begin_scope().unwrap();
//! let a = request.resolve::<RequestState>().unwrap();
//! let b = request.resolve::<RequestState>().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//!
//! request.dispose();
//! assert!(request.resolve::<RequestState>().is_err());
//! ```

#![warn(missing_docs)]

pub mod adapters;
pub mod decoration;
pub mod diagnostics;
pub mod dispose;
pub mod error;
pub mod instance;
pub mod lifetime;
pub mod operation;
pub mod parameter;
pub mod pipeline;
pub mod registration;
pub mod registry;
pub mod scope;
pub mod service;

#[cfg(feature = "graph-export")]
pub mod graph_export;

mod events;

pub use adapters::{Factory, Lazy, Meta, Owned, ServiceIndex};
pub use decoration::DecoratorContext;
pub use diagnostics::{
    DiagnosticEvent, DiagnosticEventKey, DiagnosticListener, TracingDiagnosticListener,
};
pub use dispose::{AsyncDispose, BoxDisposeFuture, Dispose, DisposerHandle};
pub use error::{ResolveError, ResolveResult};
pub use instance::{downcast_instance, erase_instance, DynInstance};
pub use lifetime::{Lifetime, ScopeTag};
pub use operation::{ResolveOperation, ResolveRequest, ResolveRequestContext};
pub use parameter::{
    NamedParameter, Parameter, ParameterDescriptor, PositionalParameter, ResolvedParameter,
    TypedParameter,
};
pub use pipeline::{
    InsertionMode, Middleware, Next, PipelineBuilder, PipelineKind, PipelinePhase, ResolvePipeline,
};
pub use registration::{
    metadata_value, provide, provide_arc, provide_instance, Activator, ComponentRegistration,
    InstanceOwnership, InstanceSharing, MetadataMap, RegistrationBuilder, RegistrationId,
    RegistrationOptions, ResolvedComponent,
};
pub use registry::{ComponentRegistry, RegistrationSource, RegistryBuilder, SourceAccessor};
pub use scope::LifetimeScope;
pub use service::{AdapterKind, Service, ServiceKey, ServiceType};
