pub mod config;
pub mod errors;
pub mod logging;
pub mod manifest;
pub mod runtime;

// Re-export commonly used items for convenience
pub use config::RuntimeConfig;
pub use errors::{BoxError, CompositionError, ConfigError, LookupError};
pub use runtime::{
    compose, BoundReference, CompositionReport, Composer, Composition, Constructed, Consumer,
    Diagnostic, DiagnosticKind, Instance, InstanceStore, PackageDescriptor, PropertyDescriptor,
    ProvidedInterface, ReferenceDescriptor, ServiceContext, ServiceDescriptor, ServiceFactory,
    ServiceId, StoreStats,
};
