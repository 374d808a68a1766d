// Collection policies: what each (database, collection) permits, how its
// queries are narrowed and which intercepts run before persistence

pub mod builder;
pub mod file;
pub mod gate;
#[allow(clippy::module_inception)]
pub mod policy;
pub mod registry;

pub use builder::{PolicyBuilder, PolicyError};
pub use file::{load_registry, PolicyEntry, PolicyFile, PolicyFileError};
pub use gate::{AuthorizationDenied, AuthorizationGate};
pub use policy::{CollectionPolicy, OperationSet, WILDCARD};
pub use registry::{PolicyRegistry, RegistryBuilder, SharedRegistry};
