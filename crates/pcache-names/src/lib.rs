//! Mutable names for peercache.
//!
//! A name is an externally resolvable pointer that a publisher repoints at
//! successive index roots, analogous to an IPNS key. Readers resolve the name
//! to discover the latest snapshot.
//!
//! # Modules
//!
//! - [`error`]: Error types for name operations
//! - [`traits`]: The [`NameService`] capability trait
//! - [`names`]: Name validation
//! - [`memory`]: In-memory [`InMemoryNameService`] for tests

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;

pub use error::{NameError, Result};
pub use memory::{InMemoryNameService, NameRegistry};
pub use names::validate_name;
pub use traits::{DynNameService, NameService};
