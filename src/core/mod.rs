/*!
 * Core Module
 * Shared types, errors, configuration and the object tag registry
 */

pub mod config;
pub(crate) mod control;
pub mod errors;
pub mod registry;
pub mod types;

pub use config::{ConfigError, ShimConfig};
pub use errors::{base_type_of, ShimError, ShimResult};
pub use registry::{ObjectKey, ObjectRegistry, ObjectTag, RegistryStats};
pub use types::{
    Affinity, AllocationMode, BaseType, EventBits, Priority, ReloadMode, Tick, MAX_DELAY, NO_WAIT,
    PD_FAIL, PD_PASS,
};
