//! Kernel error types.
//!
//! All registry subsystems surface errors through [`KernelError`].  The
//! variants mirror the propagation policy of the runtime: filter syntax and
//! invalid-argument errors always reach the immediate caller; mutating an
//! already-unregistered service registration is an error, while the benign
//! double-unregister race is a silent no-op; faults raised by caller-supplied
//! listeners and service factories are *never* returned -- they are caught at
//! the dispatch boundary, logged, and swallowed so one misbehaving delegate
//! cannot block delivery to the rest.

use modulith_filter::FilterError;

use crate::ModuleId;

/// Unified error type for the modulith kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A filter string failed to parse.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// A caller supplied an unusable argument (no interface names, or a
    /// service object that does not implement a declared interface).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument.
        reason: String,
    },

    /// A mutating operation was attempted on a service registration that has
    /// already been unregistered.
    #[error("service has been unregistered")]
    ServiceUnregistered,

    /// The referenced module does not exist in the registry.
    #[error("module not found: {module_id}")]
    ModuleNotFound {
        /// The id that was looked up.
        module_id: ModuleId,
    },

    /// A module activator's load or unload hook failed.  The underlying
    /// error is whatever the activator reported.
    #[error("activator failure in module `{module}`: {source}")]
    Activator {
        /// Name of the module whose activator failed.
        module: String,
        /// The activator's own error.
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
