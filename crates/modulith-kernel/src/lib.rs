//! Modulith micro-services kernel.
//!
//! This crate provides the runtime core of an embedded micro-services
//! framework:
//!
//! - **[`module`]** -- Module registry and lifecycle: descriptors, activator
//!   hooks, Start/Stop with guaranteed cleanup, per-module contexts.
//! - **[`service`]** -- Typed service registry: ranked per-interface lookup,
//!   shared-instance and per-module factory providers, usage counting.
//! - **[`listeners`]** -- Service/module listener registry with a
//!   simple-filter dispatch index and per-listener fault isolation.
//! - **[`event`]** -- Module and service lifecycle events, delivered
//!   synchronously on the calling thread.
//! - **[`delegate`]** -- Generic order-preserving multicast callback list.
//! - **[`error`]** -- Kernel error types via [`thiserror`].
//!
//! Service lookups are narrowed with the LDAP-style filter language from
//! the companion `modulith-filter` crate.  All public types are
//! `Send + Sync`; every operation runs synchronously on the calling thread
//! and no lock is ever held while caller code (listeners, activators,
//! factories) runs.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod core;
pub mod delegate;
pub mod error;
pub mod event;
pub mod keys;
pub mod listeners;
pub mod module;
pub mod service;

// Re-export the most commonly used types at the crate root for convenience.
pub use crate::core::{CORE_MODULE_NAME, CoreContext};
pub use delegate::DelegateList;
pub use error::{KernelError, Result};
pub use event::{ModuleEvent, ModuleEventKind, ServiceEvent, ServiceEventKind};
pub use listeners::ListenerRegistry;
pub use module::{
    ACTIVATOR_SYMBOL_PREFIX, ActivatorFactory, CORE_MODULE_ID, Module, ModuleActivator,
    ModuleContext, ModuleInfo, ModuleRegistry, ModuleState,
};
pub use service::{
    Service, ServiceFactory, ServiceProvider, ServiceReference, ServiceRegistration,
    ServiceRegistry,
};

// The filter language is part of the kernel's public surface: lookups and
// listener subscriptions take filter strings, and properties travel with
// every registration.
pub use modulith_filter::{Filter, FilterError, Properties, Value};

/// Unique id of a registered module.  Assigned once, never reused.
pub type ModuleId = i64;

/// Unique id of a service registration.  Strictly increasing, never reused.
pub type ServiceId = i64;

/// Lock a mutex, recovering the guard from a poisoned lock.  Kernel state
/// stays consistent across listener panics because locks are never held
/// while caller code runs; a poisoned mutex therefore only means a panic
/// inside the kernel's own short critical sections.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
