//! Module and service lifecycle events.
//!
//! Events are plain immutable values delivered synchronously, on the calling
//! thread, to every matching listener.  A listener may re-enter the registry
//! from inside its own notification; dispatch therefore never holds a
//! registry lock while an event is being delivered.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::module::Module;
use crate::service::ServiceReference;

/// Lifecycle phase announced by a module event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleEventKind {
    /// The module is about to run its activator's load hook.
    Loading,
    /// The module finished loading and is usable.
    Loaded,
    /// The module is about to run its activator's unload hook.
    Unloading,
    /// The module finished unloading; its context is gone.
    Unloaded,
}

/// Lifecycle phase announced by a service event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceEventKind {
    /// A service was registered.
    Registered,
    /// A service's properties changed and the listener's filter still
    /// matches.
    Modified,
    /// A service's properties changed and the listener's filter matched the
    /// old properties but not the new ones.
    ModifiedEndmatch,
    /// A service is in the process of being unregistered.  It is still
    /// reachable while this event is being delivered.
    Unregistering,
}

/// Event delivered to module listeners.
#[derive(Clone)]
pub struct ModuleEvent {
    /// Which lifecycle transition occurred.
    pub kind: ModuleEventKind,
    /// The module the event is about.
    pub module: Arc<Module>,
    /// When the event was raised.
    pub timestamp: DateTime<Utc>,
}

impl ModuleEvent {
    pub(crate) fn new(kind: ModuleEventKind, module: Arc<Module>) -> Self {
        Self {
            kind,
            module,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Debug for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEvent")
            .field("kind", &self.kind)
            .field("module", &self.module.name())
            .finish()
    }
}

/// Event delivered to service listeners.
#[derive(Clone)]
pub struct ServiceEvent {
    /// Which lifecycle transition occurred.
    pub kind: ServiceEventKind,
    /// Reference to the affected service.
    pub reference: ServiceReference,
    /// When the event was raised.
    pub timestamp: DateTime<Utc>,
}

impl ServiceEvent {
    pub(crate) fn new(kind: ServiceEventKind, reference: ServiceReference) -> Self {
        Self {
            kind,
            reference,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEvent")
            .field("kind", &self.kind)
            .field("service_id", &self.reference.service_id())
            .finish()
    }
}
