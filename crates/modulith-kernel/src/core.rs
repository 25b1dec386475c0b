//! The process-wide runtime context.

use std::sync::Arc;

use crate::error::Result;
use crate::listeners::ListenerRegistry;
use crate::module::{CORE_MODULE_ID, Module, ModuleContext, ModuleInfo, ModuleRegistry};
use crate::service::ServiceRegistry;
use crate::ModuleId;

/// Name the runtime registers its own bootstrap module under.
pub const CORE_MODULE_NAME: &str = "modulith.core";

/// The single runtime context tying the three registries together.
///
/// Everything is reachable from here and nothing lives in globals: a host
/// constructs a `CoreContext`, registers its modules against it, and module
/// code reaches the registries through its [`ModuleContext`].  Construction
/// also registers and starts the runtime's own bootstrap module under
/// [`CORE_MODULE_ID`](crate::module::CORE_MODULE_ID).
pub struct CoreContext {
    pub(crate) services: ServiceRegistry,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) modules: ModuleRegistry,
}

impl CoreContext {
    /// Construct a runtime context with its bootstrap module started.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let core = Arc::new(Self {
            services: ServiceRegistry::new(),
            listeners: ListenerRegistry::new(),
            modules: ModuleRegistry::new(),
        });
        // The bootstrap module has no activator; its start cannot fault.
        if let Err(error) = core.modules.register(&core, ModuleInfo::new(CORE_MODULE_NAME)) {
            tracing::error!(error = %error, "failed to start bootstrap module");
        }
        core
    }

    /// Register (or re-register) a module from its descriptor and start it.
    ///
    /// # Errors
    ///
    /// See [`crate::KernelError`]: `ModuleNotFound` for a dangling id,
    /// `Activator` when the load hook fails.
    pub fn register_module(self: &Arc<Self>, info: ModuleInfo) -> Result<Arc<Module>> {
        self.modules.register(self, info)
    }

    /// Stop a module and release its activator.  The module stays
    /// resolvable by id.
    ///
    /// # Errors
    ///
    /// See [`crate::KernelError`]: `ModuleNotFound`/`InvalidArgument` when
    /// the descriptor matches nothing, `Activator` when the unload hook
    /// fails.
    pub fn unregister_module(&self, info: &ModuleInfo) -> Result<()> {
        self.modules.unregister(info)
    }

    /// Look up a module by id.
    #[must_use]
    pub fn get_module(&self, id: ModuleId) -> Option<Arc<Module>> {
        self.modules.get(id)
    }

    /// Snapshot of every known module, ordered by id.
    #[must_use]
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.modules.modules()
    }

    /// The service table, for host-side lookups.
    #[must_use]
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// The bootstrap module's context.  `None` only if the bootstrap
    /// module has been torn down.
    #[must_use]
    pub fn context(&self) -> Option<ModuleContext> {
        self.modules.get(CORE_MODULE_ID).and_then(|m| m.context())
    }
}
