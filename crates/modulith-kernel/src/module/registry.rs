//! The flat module table.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

use crate::core::CoreContext;
use crate::error::{KernelError, Result};
use crate::module::{Module, ModuleInfo};
use crate::ModuleId;

/// Id reserved for the runtime's own bootstrap module, registered when the
/// core context is constructed.
pub const CORE_MODULE_ID: ModuleId = 1;

/// Registry of every module the runtime has ever seen.
///
/// Ids are process-unique and never reused: an unregistered module stays
/// resolvable by id (in its Unloaded state) for diagnostics, and a module
/// re-registered from the same location gets its old id back.
pub struct ModuleRegistry {
    modules: DashMap<ModuleId, Arc<Module>>,
    next_id: AtomicI64,
}

impl ModuleRegistry {
    pub(crate) fn new() -> Self {
        Self {
            modules: DashMap::new(),
            next_id: AtomicI64::new(CORE_MODULE_ID),
        }
    }

    /// Register (or re-register) a module and start it.
    ///
    /// A descriptor already carrying an id refers to an existing module,
    /// which is simply started.  Otherwise a module previously registered
    /// from the same location is re-initialized in place, reusing its id;
    /// failing that, a fresh id is allocated and the module inserted into
    /// the table before its first start.
    ///
    /// # Errors
    ///
    /// [`KernelError::ModuleNotFound`] for an id with no module behind it;
    /// [`KernelError::Activator`] when the activator's load hook fails (the
    /// module stays registered, Unloaded).
    pub(crate) fn register(
        &self,
        core: &Arc<CoreContext>,
        info: ModuleInfo,
    ) -> Result<Arc<Module>> {
        if let Some(id) = info.id {
            let module = self.get(id).ok_or(KernelError::ModuleNotFound {
                module_id: id,
            })?;
            module.start()?;
            return Ok(module);
        }

        if !info.location.is_empty()
            && let Some(existing) = self.find_by_location(&info.location)
        {
            tracing::debug!(
                module_id = existing.id(),
                location = %info.location,
                "module re-registered from known location, reusing id"
            );
            existing.reinitialize(info);
            existing.start()?;
            return Ok(existing);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut info = info;
        info.id = Some(id);
        let name = info.name.clone();
        let module = Module::new(id, Arc::clone(core), info);
        // Visible in the table before Start so listeners fired during
        // loading can resolve it.
        self.modules.insert(id, Arc::clone(&module));
        tracing::debug!(module_id = id, name = %name, "module registered");
        module.start()?;
        Ok(module)
    }

    /// Stop a module and release its activator.  The module stays in the
    /// table, resolvable by id.
    ///
    /// # Errors
    ///
    /// [`KernelError::ModuleNotFound`] when the descriptor matches nothing;
    /// [`KernelError::Activator`] when the unload hook fails (cleanup has
    /// already run by then).
    pub(crate) fn unregister(&self, info: &ModuleInfo) -> Result<()> {
        let id = match info.id {
            Some(id) => id,
            None => self
                .find_by_location(&info.location)
                .map(|m| m.id())
                .ok_or_else(|| KernelError::InvalidArgument {
                    reason: format!("no module registered from location '{}'", info.location),
                })?,
        };
        let module = self
            .get(id)
            .ok_or(KernelError::ModuleNotFound { module_id: id })?;

        if id == CORE_MODULE_ID {
            // The bootstrap module is torn down without a context.
            return module.unload_bootstrap();
        }

        tracing::debug!(module_id = id, name = %module.name(), "module unregistered");
        let outcome = module.stop();
        module.release_activator();
        outcome
    }

    /// Look up a module by id.
    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<Arc<Module>> {
        self.modules.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every known module, ordered by id.
    #[must_use]
    pub fn modules(&self) -> Vec<Arc<Module>> {
        let mut all: Vec<Arc<Module>> = self
            .modules
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by_key(|module| module.id());
        all
    }

    fn find_by_location(&self, location: &str) -> Option<Arc<Module>> {
        if location.is_empty() {
            return None;
        }
        self.modules
            .iter()
            .find(|entry| entry.value().location() == location)
            .map(|entry| Arc::clone(entry.value()))
    }
}
