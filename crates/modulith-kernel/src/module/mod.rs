//! Modules and their lifecycle.
//!
//! A [`Module`] is a registered unit of functionality that moves between
//! `Unloaded` and `Loaded`.  Start and Stop fire lifecycle events around the
//! activator hooks, and Stop always runs the cleanup sweep -- listeners,
//! registered services, consumed services -- even when the unload hook
//! faults.

pub mod context;
pub mod info;
pub mod registry;

pub use context::ModuleContext;
pub use info::{ACTIVATOR_SYMBOL_PREFIX, ActivatorFactory, ModuleActivator, ModuleInfo};
pub use registry::{CORE_MODULE_ID, ModuleRegistry};

use std::fmt;
use std::sync::{Arc, Mutex};

use modulith_filter::{Properties, Value};

use crate::core::CoreContext;
use crate::error::{KernelError, Result};
use crate::event::{ModuleEvent, ModuleEventKind};
use crate::service::ServiceRegistration;
use crate::{ModuleId, keys, lock};

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Registered but not running; no context exists.
    Unloaded,
    /// Running; the module has a context and may own services/listeners.
    Loaded,
}

struct ModuleInner {
    info: ModuleInfo,
    state: ModuleState,
    context: Option<ModuleContext>,
    activator: Option<Box<dyn ModuleActivator>>,
    /// Whether the current activator's load hook ran successfully, so its
    /// unload hook should run on Stop.
    activator_loaded: bool,
    /// Set while a Start or Stop is in flight; a concurrent call seeing it
    /// takes the warned no-op path instead of running the hooks again.
    transitioning: bool,
    properties: Properties,
}

/// A registered module.
pub struct Module {
    id: ModuleId,
    pub(crate) core: Arc<CoreContext>,
    inner: Mutex<ModuleInner>,
}

impl Module {
    pub(crate) fn new(id: ModuleId, core: Arc<CoreContext>, info: ModuleInfo) -> Arc<Self> {
        let properties = build_properties(&info, id);
        Arc::new(Self {
            id,
            core,
            inner: Mutex::new(ModuleInner {
                info,
                state: ModuleState::Unloaded,
                context: None,
                activator: None,
                activator_loaded: false,
                transitioning: false,
                properties,
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The registry-assigned id.  Process-unique, never reused.
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Declared module name.
    #[must_use]
    pub fn name(&self) -> String {
        lock(&self.inner).info.name.clone()
    }

    /// Origin path the module was registered from.
    #[must_use]
    pub fn location(&self) -> String {
        lock(&self.inner).info.location.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ModuleState {
        lock(&self.inner).state
    }

    /// Snapshot of the current descriptor.
    #[must_use]
    pub fn info(&self) -> ModuleInfo {
        lock(&self.inner).info.clone()
    }

    /// The module's context.  `Some` only while Loaded.
    #[must_use]
    pub fn context(&self) -> Option<ModuleContext> {
        lock(&self.inner).context.clone()
    }

    /// Derived module properties (`module.id`, `module.name`, …).
    #[must_use]
    pub fn properties(&self) -> Properties {
        lock(&self.inner).properties.clone()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Load the module: announce `Loading`, run the activator's load hook,
    /// transition to Loaded, announce `Loaded`.
    ///
    /// Starting an already-loaded module, or one whose Start or Stop is
    /// already in flight on another thread, is a warned no-op.
    ///
    /// # Errors
    ///
    /// [`KernelError::Activator`] when the load hook fails; the module
    /// stays Unloaded and its context is discarded.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut inner = lock(&self.inner);
            if inner.state == ModuleState::Loaded || inner.transitioning {
                tracing::warn!(
                    module_id = self.id,
                    name = %inner.info.name,
                    "start ignored: module already loaded or transitioning"
                );
                return Ok(());
            }
            inner.transitioning = true;
        }

        let context = ModuleContext {
            module: Arc::clone(self),
        };
        lock(&self.inner).context = Some(context.clone());

        tracing::debug!(module_id = self.id, name = %self.name(), "loading module");
        self.core
            .listeners
            .module_changed(&ModuleEvent::new(ModuleEventKind::Loading, Arc::clone(self)));

        // Instantiate the activator outside the lock; the factory is
        // caller code.
        let factory = {
            let inner = lock(&self.inner);
            if inner.activator.is_some() {
                None
            } else {
                inner.info.activator.clone()
            }
        };
        if let Some(factory) = factory {
            let fresh = factory();
            lock(&self.inner).activator.get_or_insert(fresh);
        }

        let mut activator = lock(&self.inner).activator.take();
        if let Some(hook) = activator.as_mut() {
            let outcome = hook.load(&context);
            let failed = outcome.is_err();
            {
                let mut inner = lock(&self.inner);
                inner.activator = activator;
                inner.activator_loaded = !failed;
                if failed {
                    inner.context = None;
                    inner.transitioning = false;
                }
            }
            if let Err(source) = outcome {
                let name = self.name();
                tracing::error!(
                    module_id = self.id,
                    name = %name,
                    error = %source,
                    "module activator failed to load"
                );
                return Err(KernelError::Activator {
                    module: name,
                    source,
                });
            }
        }

        {
            let mut inner = lock(&self.inner);
            inner.state = ModuleState::Loaded;
            inner.transitioning = false;
        }
        self.core
            .listeners
            .module_changed(&ModuleEvent::new(ModuleEventKind::Loaded, Arc::clone(self)));
        tracing::debug!(module_id = self.id, "module loaded");
        Ok(())
    }

    /// Unload the module: announce `Unloading`, run the activator's unload
    /// hook, clean up everything the module owns, transition to Unloaded,
    /// announce `Unloaded`.
    ///
    /// Cleanup always runs, even when the unload hook fails; the hook's
    /// error is re-raised afterwards.  Stopping an already-unloaded module,
    /// or one whose Start or Stop is already in flight on another thread,
    /// is a warned no-op.
    ///
    /// # Errors
    ///
    /// [`KernelError::Activator`] when the unload hook failed.
    pub fn stop(self: &Arc<Self>) -> Result<()> {
        let context = {
            let mut inner = lock(&self.inner);
            if inner.state == ModuleState::Unloaded || inner.transitioning {
                tracing::warn!(
                    module_id = self.id,
                    name = %inner.info.name,
                    "stop ignored: module not loaded or transitioning"
                );
                return Ok(());
            }
            inner.transitioning = true;
            inner.context.clone()
        };

        tracing::debug!(module_id = self.id, name = %self.name(), "unloading module");
        self.core.listeners.module_changed(&ModuleEvent::new(
            ModuleEventKind::Unloading,
            Arc::clone(self),
        ));

        let mut held: Option<KernelError> = None;
        let (mut activator, loaded) = {
            let mut inner = lock(&self.inner);
            (inner.activator.take(), inner.activator_loaded)
        };
        if loaded
            && let (Some(hook), Some(ctx)) = (activator.as_mut(), context.as_ref())
            && let Err(source) = hook.unload(Some(ctx))
        {
            let name = self.name();
            tracing::error!(
                module_id = self.id,
                name = %name,
                error = %source,
                "module activator failed to unload"
            );
            held = Some(KernelError::Activator {
                module: name,
                source,
            });
        }
        {
            let mut inner = lock(&self.inner);
            inner.activator = activator;
            inner.activator_loaded = false;
        }

        // Cleanup sweep.  Each step tolerates re-entrant changes made by
        // listeners fired along the way.
        self.core.listeners.remove_all_listeners(self.id);
        for reference in self.core.services.registered_by_module(self.id) {
            let registration = ServiceRegistration {
                record: Arc::clone(&reference.record),
                core: Arc::clone(&self.core),
            };
            registration.unregister();
        }
        self.core.services.release_used_services(&self.core, self);

        {
            let mut inner = lock(&self.inner);
            inner.context = None;
            inner.state = ModuleState::Unloaded;
            inner.transitioning = false;
        }
        self.core.listeners.module_changed(&ModuleEvent::new(
            ModuleEventKind::Unloaded,
            Arc::clone(self),
        ));
        tracing::debug!(module_id = self.id, "module unloaded");

        match held {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Replace the descriptor in place for a module re-registered from the
    /// same location.  The id is kept; activator state is reset so the new
    /// descriptor's factory is used on the next start.
    pub(crate) fn reinitialize(&self, mut info: ModuleInfo) {
        info.id = Some(self.id);
        let mut inner = lock(&self.inner);
        inner.properties = build_properties(&info, self.id);
        inner.info = info;
        inner.activator = None;
        inner.activator_loaded = false;
    }

    /// Drop the activator instance so the next start constructs a fresh
    /// one from the descriptor's factory.
    pub(crate) fn release_activator(&self) {
        let mut inner = lock(&self.inner);
        inner.activator = None;
        inner.activator_loaded = false;
    }

    /// Bootstrap-only teardown: run the activator's unload hook directly,
    /// with no context and no lifecycle events.
    pub(crate) fn unload_bootstrap(&self) -> Result<()> {
        let mut activator = {
            let mut inner = lock(&self.inner);
            inner.state = ModuleState::Unloaded;
            inner.context = None;
            inner.activator_loaded = false;
            inner.transitioning = false;
            inner.activator.take()
        };
        if let Some(hook) = activator.as_mut()
            && let Err(source) = hook.unload(None)
        {
            return Err(KernelError::Activator {
                module: self.name(),
                source,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &inner.info.name)
            .field("state", &inner.state)
            .finish()
    }
}

/// The derived property map for a module descriptor.
fn build_properties(info: &ModuleInfo, id: ModuleId) -> Properties {
    let string_list =
        |items: &[String]| Value::List(items.iter().cloned().map(Value::Str).collect());
    [
        (keys::MODULE_ID, Value::Int(id)),
        (keys::MODULE_NAME, Value::Str(info.name.clone())),
        (keys::MODULE_LOCATION, Value::Str(info.location.clone())),
        (keys::MODULE_VERSION, Value::Str(info.version.clone())),
        (keys::MODULE_DEPENDS, string_list(&info.module_depends)),
        (keys::MODULE_LIB_DEPENDS, string_list(&info.lib_depends)),
        (
            keys::MODULE_PACKAGE_DEPENDS,
            string_list(&info.package_depends),
        ),
        (keys::MODULE_QT, Value::Bool(info.qt)),
    ]
    .into_iter()
    .collect()
}
