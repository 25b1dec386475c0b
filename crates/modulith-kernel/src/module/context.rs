//! Per-module gateway to the runtime.
//!
//! A [`ModuleContext`] exists only while its module is Loaded.  Everything a
//! module does to the outside world -- registering and consuming services,
//! subscribing to events, looking up other modules -- goes through its
//! context, which lets Stop tear all of it down again.

use std::sync::Arc;

use modulith_filter::Properties;

use crate::error::Result;
use crate::event::{ModuleEvent, ServiceEvent};
use crate::module::Module;
use crate::service::{Service, ServiceProvider, ServiceReference, ServiceRegistration};
use crate::ModuleId;

/// A module's handle into the runtime.
#[derive(Clone)]
pub struct ModuleContext {
    pub(crate) module: Arc<Module>,
}

impl ModuleContext {
    /// The module this context belongs to.
    #[must_use]
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    /// Register a service under one or more interface names.
    ///
    /// # Errors
    ///
    /// [`crate::KernelError::InvalidArgument`] for an empty interface list
    /// or a provider failing the interface check.
    pub fn register_service(
        &self,
        interfaces: &[&str],
        provider: ServiceProvider,
        properties: Properties,
    ) -> Result<ServiceRegistration> {
        self.module.core.services.register_service(
            &self.module.core,
            &self.module,
            interfaces,
            provider,
            properties,
        )
    }

    /// Rank-ordered references for `interface`, optionally narrowed by a
    /// filter expression.  An empty interface name matches every service.
    ///
    /// # Errors
    ///
    /// [`crate::KernelError::Filter`] when the filter fails to parse.
    pub fn get_service_references(
        &self,
        interface: &str,
        filter: Option<&str>,
    ) -> Result<Vec<ServiceReference>> {
        self.module
            .core
            .services
            .get_service_references(interface, filter)
    }

    /// The best-ranked reference for `interface`, if any.
    #[must_use]
    pub fn get_service_reference(&self, interface: &str) -> Option<ServiceReference> {
        self.module.core.services.get_service_reference(interface)
    }

    /// Obtain the service object behind `reference`, counting the use
    /// against this module.  `None` when the service is gone or its factory
    /// faults.
    #[must_use]
    pub fn get_service(&self, reference: &ServiceReference) -> Option<Arc<dyn Service>> {
        self.module
            .core
            .services
            .get_service(&self.module.core, &self.module, reference)
    }

    /// Give back one use of `reference`.  Returns whether this module
    /// actually held the service.
    pub fn unget_service(&self, reference: &ServiceReference) -> bool {
        self.module
            .core
            .services
            .unget_service(&self.module.core, &self.module, reference, true)
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Subscribe a service listener under `listener_id`.  Re-adding the
    /// same id replaces the existing subscription.
    ///
    /// # Errors
    ///
    /// [`crate::KernelError::Filter`] when `filter` fails to parse.
    pub fn add_service_listener(
        &self,
        listener_id: &str,
        callback: impl Fn(&ServiceEvent) + Send + Sync + 'static,
        filter: Option<&str>,
    ) -> Result<()> {
        self.module.core.listeners.add_service_listener(
            self.module.id(),
            listener_id,
            Arc::new(callback),
            filter,
        )
    }

    /// Remove the service listener under `listener_id`, if any.
    pub fn remove_service_listener(&self, listener_id: &str) {
        self.module
            .core
            .listeners
            .remove_service_listener(self.module.id(), listener_id);
    }

    /// Subscribe a module listener.  Duplicate ids are refused; returns
    /// whether the listener was added.
    pub fn add_module_listener(
        &self,
        listener_id: &str,
        callback: impl Fn(&ModuleEvent) + Send + Sync + 'static,
    ) -> bool {
        self.module.core.listeners.add_module_listener(
            self.module.id(),
            listener_id,
            Arc::new(callback),
        )
    }

    /// Remove the module listener under `listener_id`.
    pub fn remove_module_listener(&self, listener_id: &str) -> bool {
        self.module
            .core
            .listeners
            .remove_module_listener(self.module.id(), listener_id)
    }

    // -----------------------------------------------------------------------
    // Modules
    // -----------------------------------------------------------------------

    /// Look up a module by id.
    #[must_use]
    pub fn get_module(&self, id: ModuleId) -> Option<Arc<Module>> {
        self.module.core.modules.get(id)
    }

    /// Snapshot of every known module, ordered by id.
    #[must_use]
    pub fn get_modules(&self) -> Vec<Arc<Module>> {
        self.module.core.modules.modules()
    }
}
