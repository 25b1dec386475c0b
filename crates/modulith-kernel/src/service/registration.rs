//! Registrant-owned handle to a service registration.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use modulith_filter::{Properties, Value};

use crate::core::CoreContext;
use crate::error::{KernelError, Result};
use crate::event::{ServiceEvent, ServiceEventKind};
use crate::service::ServiceReference;
use crate::service::factory::ServiceProvider;
use crate::service::record::RegistrationRecord;
use crate::{keys, lock};

/// The handle returned by `register_service`, owned by the registering
/// module.  It is the only way to update a service's properties or take the
/// service out of the registry again.
#[derive(Clone)]
pub struct ServiceRegistration {
    pub(crate) record: Arc<RegistrationRecord>,
    pub(crate) core: Arc<CoreContext>,
}

impl ServiceRegistration {
    /// A [`ServiceReference`] to this registration.
    ///
    /// # Errors
    ///
    /// [`KernelError::ServiceUnregistered`] once the service has been
    /// unregistered.
    pub fn reference(&self) -> Result<ServiceReference> {
        if !self.record.is_available() {
            return Err(KernelError::ServiceUnregistered);
        }
        Ok(ServiceReference {
            record: Arc::clone(&self.record),
        })
    }

    /// Replace the service's properties.
    ///
    /// `objectclass` and `service.id` are framework-assigned and keep their
    /// registration-time values regardless of what `properties` contains.  A
    /// change to `service.ranking` re-sorts the lookup index before any
    /// listener observes the new properties.  Listeners whose filter matches
    /// the new properties receive `Modified`; listeners that matched only
    /// the old ones receive `ModifiedEndmatch`.
    ///
    /// # Errors
    ///
    /// [`KernelError::ServiceUnregistered`] once the service has been
    /// unregistered.
    pub fn set_properties(&self, properties: Properties) -> Result<()> {
        let reference = ServiceReference {
            record: Arc::clone(&self.record),
        };

        // The event lock serializes competing mutations up to the point
        // where their receiver sets are computed; it is released before any
        // listener runs.
        let (mut match_before, match_after) = {
            let _events = lock(&self.record.event_lock);

            let match_before = self.core.listeners.matching_listeners(&reference);

            let ranking_changed = {
                let mut state = lock(&self.record.state);
                if !state.available || state.unregistering {
                    return Err(KernelError::ServiceUnregistered);
                }

                let old_ranking = state
                    .properties
                    .get(keys::SERVICE_RANKING)
                    .and_then(Value::as_int)
                    .unwrap_or(0);

                let mut merged = properties;
                if let Some(object_class) = state.properties.get(keys::OBJECT_CLASS).cloned() {
                    merged.insert(keys::OBJECT_CLASS, object_class);
                }
                merged.insert(keys::SERVICE_ID, Value::Int(self.record.service_id));

                let new_ranking = merged
                    .get(keys::SERVICE_RANKING)
                    .and_then(Value::as_int)
                    .unwrap_or(0);

                state.properties = merged;
                new_ranking != old_ranking
            };

            if ranking_changed {
                self.core.services.update_registration_order(&self.record);
            }

            tracing::debug!(
                service_id = self.record.service_id,
                ranking_changed,
                "service properties updated"
            );

            (match_before, self.core.listeners.matching_listeners(&reference))
        };

        let modified = ServiceEvent::new(ServiceEventKind::Modified, reference.clone());
        self.core
            .listeners
            .service_changed(&match_after, &modified, Some(&mut match_before));

        if !match_before.is_empty() {
            let endmatch = ServiceEvent::new(ServiceEventKind::ModifiedEndmatch, reference);
            self.core
                .listeners
                .service_changed(&match_before, &endmatch, None);
        }

        Ok(())
    }

    /// Take the service out of the registry.
    ///
    /// Matching listeners receive `Unregistering` while the service is
    /// still reachable through lookups; only then does the registration
    /// leave the index.  Cached per-module instances are released through
    /// the factory's release hook (faults logged and swallowed).  Calling
    /// this a second time is a silent no-op.
    pub fn unregister(&self) {
        // The guard also blocks the re-entrant case: an Unregistering
        // listener calling back into unregister lands here and returns.
        {
            let mut state = lock(&self.record.state);
            if !state.available || state.unregistering {
                tracing::debug!(
                    service_id = self.record.service_id,
                    "unregister ignored: service already unregistered"
                );
                return;
            }
            state.unregistering = true;
        }

        let reference = ServiceReference {
            record: Arc::clone(&self.record),
        };

        // Listeners must see the service while it is still reachable.
        let receivers = {
            let _events = lock(&self.record.event_lock);
            self.core.listeners.matching_listeners(&reference)
        };
        let event = ServiceEvent::new(ServiceEventKind::Unregistering, reference);
        self.core.listeners.service_changed(&receivers, &event, None);

        self.core.services.remove_registration(&self.record);

        let (provider, usage) = {
            let mut state = lock(&self.record.state);
            state.available = false;
            (state.provider.take(), std::mem::take(&mut state.usage))
        };

        tracing::debug!(
            service_id = self.record.service_id,
            module_id = self.record.module_id,
            "service unregistered"
        );

        if let Some(ServiceProvider::Factory(factory)) = provider {
            for (module_id, usage) in usage {
                let Some(module) = self.core.modules.get(module_id) else {
                    continue;
                };
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    factory.unget_service(&module, self, &usage.instance);
                }));
                if outcome.is_err() {
                    tracing::warn!(
                        service_id = self.record.service_id,
                        module_id,
                        "service factory panicked while releasing an instance"
                    );
                }
            }
        }
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("service_id", &self.record.service_id)
            .field("module_id", &self.record.module_id)
            .finish()
    }
}
