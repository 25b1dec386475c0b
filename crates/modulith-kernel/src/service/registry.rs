//! The authoritative service table.
//!
//! One registry per core context.  The index is a ranked per-interface map:
//! each bucket keeps its records best-first, where "best" means higher
//! `service.ranking` and, among equal rankings, the larger (younger)
//! `service.id`.  All index structures live under a single mutex; snapshots
//! are taken and the lock released before filters are evaluated or any
//! caller code runs.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use modulith_filter::{Filter, Properties, Value};

use crate::core::CoreContext;
use crate::error::{KernelError, Result};
use crate::event::{ServiceEvent, ServiceEventKind};
use crate::module::Module;
use crate::service::factory::{self, Service, ServiceProvider};
use crate::service::record::{RegistrationRecord, Usage};
use crate::service::{ServiceReference, ServiceRegistration};
use crate::{ModuleId, ServiceId, keys, lock};

struct RegistryState {
    /// Interface name → records implementing it, best-first.
    by_interface: HashMap<String, Vec<Arc<RegistrationRecord>>>,
    /// Registering module → its live records.
    by_module: HashMap<ModuleId, Vec<Arc<RegistrationRecord>>>,
    /// Every live record by service id.
    all: HashMap<ServiceId, Arc<RegistrationRecord>>,
}

/// Registry of all currently registered services.
pub struct ServiceRegistry {
    inner: Mutex<RegistryState>,
    next_id: AtomicI64,
}

impl ServiceRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryState {
                by_interface: HashMap::new(),
                by_module: HashMap::new(),
                all: HashMap::new(),
            }),
            next_id: AtomicI64::new(1),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register `provider` under `interfaces` on behalf of `module`.
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidArgument`] when the interface list is empty or
    /// contains an empty name, or when a shared-instance provider does not
    /// implement every listed interface.
    pub(crate) fn register_service(
        &self,
        core: &Arc<CoreContext>,
        module: &Arc<Module>,
        interfaces: &[&str],
        provider: ServiceProvider,
        properties: Properties,
    ) -> Result<ServiceRegistration> {
        if interfaces.is_empty() {
            return Err(KernelError::InvalidArgument {
                reason: "service registered with an empty interface list".into(),
            });
        }
        if interfaces.iter().any(|name| name.is_empty()) {
            return Err(KernelError::InvalidArgument {
                reason: "service interface names must be non-empty".into(),
            });
        }
        let declared: Vec<String> = interfaces.iter().map(|s| (*s).to_owned()).collect();
        if let ServiceProvider::Instance(service) = &provider
            && !factory::satisfies_interfaces(service.as_ref(), &declared)
        {
            return Err(KernelError::InvalidArgument {
                reason: format!(
                    "service object does not implement all declared interfaces: {declared:?}"
                ),
            });
        }

        let service_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut merged = properties;
        merged.insert(
            keys::OBJECT_CLASS,
            Value::List(declared.iter().cloned().map(Value::Str).collect()),
        );
        merged.insert(keys::SERVICE_ID, Value::Int(service_id));

        let record = Arc::new(RegistrationRecord::new(
            module.id(),
            service_id,
            merged,
            provider,
        ));

        {
            let mut inner = lock(&self.inner);
            for interface in &declared {
                let bucket = inner.by_interface.entry(interface.clone()).or_default();
                insert_ranked(bucket, Arc::clone(&record));
            }
            inner
                .by_module
                .entry(module.id())
                .or_default()
                .push(Arc::clone(&record));
            inner.all.insert(service_id, Arc::clone(&record));
        }

        tracing::debug!(
            service_id,
            module_id = module.id(),
            interfaces = ?declared,
            "service registered"
        );

        let reference = ServiceReference {
            record: Arc::clone(&record),
        };
        let receivers = core.listeners.matching_listeners(&reference);
        let event = ServiceEvent::new(ServiceEventKind::Registered, reference);
        core.listeners.service_changed(&receivers, &event, None);

        Ok(ServiceRegistration {
            record,
            core: Arc::clone(core),
        })
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Rank-ordered references for `interface`, optionally narrowed by a
    /// filter expression.  An empty interface name matches every service.
    ///
    /// # Errors
    ///
    /// [`KernelError::Filter`] when `filter` fails to parse; lookup state is
    /// untouched in that case.
    pub fn get_service_references(
        &self,
        interface: &str,
        filter: Option<&str>,
    ) -> Result<Vec<ServiceReference>> {
        let filter = filter.map(Filter::parse).transpose()?;

        let candidates: Vec<Arc<RegistrationRecord>> = {
            let inner = lock(&self.inner);
            if interface.is_empty() {
                let mut records: Vec<_> = inner.all.values().cloned().collect();
                sort_ranked(&mut records);
                records
            } else {
                inner
                    .by_interface
                    .get(interface)
                    .cloned()
                    .unwrap_or_default()
            }
        };

        Ok(candidates
            .into_iter()
            .filter(|record| match &filter {
                Some(filter) => filter.evaluate(&record.properties(), false),
                None => true,
            })
            .map(|record| ServiceReference { record })
            .collect())
    }

    /// The best-ranked reference for `interface`, if any.
    pub fn get_service_reference(&self, interface: &str) -> Option<ServiceReference> {
        let inner = lock(&self.inner);
        inner
            .by_interface
            .get(interface)
            .and_then(|bucket| bucket.first())
            .map(|record| ServiceReference {
                record: Arc::clone(record),
            })
    }

    // -----------------------------------------------------------------------
    // Consumption
    // -----------------------------------------------------------------------

    /// Obtain the service object behind `reference` on behalf of `module`.
    ///
    /// The first call per module mints the object (through the factory when
    /// one was registered) and caches it with usage count 1; later calls
    /// increment the count and return the cached object.  Returns `None`
    /// when the service is gone or the factory faults -- factory faults are
    /// logged, never propagated.
    pub(crate) fn get_service(
        &self,
        core: &Arc<CoreContext>,
        module: &Arc<Module>,
        reference: &ServiceReference,
    ) -> Option<Arc<dyn Service>> {
        let record = &reference.record;

        let provider = {
            let mut state = lock(&record.state);
            if !state.available {
                return None;
            }
            if let Some(usage) = state.usage.get_mut(&module.id()) {
                usage.count += 1;
                return Some(Arc::clone(&usage.instance));
            }
            state.provider.clone()?
        };

        let (instance, minting_factory) = match provider {
            ServiceProvider::Instance(service) => (service, None),
            ServiceProvider::Factory(factory) => {
                let registration = ServiceRegistration {
                    record: Arc::clone(record),
                    core: Arc::clone(core),
                };
                let minted =
                    match catch_unwind(AssertUnwindSafe(|| factory.get_service(module, &registration)))
                    {
                        Ok(Ok(service)) => service,
                        Ok(Err(error)) => {
                            tracing::error!(
                                service_id = record.service_id,
                                module_id = module.id(),
                                error = %error,
                                "service factory failed to produce an instance"
                            );
                            return None;
                        }
                        Err(_) => {
                            tracing::error!(
                                service_id = record.service_id,
                                module_id = module.id(),
                                "service factory panicked while producing an instance"
                            );
                            return None;
                        }
                    };
                let declared = record.interfaces();
                if !factory::satisfies_interfaces(minted.as_ref(), &declared) {
                    tracing::error!(
                        service_id = record.service_id,
                        module_id = module.id(),
                        interfaces = ?declared,
                        "factory-produced object does not implement the declared interfaces"
                    );
                    // The rejected object was still minted; give it back.
                    let _ = catch_unwind(AssertUnwindSafe(|| {
                        factory.unget_service(module, &registration, &minted);
                    }));
                    return None;
                }
                (minted, Some(factory))
            }
        };

        // A concurrent first get may have cached an instance already, or
        // unregistration may have won the race; either way a factory-minted
        // spare still owes its release hook before being discarded.
        let (result, spare) = {
            let mut state = lock(&record.state);
            if !state.available {
                (None, Some(instance))
            } else {
                match state.usage.entry(module.id()) {
                    Entry::Occupied(mut cached) => {
                        let usage = cached.get_mut();
                        usage.count += 1;
                        (Some(Arc::clone(&usage.instance)), Some(instance))
                    }
                    Entry::Vacant(slot) => {
                        let shared = Arc::clone(&instance);
                        slot.insert(Usage { count: 1, instance });
                        (Some(shared), None)
                    }
                }
            }
        };

        if let (Some(factory), Some(spare)) = (minting_factory, spare) {
            let registration = ServiceRegistration {
                record: Arc::clone(record),
                core: Arc::clone(core),
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                factory.unget_service(module, &registration, &spare);
            }));
            if outcome.is_err() {
                tracing::warn!(
                    service_id = record.service_id,
                    module_id = module.id(),
                    "service factory panicked while releasing an instance"
                );
            }
        }
        result
    }

    /// Give back one use of `reference` held by `module`.
    ///
    /// With `check_ref_counter` the usage count is decremented and the
    /// cached instance evicted only when it reaches zero; without it
    /// (forced teardown) the instance is evicted unconditionally.  Returns
    /// whether the module actually held the service.
    pub(crate) fn unget_service(
        &self,
        core: &Arc<CoreContext>,
        module: &Arc<Module>,
        reference: &ServiceReference,
        check_ref_counter: bool,
    ) -> bool {
        let record = &reference.record;

        let evicted = {
            let mut state = lock(&record.state);
            let Some(usage) = state.usage.get_mut(&module.id()) else {
                return false;
            };
            if check_ref_counter {
                usage.count -= 1;
                if usage.count > 0 {
                    return true;
                }
            }
            state.usage.remove(&module.id())
        };

        if let Some(usage) = evicted {
            let provider = lock(&record.state).provider.clone();
            if let Some(ServiceProvider::Factory(factory)) = provider {
                let registration = ServiceRegistration {
                    record: Arc::clone(record),
                    core: Arc::clone(core),
                };
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    factory.unget_service(module, &registration, &usage.instance);
                }));
                if outcome.is_err() {
                    tracing::warn!(
                        service_id = record.service_id,
                        module_id = module.id(),
                        "service factory panicked while releasing an instance"
                    );
                }
            }
        }
        true
    }

    /// Forcibly release every service `module` still consumes.  Part of the
    /// module Stop cleanup.
    pub(crate) fn release_used_services(&self, core: &Arc<CoreContext>, module: &Arc<Module>) {
        let records: Vec<Arc<RegistrationRecord>> =
            lock(&self.inner).all.values().cloned().collect();
        for record in records {
            let reference = ServiceReference { record };
            self.unget_service(core, module, &reference, false);
        }
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    /// References to every service registered by `module_id`, best-first.
    pub fn registered_by_module(&self, module_id: ModuleId) -> Vec<ServiceReference> {
        let inner = lock(&self.inner);
        let mut records = inner.by_module.get(&module_id).cloned().unwrap_or_default();
        drop(inner);
        sort_ranked(&mut records);
        records
            .into_iter()
            .map(|record| ServiceReference { record })
            .collect()
    }

    /// References to every service `module_id` currently holds a usage
    /// count on.
    pub fn used_by_module(&self, module_id: ModuleId) -> Vec<ServiceReference> {
        let records: Vec<Arc<RegistrationRecord>> =
            lock(&self.inner).all.values().cloned().collect();
        records
            .into_iter()
            .filter(|record| lock(&record.state).usage.contains_key(&module_id))
            .map(|record| ServiceReference { record })
            .collect()
    }

    /// Drop `record` from every index structure.  The record itself stays
    /// alive through any references still pointing at it.
    pub(crate) fn remove_registration(&self, record: &Arc<RegistrationRecord>) {
        let interfaces = record.interfaces();
        let mut inner = lock(&self.inner);
        for interface in &interfaces {
            if let Some(bucket) = inner.by_interface.get_mut(interface) {
                bucket.retain(|r| r.service_id != record.service_id);
                if bucket.is_empty() {
                    inner.by_interface.remove(interface);
                }
            }
        }
        if let Some(owned) = inner.by_module.get_mut(&record.module_id) {
            owned.retain(|r| r.service_id != record.service_id);
            if owned.is_empty() {
                inner.by_module.remove(&record.module_id);
            }
        }
        inner.all.remove(&record.service_id);
    }

    /// Re-sort every bucket containing `record` after a ranking change.
    pub(crate) fn update_registration_order(&self, record: &Arc<RegistrationRecord>) {
        let interfaces = record.interfaces();
        let mut inner = lock(&self.inner);
        for interface in &interfaces {
            if let Some(bucket) = inner.by_interface.get_mut(interface) {
                sort_ranked(bucket);
            }
        }
    }
}

/// Best-first ordering key: higher ranking wins; ties go to the younger
/// (larger) service id.
fn rank_key(record: &RegistrationRecord) -> (i64, ServiceId) {
    (record.ranking(), record.service_id)
}

fn sort_ranked(records: &mut [Arc<RegistrationRecord>]) {
    records.sort_by(|a, b| rank_key(b).cmp(&rank_key(a)));
}

fn insert_ranked(bucket: &mut Vec<Arc<RegistrationRecord>>, record: Arc<RegistrationRecord>) {
    let key = rank_key(&record);
    let pos = bucket
        .iter()
        .position(|existing| rank_key(existing) < key)
        .unwrap_or(bucket.len());
    bucket.insert(pos, record);
}
