//! Shared state behind one service registration.
//!
//! [`RegistrationRecord`] is the single source of truth that both
//! [`super::ServiceReference`] and [`super::ServiceRegistration`] point at.
//! Two locks protect it: `event_lock` serializes the mutating operations
//! that fire listener notifications (`set_properties`, `unregister`) up to
//! the point where their receiver sets are computed, and `state` guards the
//! actual data.  `state` nests inside `event_lock`; neither is ever held
//! while caller code runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use modulith_filter::{Properties, Value};

use crate::service::factory::ServiceProvider;
use crate::{ModuleId, ServiceId, keys, lock};

/// A module's cached use of a service: the minted (or shared) instance and
/// how many outstanding gets it holds.
pub(crate) struct Usage {
    pub(crate) count: u32,
    pub(crate) instance: Arc<dyn crate::service::Service>,
}

pub(crate) struct RecordState {
    pub(crate) properties: Properties,
    pub(crate) provider: Option<ServiceProvider>,
    pub(crate) usage: HashMap<ModuleId, Usage>,
    /// Cleared when the record leaves the lookup index.
    pub(crate) available: bool,
    /// Set at the start of unregistration; blocks re-entrant unregister.
    pub(crate) unregistering: bool,
}

pub(crate) struct RegistrationRecord {
    pub(crate) module_id: ModuleId,
    pub(crate) service_id: ServiceId,
    /// Serializes set_properties / unregister so their events stay ordered.
    pub(crate) event_lock: Mutex<()>,
    pub(crate) state: Mutex<RecordState>,
}

impl RegistrationRecord {
    pub(crate) fn new(
        module_id: ModuleId,
        service_id: ServiceId,
        properties: Properties,
        provider: ServiceProvider,
    ) -> Self {
        Self {
            module_id,
            service_id,
            event_lock: Mutex::new(()),
            state: Mutex::new(RecordState {
                properties,
                provider: Some(provider),
                usage: HashMap::new(),
                available: true,
                unregistering: false,
            }),
        }
    }

    /// Snapshot of the current properties.  Still answers after
    /// unregistration (last-known values).
    pub(crate) fn properties(&self) -> Properties {
        lock(&self.state).properties.clone()
    }

    pub(crate) fn get_property(&self, key: &str) -> Option<Value> {
        lock(&self.state).properties.get(key).cloned()
    }

    /// Current `service.ranking`, defaulting to 0 when absent or non-integer.
    pub(crate) fn ranking(&self) -> i64 {
        lock(&self.state)
            .properties
            .get(keys::SERVICE_RANKING)
            .and_then(Value::as_int)
            .unwrap_or(0)
    }

    /// Interface names from the `objectclass` property.
    pub(crate) fn interfaces(&self) -> Vec<String> {
        match lock(&self.state).properties.get(keys::OBJECT_CLASS) {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect(),
            Some(Value::Str(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub(crate) fn is_available(&self) -> bool {
        lock(&self.state).available
    }
}
