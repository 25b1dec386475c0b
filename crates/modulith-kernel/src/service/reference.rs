//! Read-mostly handle to a registered service.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use modulith_filter::{Properties, Value};

use crate::service::record::RegistrationRecord;
use crate::{ModuleId, ServiceId};

/// A shared, cheaply-cloneable handle to a service registration.
///
/// References outlive unregistration: once the service is gone the handle
/// keeps answering property queries with the last-known values, it just can
/// no longer be traded for a service object.
///
/// Ordering follows the registry's ranking law -- higher `service.ranking`
/// is greater, and among equal rankings the larger (more recently assigned)
/// `service.id` is greater -- so the maximum of a set of references is the
/// one a lookup would pick first.
#[derive(Clone)]
pub struct ServiceReference {
    pub(crate) record: Arc<RegistrationRecord>,
}

impl ServiceReference {
    /// The registration's unique id.
    #[must_use]
    pub fn service_id(&self) -> ServiceId {
        self.record.service_id
    }

    /// Id of the module that registered the service.
    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.record.module_id
    }

    /// Snapshot of the current (or, after unregistration, last-known)
    /// properties.
    #[must_use]
    pub fn properties(&self) -> Properties {
        self.record.properties()
    }

    /// Look up a single property, case-insensitively.
    #[must_use]
    pub fn get_property(&self, key: &str) -> Option<Value> {
        self.record.get_property(key)
    }

    /// Current `service.ranking` (0 when unset).
    #[must_use]
    pub fn ranking(&self) -> i64 {
        self.record.ranking()
    }

    /// Interface names the service was registered under.
    #[must_use]
    pub fn interfaces(&self) -> Vec<String> {
        self.record.interfaces()
    }

    /// Whether the service is still reachable through the registry.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.record.is_available()
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.record.service_id == other.record.service_id
    }
}

impl Eq for ServiceReference {}

impl Hash for ServiceReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.record.service_id.hash(state);
    }
}

impl PartialOrd for ServiceReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ranking()
            .cmp(&other.ranking())
            .then_with(|| self.record.service_id.cmp(&other.record.service_id))
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("service_id", &self.record.service_id)
            .field("module_id", &self.record.module_id)
            .field("interfaces", &self.interfaces())
            .finish()
    }
}
