//! Listener bookkeeping and synchronous event dispatch.
//!
//! Service listeners are indexed for cheap event routing: a listener whose
//! filter is a plain equality test on `objectclass` or `service.id` (or an
//! OR of such tests) goes into per-value hash buckets; everything else --
//! complex filters and listeners with no filter at all -- lands in a fallback
//! list that is scanned with full filter evaluation.  The index may be
//! tighter than evaluation but must never be looser: a missed bucket means a
//! missed event.  Module listeners are a plain [`DelegateList`].
//!
//! Dispatch never holds the listener lock while a callback runs, and every
//! callback is panic-isolated.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use modulith_filter::{Filter, Properties, SimpleCache, Value};

use crate::ModuleId;
use crate::delegate::DelegateList;
use crate::error::Result;
use crate::event::{ModuleEvent, ServiceEvent};
use crate::{keys, lock};

/// Attributes the simple-filter index is built over.  Order matters: it is
/// the column order of each entry's local cache.
const INDEX_KEYWORDS: [&str; 2] = [keys::OBJECT_CLASS, keys::SERVICE_ID];

pub(crate) type ServiceCallback = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;
pub(crate) type ModuleCallback = Arc<dyn Fn(&ModuleEvent) + Send + Sync>;

struct EntryInner {
    module_id: ModuleId,
    id: String,
    callback: ServiceCallback,
    filter: Option<Filter>,
    /// Set when the listener is removed so an in-flight dispatch skips it.
    removed: AtomicBool,
}

/// A registered service listener.  Identity is `(module, listener id)`.
#[derive(Clone)]
pub(crate) struct ListenerEntry {
    inner: Arc<EntryInner>,
}

impl ListenerEntry {
    fn matches(&self, properties: &Properties) -> bool {
        match &self.inner.filter {
            Some(filter) => filter.evaluate(properties, false),
            None => true,
        }
    }
}

impl PartialEq for ListenerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.inner.module_id == other.inner.module_id && self.inner.id == other.inner.id
    }
}

impl Eq for ListenerEntry {}

impl Hash for ListenerEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.module_id.hash(state);
        self.inner.id.hash(state);
    }
}

#[derive(Default)]
struct ServiceListenerState {
    entries: HashMap<(ModuleId, String), ListenerEntry>,
    /// Simple-index buckets, one map per entry of [`INDEX_KEYWORDS`].
    /// Bucket keys are lowercased literal values.
    buckets: [HashMap<String, HashSet<ListenerEntry>>; 2],
    /// Listeners needing full filter evaluation (or having no filter).
    complex: HashSet<ListenerEntry>,
}

/// Registry of service and module listeners for one core context.
pub struct ListenerRegistry {
    service: Mutex<ServiceListenerState>,
    module: DelegateList<ModuleEvent>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            service: Mutex::new(ServiceListenerState::default()),
            module: DelegateList::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Service listeners
    // -----------------------------------------------------------------------

    /// Subscribe a service listener under `(module_id, listener_id)`.
    ///
    /// Re-adding an existing key replaces the previous subscription (the
    /// new filter takes effect; the old callback stops receiving events).
    ///
    /// # Errors
    ///
    /// [`crate::KernelError::Filter`] when `filter` fails to parse; the
    /// previous subscription, if any, is left untouched.
    pub(crate) fn add_service_listener(
        &self,
        module_id: ModuleId,
        listener_id: &str,
        callback: ServiceCallback,
        filter: Option<&str>,
    ) -> Result<()> {
        let filter = filter.map(Filter::parse).transpose()?;

        let mut cache = SimpleCache::new();
        let simple = match &filter {
            Some(filter) => filter.is_simple(&INDEX_KEYWORDS, &mut cache, false),
            None => false,
        };

        let entry = ListenerEntry {
            inner: Arc::new(EntryInner {
                module_id,
                id: listener_id.to_owned(),
                callback,
                filter,
                removed: AtomicBool::new(false),
            }),
        };

        let mut state = lock(&self.service);
        if let Some(previous) = state
            .entries
            .insert((module_id, listener_id.to_owned()), entry.clone())
        {
            unindex(&mut state, &previous);
        }

        if simple {
            for (column, values) in cache.iter().enumerate() {
                for value in values {
                    state.buckets[column]
                        .entry(value.to_ascii_lowercase())
                        .or_default()
                        .insert(entry.clone());
                }
            }
        } else {
            state.complex.insert(entry);
        }

        tracing::debug!(module_id, listener_id, simple, "service listener added");
        Ok(())
    }

    /// Remove the service listener under `(module_id, listener_id)`, if any.
    pub(crate) fn remove_service_listener(&self, module_id: ModuleId, listener_id: &str) {
        let mut state = lock(&self.service);
        if let Some(entry) = state.entries.remove(&(module_id, listener_id.to_owned())) {
            unindex(&mut state, &entry);
            tracing::debug!(module_id, listener_id, "service listener removed");
        }
    }

    /// Drop every listener -- service and module -- owned by `module_id`.
    pub(crate) fn remove_all_listeners(&self, module_id: ModuleId) {
        let mut state = lock(&self.service);
        let keys: Vec<(ModuleId, String)> = state
            .entries
            .keys()
            .filter(|(owner, _)| *owner == module_id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(entry) = state.entries.remove(&key) {
                unindex(&mut state, &entry);
            }
        }
        drop(state);
        self.module.remove_all(module_id);
    }

    /// The listeners a service event about `reference` should reach, given
    /// its current properties: the complex fallback filtered by evaluation,
    /// plus the simple-index buckets for the reference's `objectclass`
    /// values and its `service.id`.
    pub(crate) fn matching_listeners(
        &self,
        reference: &crate::service::ServiceReference,
    ) -> Vec<ListenerEntry> {
        // Property snapshot taken before the listener lock.
        let properties = reference.properties();

        let state = lock(&self.service);
        let mut seen: HashSet<ListenerEntry> = HashSet::new();
        let mut receivers = Vec::new();

        for entry in &state.complex {
            if entry.matches(&properties) && seen.insert(entry.clone()) {
                receivers.push(entry.clone());
            }
        }

        let mut take_bucket = |bucket: Option<&HashSet<ListenerEntry>>| {
            if let Some(bucket) = bucket {
                for entry in bucket {
                    if seen.insert(entry.clone()) {
                        receivers.push(entry.clone());
                    }
                }
            }
        };

        match properties.get(keys::OBJECT_CLASS) {
            Some(Value::List(classes)) => {
                for class in classes {
                    if let Some(name) = class.as_str() {
                        take_bucket(state.buckets[0].get(&name.to_ascii_lowercase()));
                    }
                }
            }
            Some(Value::Str(class)) => {
                take_bucket(state.buckets[0].get(&class.to_ascii_lowercase()));
            }
            _ => {}
        }

        if let Some(id) = properties.get(keys::SERVICE_ID).and_then(Value::as_int) {
            take_bucket(state.buckets[1].get(&id.to_string()));
        }

        receivers
    }

    /// Deliver `event` to `receivers` in order, skipping entries removed
    /// since the receiver set was computed and isolating per-listener
    /// panics.  When `match_before` is supplied, every notified receiver is
    /// removed from it, leaving the set that matched only the pre-change
    /// properties.
    pub(crate) fn service_changed(
        &self,
        receivers: &[ListenerEntry],
        event: &ServiceEvent,
        mut match_before: Option<&mut Vec<ListenerEntry>>,
    ) {
        for entry in receivers {
            if let Some(before) = match_before.as_deref_mut() {
                before.retain(|candidate| candidate != entry);
            }
            if entry.inner.removed.load(Ordering::SeqCst) {
                continue;
            }
            let callback = Arc::clone(&entry.inner.callback);
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(
                    module_id = entry.inner.module_id,
                    listener_id = %entry.inner.id,
                    kind = ?event.kind,
                    "service listener panicked during dispatch"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Module listeners
    // -----------------------------------------------------------------------

    /// Subscribe a module listener; duplicate keys are refused (first
    /// registration wins).  Returns whether the listener was added.
    pub(crate) fn add_module_listener(
        &self,
        module_id: ModuleId,
        listener_id: &str,
        callback: ModuleCallback,
    ) -> bool {
        self.module.add(module_id, listener_id, callback)
    }

    /// Remove the module listener under `(module_id, listener_id)`.
    pub(crate) fn remove_module_listener(&self, module_id: ModuleId, listener_id: &str) -> bool {
        self.module.remove(module_id, listener_id)
    }

    /// Deliver a module event to every module listener.
    pub(crate) fn module_changed(&self, event: &ModuleEvent) {
        self.module.send(event);
    }
}

/// Drop `entry` from the dispatch structures and flag it so an in-flight
/// dispatch skips it.
fn unindex(state: &mut ServiceListenerState, entry: &ListenerEntry) {
    entry.inner.removed.store(true, Ordering::SeqCst);
    state.complex.remove(entry);
    for bucket_map in &mut state.buckets {
        bucket_map.retain(|_, bucket| {
            bucket.remove(entry);
            !bucket.is_empty()
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
