//! Reserved property keys.
//!
//! These exact strings are part of the runtime's external interface:
//! consumers build filters against them and the registries assign them, so
//! they must never change spelling.

/// Interface names a service implements.  Assigned at registration from the
/// declared interface list; immutable afterwards.
pub const OBJECT_CLASS: &str = "objectclass";

/// Unique id of a service registration.  Assigned at registration,
/// monotonically increasing, never reused.
pub const SERVICE_ID: &str = "service.id";

/// Integer ranking used to order same-interface services, highest first.
/// Defaults to 0; mutable via `set_properties`.
pub const SERVICE_RANKING: &str = "service.ranking";

/// Unique id of a module.
pub const MODULE_ID: &str = "module.id";

/// Declared module name.
pub const MODULE_NAME: &str = "module.name";

/// Origin path of the module.
pub const MODULE_LOCATION: &str = "module.location";

/// Declared module version.
pub const MODULE_VERSION: &str = "module.version";

/// Names of modules this module depends on.
pub const MODULE_DEPENDS: &str = "module.module_depends";

/// Names of external libraries this module depends on.
pub const MODULE_LIB_DEPENDS: &str = "module.lib_depends";

/// Names of external packages this module depends on.
pub const MODULE_PACKAGE_DEPENDS: &str = "module.package_depends";

/// Whether the module links against the host UI toolkit.
pub const MODULE_QT: &str = "module.qt";
