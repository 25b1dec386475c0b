//! Module descriptors and the activator seam.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ModuleId;
use crate::module::context::ModuleContext;

/// Prefix of the entry-point symbol a host resolves to obtain a module's
/// activator.  How the symbol is actually resolved (dlopen, static table,
/// …) is the host's business; the registry only derives the name.
pub const ACTIVATOR_SYMBOL_PREFIX: &str = "modulith_activator_instance_";

/// Lifecycle hooks a module may supply.
///
/// Hook failures are reported as [`anyhow::Error`] and surface to the
/// `start`/`stop` caller wrapped in [`crate::KernelError::Activator`].
pub trait ModuleActivator: Send {
    /// Runs while the module is loading, after `Loading` has been
    /// announced.  A failure aborts the transition.
    fn load(&mut self, ctx: &ModuleContext) -> anyhow::Result<()>;

    /// Runs while the module is unloading.  `ctx` is `None` only for the
    /// runtime's own bootstrap module, which is torn down without a
    /// context.  A failure is held until cleanup finishes, then re-raised.
    fn unload(&mut self, ctx: Option<&ModuleContext>) -> anyhow::Result<()>;
}

/// Produces a fresh activator for a module.  Stands in for the host's
/// symbol-resolution mechanics.
pub type ActivatorFactory = Arc<dyn Fn() -> Box<dyn ModuleActivator> + Send + Sync>;

/// Static description of a module, as handed to
/// [`crate::CoreContext::register_module`].
#[derive(Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Unique module name.
    pub name: String,
    /// Declared version string.
    #[serde(default)]
    pub version: String,
    /// Origin path; modules re-registered from the same location reuse
    /// their id.
    #[serde(default)]
    pub location: String,
    /// Names of modules this module depends on.
    #[serde(default)]
    pub module_depends: Vec<String>,
    /// Names of external libraries this module depends on.
    #[serde(default)]
    pub lib_depends: Vec<String>,
    /// Names of external packages this module depends on.
    #[serde(default)]
    pub package_depends: Vec<String>,
    /// Whether the module links against the host UI toolkit.
    #[serde(default)]
    pub qt: bool,
    /// Assigned by the registry; a descriptor carrying an id refers to an
    /// already-registered module.
    #[serde(default)]
    pub id: Option<ModuleId>,
    /// Supplies the module's activator, if it has one.
    #[serde(skip)]
    pub activator: Option<ActivatorFactory>,
}

impl ModuleInfo {
    /// A descriptor with the given name and everything else empty.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            location: String::new(),
            module_depends: Vec::new(),
            lib_depends: Vec::new(),
            package_depends: Vec::new(),
            qt: false,
            id: None,
            activator: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    #[must_use]
    pub fn with_module_depends(mut self, depends: Vec<String>) -> Self {
        self.module_depends = depends;
        self
    }

    #[must_use]
    pub fn with_lib_depends(mut self, depends: Vec<String>) -> Self {
        self.lib_depends = depends;
        self
    }

    #[must_use]
    pub fn with_package_depends(mut self, depends: Vec<String>) -> Self {
        self.package_depends = depends;
        self
    }

    #[must_use]
    pub fn with_qt(mut self, qt: bool) -> Self {
        self.qt = qt;
        self
    }

    #[must_use]
    pub fn with_activator(
        mut self,
        factory: impl Fn() -> Box<dyn ModuleActivator> + Send + Sync + 'static,
    ) -> Self {
        self.activator = Some(Arc::new(factory));
        self
    }

    /// Name of the entry-point symbol a host would resolve for this module.
    #[must_use]
    pub fn activator_symbol(&self) -> String {
        format!("{ACTIVATOR_SYMBOL_PREFIX}{}", self.name)
    }
}

impl fmt::Debug for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInfo")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("location", &self.location)
            .field("id", &self.id)
            .field("has_activator", &self.activator.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activator_symbol_derives_from_name() {
        let info = ModuleInfo::new("org.example.logging");
        assert_eq!(
            info.activator_symbol(),
            "modulith_activator_instance_org.example.logging"
        );
    }

    #[test]
    fn descriptor_round_trips_through_json_without_the_activator() {
        let info = ModuleInfo::new("demo")
            .with_version("1.2.0")
            .with_location("/opt/modules/demo")
            .with_module_depends(vec!["core".to_owned()]);
        let json = serde_json::to_string(&info).expect("descriptor should serialize");
        let back: ModuleInfo = serde_json::from_str(&json).expect("descriptor should deserialize");
        assert_eq!(back.name, "demo");
        assert_eq!(back.version, "1.2.0");
        assert_eq!(back.module_depends, vec!["core".to_owned()]);
        assert!(back.activator.is_none());
    }
}
