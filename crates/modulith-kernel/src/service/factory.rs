//! Service object and service factory traits.

use std::any::Any;
use std::sync::Arc;

use crate::module::Module;
use crate::service::registration::ServiceRegistration;

/// A registrable service object.
///
/// Implementors declare the interface names they can be looked up under;
/// the registry checks this list against the interfaces declared at
/// registration time (and again for every object a [`ServiceFactory`]
/// mints).  [`Service::as_any`] supports downcasting back to the concrete
/// type on the consumer side.
///
/// # Example
///
/// ```rust
/// use std::any::Any;
/// use modulith_kernel::Service;
///
/// struct Echo;
///
/// impl Service for Echo {
///     fn interfaces(&self) -> Vec<String> {
///         vec!["com.example.Echo".to_owned()]
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait Service: Send + Sync {
    /// Interface names this object implements.
    fn interfaces(&self) -> Vec<String>;

    /// The object as [`Any`], for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Mints one service instance per consuming module.
///
/// The registry calls [`ServiceFactory::get_service`] the first time a given
/// module requests the service and caches the result for that module;
/// [`ServiceFactory::unget_service`] runs when the cached instance is
/// evicted (last unget, or forced teardown).  A factory error is logged by
/// the registry and surfaces to the consumer only as "no service object" --
/// it never propagates.
pub trait ServiceFactory: Send + Sync {
    /// Produce the instance handed to `module`.
    fn get_service(
        &self,
        module: &Arc<Module>,
        registration: &ServiceRegistration,
    ) -> anyhow::Result<Arc<dyn Service>>;

    /// Release an instance previously minted for `module`.
    fn unget_service(
        &self,
        module: &Arc<Module>,
        registration: &ServiceRegistration,
        service: &Arc<dyn Service>,
    );
}

/// What a registrant hands to the registry: a shared instance or a
/// per-module factory.
#[derive(Clone)]
pub enum ServiceProvider {
    /// A single instance shared by every consumer.
    Instance(Arc<dyn Service>),
    /// A factory minting one instance per consuming module.
    Factory(Arc<dyn ServiceFactory>),
}

/// Whether `service` implements every interface in `required`.
pub(crate) fn satisfies_interfaces(service: &dyn Service, required: &[String]) -> bool {
    let provided = service.interfaces();
    required.iter().all(|r| provided.iter().any(|p| p == r))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoFaced;

    impl Service for TwoFaced {
        fn interfaces(&self) -> Vec<String> {
            vec!["IFoo".to_owned(), "IBar".to_owned()]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn interface_check_requires_superset() {
        let service = TwoFaced;
        assert!(satisfies_interfaces(&service, &["IFoo".to_owned()]));
        assert!(satisfies_interfaces(
            &service,
            &["IFoo".to_owned(), "IBar".to_owned()]
        ));
        assert!(!satisfies_interfaces(
            &service,
            &["IFoo".to_owned(), "IBaz".to_owned()]
        ));
    }
}
