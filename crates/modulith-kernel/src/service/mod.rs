//! Service registration, discovery, and consumption.
//!
//! A service is an object (or a factory able to mint one per consuming
//! module) registered under one or more interface names together with a
//! property map.  [`registry::ServiceRegistry`] is the authoritative table;
//! [`ServiceReference`] and [`ServiceRegistration`] are the read-mostly and
//! registrant-owned façades over a single shared registration record.

pub mod factory;
pub(crate) mod record;
pub mod reference;
pub mod registration;
pub mod registry;

pub use factory::{Service, ServiceFactory, ServiceProvider};
pub use reference::ServiceReference;
pub use registration::ServiceRegistration;
pub use registry::ServiceRegistry;
