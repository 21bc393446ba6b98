//! Reference data: customers, vehicles, products and the lookup tables
//! tickets point at.
//!
//! Pure domain logic only. Persistence lives in `weighbridge-infra`.

pub mod catalog;
pub mod guard;
pub mod lookup;
pub mod snapshot;

pub use catalog::{
    CreateCustomer, CreateProduct, CreateVehicle, Customer, Product, ProductDefaults, Vehicle,
    create_customer, create_product, create_vehicle, product_defaults,
};
pub use guard::{Deactivation, IN_USE_MESSAGE, activate, deactivate, plan_deactivation};
pub use lookup::{CreateLookup, Lookup, LookupKind, OTHER_VOID_REASON_CODE, create_lookup};
pub use snapshot::{ReferenceSnapshot, ReferenceSource};
