//! Read-only view of the reference rows a single operation needs.
//!
//! Workflows load the rows a request mentions from the store, put them in a
//! [`ReferenceSnapshot`], and hand that to the pure ticket/invoice rules.

use std::collections::HashMap;

use weighbridge_core::{CustomerId, LookupId, ProductId, VehicleId};

use crate::catalog::{Customer, Product, Vehicle};
use crate::lookup::{Lookup, LookupKind};

pub trait ReferenceSource {
    fn customer(&self, id: CustomerId) -> Option<&Customer>;
    fn vehicle(&self, id: VehicleId) -> Option<&Vehicle>;
    fn product(&self, id: ProductId) -> Option<&Product>;
    fn lookup(&self, id: LookupId) -> Option<&Lookup>;

    /// Lookup of a specific kind; a row of another kind counts as missing.
    fn lookup_of(&self, kind: LookupKind, id: LookupId) -> Option<&Lookup> {
        self.lookup(id).filter(|l| l.kind == kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceSnapshot {
    customers: HashMap<CustomerId, Customer>,
    vehicles: HashMap<VehicleId, Vehicle>,
    products: HashMap<ProductId, Product>,
    lookups: HashMap<LookupId, Lookup>,
}

impl ReferenceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(mut self, c: Customer) -> Self {
        self.insert_customer(c);
        self
    }

    pub fn with_vehicle(mut self, v: Vehicle) -> Self {
        self.insert_vehicle(v);
        self
    }

    pub fn with_product(mut self, p: Product) -> Self {
        self.insert_product(p);
        self
    }

    pub fn with_lookup(mut self, l: Lookup) -> Self {
        self.insert_lookup(l);
        self
    }

    pub fn insert_customer(&mut self, c: Customer) {
        self.customers.insert(c.id, c);
    }

    pub fn insert_vehicle(&mut self, v: Vehicle) {
        self.vehicles.insert(v.id, v);
    }

    pub fn insert_product(&mut self, p: Product) {
        self.products.insert(p.id, p);
    }

    pub fn insert_lookup(&mut self, l: Lookup) {
        self.lookups.insert(l.id, l);
    }
}

impl ReferenceSource for ReferenceSnapshot {
    fn customer(&self, id: CustomerId) -> Option<&Customer> {
        self.customers.get(&id)
    }

    fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    fn lookup(&self, id: LookupId) -> Option<&Lookup> {
        self.lookups.get(&id)
    }
}
