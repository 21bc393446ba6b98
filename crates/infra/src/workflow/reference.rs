//! Reference-data workflows: create, activate and the guarded deactivate.

use serde::Serialize;
use tracing::{debug, info, instrument};

use weighbridge_core::{CustomerId, LookupId, ProductId, VehicleId};
use weighbridge_reference::{
    CreateCustomer, CreateLookup, CreateProduct, CreateVehicle, Customer, Deactivation, Lookup,
    LookupKind, Product, Vehicle, create_customer, create_lookup, create_product, create_vehicle,
};

use super::{Services, WorkflowError, WorkflowResult};
use crate::store::StoreError;

/// Response of a deactivate/activate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Deactivation> for ToggleResult {
    fn from(value: Deactivation) -> Self {
        Self {
            success: value.is_success(),
            message: value.message().map(str::to_string),
        }
    }
}

/// A unique index can still reject a code that passed the pre-check.
fn duplicate_as_validation(err: StoreError, message: &str) -> WorkflowError {
    match err {
        StoreError::UniqueViolation(_) => weighbridge_core::DomainError::validation(message).into(),
        other => other.into(),
    }
}

impl Services {
    #[instrument(skip(self, input), fields(kind = kind.as_str()), err)]
    pub async fn create_lookup(&self, kind: LookupKind, input: &CreateLookup) -> WorkflowResult<Lookup> {
        let code = input.normalized_code();
        let taken = !code.is_empty() && self.reference.find_lookup(kind, &code).await?.is_some();
        let lookup = create_lookup(LookupId::new(), kind, input, taken, self.clock.now())
            .inspect_err(|e| debug!(error = %e, "lookup rejected"))?;
        self.reference
            .insert_lookup(&lookup)
            .await
            .map_err(|e| duplicate_as_validation(e, "Code already exists."))?;
        info!(lookup_id = %lookup.id, code = %lookup.code, "lookup created");
        Ok(lookup)
    }

    pub async fn list_lookups(&self, kind: LookupKind) -> WorkflowResult<Vec<Lookup>> {
        Ok(self.reference.list_lookups(kind).await?)
    }

    #[instrument(skip(self, input), err)]
    pub async fn create_customer(&self, input: &CreateCustomer) -> WorkflowResult<Customer> {
        let code = input.normalized_code();
        let taken = !code.is_empty() && self.reference.customer_code_taken(&code).await?;
        let customer = create_customer(CustomerId::new(), input, taken, self.clock.now())
            .inspect_err(|e| debug!(error = %e, "customer rejected"))?;
        self.reference
            .insert_customer(&customer)
            .await
            .map_err(|e| duplicate_as_validation(e, "Account code already exists."))?;
        info!(customer_id = %customer.id, account_code = %customer.account_code, "customer created");
        Ok(customer)
    }

    #[instrument(skip(self, input), err)]
    pub async fn create_vehicle(&self, input: &CreateVehicle) -> WorkflowResult<Vehicle> {
        let registration = input.normalized_registration();
        let taken = !registration.is_empty() && self.reference.registration_taken(&registration).await?;
        let owner_exists = match input.owner_customer_id {
            Some(id) => self.reference.get_customer(id).await?.is_some(),
            None => true,
        };
        let vehicle = create_vehicle(
            VehicleId::new(),
            input,
            taken,
            owner_exists,
            self.settings.max_weight_kg,
            self.clock.now(),
        )
        .inspect_err(|e| debug!(error = %e, "vehicle rejected"))?;
        self.reference
            .insert_vehicle(&vehicle)
            .await
            .map_err(|e| duplicate_as_validation(e, "Registration already exists."))?;
        info!(vehicle_id = %vehicle.id, registration = %vehicle.registration, "vehicle created");
        Ok(vehicle)
    }

    #[instrument(skip(self, input), err)]
    pub async fn create_product(&self, input: &CreateProduct) -> WorkflowResult<Product> {
        let code = input.normalized_code();
        let taken = !code.is_empty() && self.reference.product_code_taken(&code).await?;
        let unit = match input.unit_id {
            Some(id) => self.reference.get_lookup(id).await?,
            None => None,
        };
        let tax_rate = match input.tax_rate_id {
            Some(id) => self.reference.get_lookup(id).await?,
            None => None,
        };
        let product = create_product(
            ProductId::new(),
            input,
            taken,
            unit.as_ref(),
            tax_rate.as_ref(),
            self.clock.now(),
        )
        .inspect_err(|e| debug!(error = %e, "product rejected"))?;
        self.reference
            .insert_product(&product)
            .await
            .map_err(|e| duplicate_as_validation(e, "Code already exists."))?;
        info!(product_id = %product.id, code = %product.code, "product created");
        Ok(product)
    }

    /// Blocked while any ticket references the row; a no-op when already inactive.
    #[instrument(skip(self), fields(kind = kind.as_str(), lookup_id = %id), err)]
    pub async fn deactivate_lookup(&self, kind: LookupKind, id: LookupId) -> WorkflowResult<ToggleResult> {
        let decision = self
            .reference
            .deactivate_lookup(kind, id, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::NotFound => WorkflowError::not_found(),
                other => other.into(),
            })?;
        match decision {
            Deactivation::Deactivate => info!("lookup deactivated"),
            Deactivation::InUse => debug!("lookup in use by tickets, left active"),
            Deactivation::AlreadyInactive => {}
        }
        Ok(decision.into())
    }

    #[instrument(skip(self), fields(kind = kind.as_str(), lookup_id = %id), err)]
    pub async fn activate_lookup(&self, kind: LookupKind, id: LookupId) -> WorkflowResult<ToggleResult> {
        let changed = self
            .reference
            .activate_lookup(kind, id, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::NotFound => WorkflowError::not_found(),
                other => other.into(),
            })?;
        if changed {
            info!("lookup activated");
        }
        Ok(ToggleResult { success: true, message: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ReferenceStore, TicketStore};
    use crate::workflow::testing::{fixture, start};
    use weighbridge_core::{DomainError, TicketId};
    use weighbridge_reference::IN_USE_MESSAGE;
    use weighbridge_tickets::Ticket;

    #[tokio::test]
    async fn referenced_haulier_stays_active() {
        let f = fixture().await;
        let mut t = Ticket::quick(TicketId::new(), "26-00001".into(), start());
        t.haulier_id = Some(f.haulier.id);
        f.store.insert_ticket(&t).await.unwrap();

        let result = f
            .services
            .deactivate_lookup(LookupKind::Haulier, f.haulier.id)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some(IN_USE_MESSAGE));
        let stored = f.store.get_lookup(f.haulier.id).await.unwrap().unwrap();
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn unused_lookup_toggles() {
        let f = fixture().await;
        let off = f
            .services
            .deactivate_lookup(LookupKind::Haulier, f.haulier.id)
            .await
            .unwrap();
        assert!(off.success);
        assert!(!f.store.get_lookup(f.haulier.id).await.unwrap().unwrap().is_active);

        let again = f
            .services
            .deactivate_lookup(LookupKind::Haulier, f.haulier.id)
            .await
            .unwrap();
        assert!(again.success);

        f.services.activate_lookup(LookupKind::Haulier, f.haulier.id).await.unwrap();
        assert!(f.store.get_lookup(f.haulier.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn wrong_kind_is_not_found() {
        let f = fixture().await;
        let err = f
            .services
            .deactivate_lookup(LookupKind::Driver, f.haulier.id)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn duplicate_codes_are_rejected() {
        let f = fixture().await;
        let err = f
            .services
            .create_lookup(
                LookupKind::Haulier,
                &CreateLookup { code: " haul1 ".into(), ..CreateLookup::default() },
            )
            .await
            .unwrap_err();
        assert_eq!(err.messages(), vec!["Code already exists.".to_string()]);

        let err = f
            .services
            .create_customer(&CreateCustomer { account_code: "acme".into(), name: "Other".into() })
            .await
            .unwrap_err();
        assert_eq!(err.messages(), vec!["Account code already exists.".to_string()]);
    }

    #[tokio::test]
    async fn vehicle_owner_must_exist() {
        let f = fixture().await;
        let created = f
            .services
            .create_vehicle(&CreateVehicle {
                registration: "xy99 zzz".into(),
                owner_customer_id: Some(f.customer.id),
                default_tare_kg: Some("7400".into()),
            })
            .await
            .unwrap();
        assert_eq!(created.owner_customer_id, Some(f.customer.id));

        let err = f
            .services
            .create_vehicle(&CreateVehicle {
                registration: "QQ11QQQ".into(),
                owner_customer_id: Some(CustomerId::new()),
                default_tare_kg: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::Validation(_))));
    }
}
