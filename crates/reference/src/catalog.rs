//! Customers, vehicles and products.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use weighbridge_core::{
    CustomerId, DomainResult, LookupId, ProductId, ValidationErrors, VehicleId,
    parse_currency_input, parse_weight_kg, round_currency,
};

use crate::lookup::{Lookup, LookupKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub account_code: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub registration: String,
    pub owner_customer_id: Option<CustomerId>,
    pub default_tare_kg: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub code: String,
    pub description: String,
    pub unit_id: Option<LookupId>,
    pub unit_price: Option<Decimal>,
    pub tax_rate_id: Option<LookupId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomer {
    pub account_code: String,
    pub name: String,
}

impl CreateCustomer {
    pub fn normalized_code(&self) -> String {
        self.account_code.trim().to_uppercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVehicle {
    pub registration: String,
    #[serde(default)]
    pub owner_customer_id: Option<CustomerId>,
    #[serde(default)]
    pub default_tare_kg: Option<String>,
}

impl CreateVehicle {
    pub fn normalized_registration(&self) -> String {
        self.registration.trim().to_uppercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub unit_id: Option<LookupId>,
    #[serde(default)]
    pub unit_price: Option<String>,
    #[serde(default)]
    pub tax_rate_id: Option<LookupId>,
}

impl CreateProduct {
    pub fn normalized_code(&self) -> String {
        self.code.trim().to_uppercase()
    }
}

pub fn create_customer(
    id: CustomerId,
    input: &CreateCustomer,
    code_taken: bool,
    now: DateTime<Utc>,
) -> DomainResult<Customer> {
    let mut errors = ValidationErrors::new();
    let account_code = input.normalized_code();
    let name = input.name.trim().to_string();
    if account_code.is_empty() {
        errors.push("Account code is required.");
    } else if code_taken {
        errors.push("Account code already exists.");
    }
    if name.is_empty() {
        errors.push("Name is required.");
    }
    errors.into_result()?;

    Ok(Customer {
        id,
        account_code,
        name,
        is_active: true,
        created_at: now,
    })
}

/// `owner_exists` is only consulted when an owner was supplied.
pub fn create_vehicle(
    id: VehicleId,
    input: &CreateVehicle,
    registration_taken: bool,
    owner_exists: bool,
    max_weight_kg: Decimal,
    now: DateTime<Utc>,
) -> DomainResult<Vehicle> {
    let mut errors = ValidationErrors::new();
    let registration = input.normalized_registration();
    if registration.is_empty() {
        errors.push("Registration is required.");
    } else if registration_taken {
        errors.push("Registration already exists.");
    }
    if input.owner_customer_id.is_some() && !owner_exists {
        errors.push("Owner customer not found.");
    }
    let default_tare_kg = match parse_weight_kg(
        input.default_tare_kg.as_deref().unwrap_or(""),
        "Default tare",
        max_weight_kg,
    ) {
        Ok(v) => v,
        Err(e) => {
            errors.extend(ValidationErrors::from(e.messages()));
            None
        }
    };
    errors.into_result()?;

    Ok(Vehicle {
        id,
        registration,
        owner_customer_id: input.owner_customer_id,
        default_tare_kg,
        is_active: true,
        created_at: now,
    })
}

/// `unit` and `tax_rate` are the rows the caller resolved for the submitted ids.
pub fn create_product(
    id: ProductId,
    input: &CreateProduct,
    code_taken: bool,
    unit: Option<&Lookup>,
    tax_rate: Option<&Lookup>,
    now: DateTime<Utc>,
) -> DomainResult<Product> {
    let mut errors = ValidationErrors::new();
    let code = input.normalized_code();
    let description = input.description.trim().to_string();
    if code.is_empty() {
        errors.push("Code is required.");
    } else if code_taken {
        errors.push("Code already exists.");
    }
    if description.is_empty() {
        errors.push("Description is required.");
    }
    if input.unit_id.is_some() && !unit.is_some_and(|u| u.kind == LookupKind::Unit) {
        errors.push("Unit not found.");
    }
    if input.tax_rate_id.is_some() && !tax_rate.is_some_and(|t| t.kind == LookupKind::TaxRate) {
        errors.push("Tax rate not found.");
    }
    let unit_price = match parse_currency_input(input.unit_price.as_deref().unwrap_or(""), "Unit price") {
        Ok(Some(p)) if p < Decimal::ZERO => {
            errors.push("Unit price must be zero or greater.");
            None
        }
        Ok(p) => p,
        Err(e) => {
            errors.extend(ValidationErrors::from(e.messages()));
            None
        }
    };
    errors.into_result()?;

    Ok(Product {
        id,
        code,
        description,
        unit_id: input.unit_id,
        unit_price,
        tax_rate_id: input.tax_rate_id,
        is_active: true,
        created_at: now,
    })
}

/// Pricing fields to pre-fill when a product is picked on a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDefaults {
    pub unit_id: Option<LookupId>,
    /// Formatted to 2 dp; empty when neither the operator nor the product has a price.
    pub unit_price: String,
}

/// Values the operator already entered win over the product's configured ones.
pub fn product_defaults(
    product: &Product,
    entered_unit_id: Option<LookupId>,
    entered_unit_price: Option<&str>,
) -> ProductDefaults {
    let unit_id = entered_unit_id.or(product.unit_id);
    let entered = entered_unit_price.map(str::trim).unwrap_or("");

    let unit_price = if entered.is_empty() {
        product
            .unit_price
            .map(|p| round_currency(p).to_string())
            .unwrap_or_default()
    } else {
        match parse_currency_input(entered, "Unit price") {
            Ok(Some(p)) => p.to_string(),
            _ => entered.to_string(),
        }
    };

    ProductDefaults { unit_id, unit_price }
}
