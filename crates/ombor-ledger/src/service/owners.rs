//! Factories and customers. Both start with zero debt, and only ledger
//! transactions move it afterwards.

use serde::{Deserialize, Serialize};
use tracing::info;

use ombor_core::validation::{normalize_optional, validate_name, validate_optional_text};
use ombor_core::{Customer, Factory, Money};

use super::Ledger;
use crate::error::LedgerResult;

/// Input for a new factory (supplier).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFactory {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl NewFactory {
    pub fn named(name: impl Into<String>) -> Self {
        NewFactory {
            name: name.into(),
            ..NewFactory::default()
        }
    }
}

/// Input for a new customer. Only the name is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl NewCustomer {
    pub fn named(name: impl Into<String>) -> Self {
        NewCustomer {
            name: name.into(),
            ..NewCustomer::default()
        }
    }
}

impl Ledger {
    pub async fn create_factory(&self, input: NewFactory) -> LedgerResult<Factory> {
        validate_name("name", &input.name)?;
        validate_optional_text("phone", input.phone.as_deref())?;
        validate_optional_text("address", input.address.as_deref())?;

        let factory = Factory {
            id: String::new(),
            name: input.name.trim().to_string(),
            phone: normalize_optional(input.phone),
            address: normalize_optional(input.address),
            debt: Money::zero(),
            created_at: self.now(),
        };
        let id = self.db.factories().create(factory.clone()).await?;

        info!(factory_id = %id, name = %factory.name, "Factory created");
        Ok(Factory { id, ..factory })
    }

    pub async fn create_customer(&self, input: NewCustomer) -> LedgerResult<Customer> {
        validate_name("name", &input.name)?;
        validate_optional_text("phone", input.phone.as_deref())?;
        validate_optional_text("location", input.location.as_deref())?;

        let customer = Customer {
            id: String::new(),
            name: input.name.trim().to_string(),
            phone: normalize_optional(input.phone),
            location: normalize_optional(input.location),
            debt: Money::zero(),
            created_at: self.now(),
        };
        let id = self.db.customers().create(customer.clone()).await?;

        info!(customer_id = %id, name = %customer.name, "Customer created");
        Ok(Customer { id, ..customer })
    }
}
