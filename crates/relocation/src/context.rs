use serde::Serialize;

use stockmove_core::{RelocationError, RelocationResult};

/// Placeholder shown by warehouse pickers before a choice is made.
const UNSELECTED_WAREHOUSE: &str = "SELECT LOCATION";

/// Warehouse and acting user for one batch run.
///
/// Both fields are guaranteed non-blank once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseContext {
    warehouse_name: String,
    acting_user: String,
}

impl WarehouseContext {
    pub fn new(
        warehouse_name: impl Into<String>,
        acting_user: impl Into<String>,
    ) -> RelocationResult<Self> {
        let warehouse_name = warehouse_name.into().trim().to_string();
        let acting_user = acting_user.into().trim().to_string();

        if acting_user.is_empty() {
            return Err(RelocationError::input("Please enter your username."));
        }
        if warehouse_name.is_empty() || warehouse_name == UNSELECTED_WAREHOUSE {
            return Err(RelocationError::input("Please select a valid location."));
        }

        Ok(Self {
            warehouse_name,
            acting_user,
        })
    }

    pub fn warehouse_name(&self) -> &str {
        &self.warehouse_name
    }

    pub fn acting_user(&self) -> &str {
        &self.acting_user
    }
}
