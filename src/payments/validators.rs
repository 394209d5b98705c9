use super::models::CreatePaymentRequest;
use crate::access::validators::validate_user_id;
use crate::common::{Validate, ValidationResult};

const MAX_DISPLAY_NAME_LENGTH: usize = 128;

pub fn validate_display_name(display_name: &str) -> Result<(), String> {
    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        return Err("Display name is required".to_string());
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(format!(
            "Display name must not exceed {} characters",
            MAX_DISPLAY_NAME_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_amount(amount: i64) -> Result<(), String> {
    if amount <= 0 {
        return Err("Amount must be a positive number of naira".to_string());
    }
    Ok(())
}

/// The quoted amount has to be exactly the current price
pub fn validate_amount_matches_price(amount: i64, price: i64) -> Result<(), String> {
    if amount != price {
        return Err(format!("Amount must equal the current price of {}", price));
    }
    Ok(())
}

impl Validate for CreatePaymentRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.check("requester_id", validate_user_id(&self.requester_id));
        result.check("display_name", validate_display_name(&self.display_name));
        result.check("amount", validate_amount(self.amount));
        result
    }
}
