use super::models::{JoinRequestPayload, RedeemRequest, ReissueRequest};
use crate::common::id_generator::{ACCESS_TOKEN_LENGTH, CROCKFORD_ALPHABET};
use crate::common::{Validate, ValidationResult};

const MAX_USER_ID_LENGTH: usize = 64;

/// Chat platform user ids are numeric (group ids may carry a leading '-')
pub fn validate_user_id(user_id: &str) -> Result<(), String> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err("User id is required".to_string());
    }
    if trimmed.len() > MAX_USER_ID_LENGTH {
        return Err(format!(
            "User id must not exceed {} characters",
            MAX_USER_ID_LENGTH
        ));
    }
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("User id must be numeric".to_string());
    }
    Ok(())
}

/// Shape check only; case and surrounding whitespace are forgiven
pub fn validate_token_format(token: &str) -> Result<(), String> {
    let normalized = token.trim().to_uppercase();
    if normalized.len() != ACCESS_TOKEN_LENGTH
        || !normalized.bytes().all(|b| CROCKFORD_ALPHABET.contains(&b))
    {
        return Err(format!(
            "Token must be {} characters from the access token alphabet",
            ACCESS_TOKEN_LENGTH
        ));
    }
    Ok(())
}

impl Validate for RedeemRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.check("token", validate_token_format(&self.token));
        result.check("user_id", validate_user_id(&self.user_id));
        result
    }
}

impl Validate for ReissueRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.check("owner_id", validate_user_id(&self.owner_id));
        result
    }
}

impl Validate for JoinRequestPayload {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.check("member_id", validate_user_id(&self.member_id));
        result
    }
}
