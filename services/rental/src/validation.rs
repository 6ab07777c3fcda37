//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Validate username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if username.len() < 3 {
        return Err("Username must be at least 3 characters long".to_string());
    }

    if username.len() > 32 {
        return Err("Username must be at most 32 characters long".to_string());
    }

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("Failed to compile username regex"));

    if !regex.is_match(username) {
        return Err("Username can only contain letters, numbers, and underscores".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    Ok(())
}

/// Validate a box code
pub fn validate_box_code(code: &str) -> Result<(), String> {
    if code.is_empty() {
        return Err("Box code is required".to_string());
    }

    if code.len() > 64 {
        return Err("Box code must be at most 64 characters long".to_string());
    }

    static BOX_CODE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = BOX_CODE_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Failed to compile box code regex"));

    if !regex.is_match(code) {
        return Err(
            "Box code can only contain letters, numbers, dashes, and underscores".to_string(),
        );
    }

    Ok(())
}

/// Validate a claim code scanned from a QR image
pub fn validate_claim_code(code: &str) -> Result<(), String> {
    if code.is_empty() || code.len() > 64 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Invalid or expired code".to_string());
    }

    Ok(())
}

/// Validate a temperature reading
pub fn validate_temperature(temperature: f64) -> Result<(), String> {
    if !temperature.is_finite() {
        return Err("Temperature must be a finite number".to_string());
    }

    Ok(())
}
