//! Input validation for API requests.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for validating email addresses
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email.trim()) {
        return Err("Please enter a valid email".to_string());
    }

    Ok(())
}

/// Validate a password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < 6 {
        return Err("Password must be at least 6 characters long".to_string());
    }

    if password.len() > 512 {
        return Err("Password is too long (max 512 characters)".to_string());
    }

    Ok(())
}

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Name is required".to_string());
    }

    if name.len() > 100 {
        return Err("Name is too long (max 100 characters)".to_string());
    }

    Ok(())
}

/// Validate an expense amount
pub fn validate_amount(amount: f64) -> Result<(), String> {
    if !amount.is_finite() {
        return Err("Amount must be a number".to_string());
    }

    if amount < 0.0 {
        return Err("Amount cannot be negative".to_string());
    }

    Ok(())
}

/// Validate an expense category
pub fn validate_category(category: &str) -> Result<(), String> {
    if category.trim().is_empty() {
        return Err("Category is required".to_string());
    }

    if category.len() > 100 {
        return Err("Category is too long (max 100 characters)".to_string());
    }

    Ok(())
}

/// Validate an expense description
pub fn validate_description(description: &str) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("Description is required".to_string());
    }

    if description.len() > 500 {
        return Err("Description is too long (max 500 characters)".to_string());
    }

    Ok(())
}

/// Validate an expense date (optional field, RFC 3339 when present)
pub fn validate_date(date: &Option<String>) -> Result<(), String> {
    if let Some(d) = date {
        if chrono::DateTime::parse_from_rfc3339(d).is_err() {
            return Err("Date must be a valid RFC 3339 timestamp".to_string());
        }
    }

    Ok(())
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}
