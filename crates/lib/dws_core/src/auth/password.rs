//! Password hashing via bcrypt, plus credential format validation.

use std::sync::LazyLock;

use regex::Regex;

use super::AuthError;

/// Minimum bcrypt cost factor accepted.
pub const MIN_BCRYPT_COST: u32 = 12;

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email regex should compile")
});

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,50}$").expect("username regex should compile"));

/// bcrypt hasher with a fixed work factor.
#[derive(Debug, Clone, Copy)]
pub struct Hasher {
    cost: u32,
}

impl Hasher {
    /// Costs below [`MIN_BCRYPT_COST`] are raised to it.
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.max(MIN_BCRYPT_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    /// Verify a password against a stored hash.
    pub fn verify(&self, hash: &str, password: &str) -> Result<bool, AuthError> {
        bcrypt::verify(password, hash)
            .map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(MIN_BCRYPT_COST)
    }
}

/// Trim and lower-case an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AuthError::InvalidEmail("not a valid email address".into()))
    }
}

pub fn validate_username(username: &str) -> Result<(), AuthError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(AuthError::InvalidUsername(
            "must be 3-50 characters of letters, digits or underscore".into(),
        ))
    }
}

/// Length of at least [`MIN_PASSWORD_LEN`] with upper, lower, digit and
/// punctuation/symbol characters.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword(format!(
            "must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let mut has_upper = false;
    let mut has_lower = false;
    let mut has_digit = false;
    let mut has_special = false;
    for c in password.chars() {
        if c.is_uppercase() {
            has_upper = true;
        } else if c.is_lowercase() {
            has_lower = true;
        } else if c.is_numeric() {
            has_digit = true;
        } else if !c.is_whitespace() && !c.is_alphanumeric() {
            has_special = true;
        }
    }

    let missing: Vec<&str> = [
        (has_upper, "an uppercase letter"),
        (has_lower, "a lowercase letter"),
        (has_digit, "a number"),
        (has_special, "a special character"),
    ]
    .into_iter()
    .filter(|(present, _)| !present)
    .map(|(_, what)| what)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::WeakPassword(format!(
            "must contain {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = Hasher::default();
        let hash = hasher.hash("P@ssw0rd1").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(hash.contains("$12$"));
        assert!(hasher.verify(&hash, "P@ssw0rd1").unwrap());
        assert!(!hasher.verify(&hash, "p@ssw0rd1").unwrap());
    }

    #[test]
    fn low_cost_is_raised() {
        assert_eq!(Hasher::new(4).cost(), MIN_BCRYPT_COST);
        assert_eq!(Hasher::new(13).cost(), 13);
    }

    #[test]
    fn twelve_chars_missing_a_class_is_weak() {
        for pw in ["password123!", "PASSWORD123!", "Password!!!!", "Password1234"] {
            assert_eq!(pw.len(), 12);
            assert!(
                matches!(validate_password(pw), Err(AuthError::WeakPassword(_))),
                "{pw} accepted"
            );
        }
        assert!(validate_password("Password123!").is_ok());
    }

    #[test]
    fn short_password_is_weak() {
        assert!(matches!(
            validate_password("P@ss1"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("NewP@ss1!").is_ok());
    }

    #[test]
    fn email_format() {
        assert!(validate_email("alice@x.io").is_ok());
        assert!(validate_email("first.last+tag@hospital.org.za").is_ok());
        assert!(validate_email("alice@x").is_err());
        assert!(validate_email("not an email").is_err());
    }

    #[test]
    fn username_format() {
        assert!(validate_username("dr_smith").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  Carol@X.IO "), "carol@x.io");
    }
}
