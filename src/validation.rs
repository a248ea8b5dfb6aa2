/// Intake validation for lead contact fields
///
/// Decides whether an identifier is worth forwarding to the ad platforms at
/// all. Canonicalization-for-hashing is the identity module's job; this
/// module only filters out garbage so we never hash and ship a placeholder
/// address or an undialable number.
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Fake/placeholder patterns (repeated digits like 9999, 1111)
/// - Minimum length requirements
/// - Valid domain structure
pub fn is_valid_email(email: &str) -> bool {
    // Basic checks
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    // Detect fake patterns (repeated digits)
    let fake_patterns = [
        "999999",    // Common fake: 9999999999@gmail.com
        "111111",    // Common fake: 1111111111@
        "000000",    // Common fake: 000000@
        "123456789", // Sequential fake
    ];

    for pattern in &fake_patterns {
        if email.contains(pattern) {
            tracing::warn!(
                "❌ Invalid email detected (fake pattern '{}'): {}",
                pattern,
                email
            );
            return false;
        }
    }

    // RFC 5322 simplified email regex
    // Matches: local@domain.tld
    let email_regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    if !email_regex.is_match(email) {
        tracing::warn!("❌ Invalid email format: {}", email);
        return false;
    }

    true
}

/// Validate a phone number against the operator's market region
///
/// Uses the phonenumber library (port of Google's libphonenumber) to:
/// - Parse the number with the configured default region
/// - Check it is a dialable number for that region
/// - Return the E.164 form for logging/debugging
///
/// Returns: (is_valid, e164_or_error_msg)
pub fn validate_phone(raw: &str, region: CountryId) -> (bool, String) {
    // Skip empty or very short strings
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(region), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("✓ Valid phone: {} → {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::warn!("❌ Invalid phone number for region {:?}: {}", region, raw);
                (false, "Invalid phone number".to_string())
            }
        }
        Err(e) => {
            tracing::warn!("❌ Failed to parse phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("resident@example.com"));
        assert!(is_valid_email("family.member+tours@example.co.uk"));
        assert!(is_valid_email("a@b.c"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email("not_an_email"));
        assert!(!is_valid_email("missing@domain"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_placeholder_emails_rejected() {
        assert!(!is_valid_email("9999999999@gmail.com"));
        assert!(!is_valid_email("test123456789@example.com"));
        assert!(!is_valid_email("000000@example.com"));
    }

    #[test]
    fn test_valid_us_phones() {
        let (valid, e164) = validate_phone("(303) 555-0100", CountryId::US);
        assert!(valid);
        assert_eq!(e164, "+13035550100");

        let (valid, e164) = validate_phone("303-555-0100", CountryId::US);
        assert!(valid);
        assert_eq!(e164, "+13035550100");

        let (valid, e164) = validate_phone("+1 303 555 0100", CountryId::US);
        assert!(valid);
        assert_eq!(e164, "+13035550100");
    }

    #[test]
    fn test_invalid_phones() {
        let (valid, _) = validate_phone("1234", CountryId::US);
        assert!(!valid);

        let (valid, _) = validate_phone("", CountryId::US);
        assert!(!valid);

        let (valid, _) = validate_phone("   ", CountryId::US);
        assert!(!valid);
    }
}
