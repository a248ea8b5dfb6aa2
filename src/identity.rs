use hex;
use sha2::{Digest, Sha256};

/// Canonicalizes and hashes lead identifiers for ad-platform matching
///
/// Both advertising platforms match server-reported conversions against their
/// own copy of the same identifier by comparing SHA-256 digests. Matching only
/// works if both sides normalize identically before hashing, so the recipe
/// here is fixed:
///
/// 1. Trim surrounding whitespace and lowercase
/// 2. For phones: strip everything but digits, prepend the default country
///    calling code when absent, prefix `+`
/// 3. SHA-256, hex encoded
///
/// Empty or degenerate input yields an empty string, never a digest of an
/// empty buffer, so callers can tell "no identifier supplied" apart from a
/// real hash.

/// Hashes a single identifier (email or already-normalized phone).
///
/// # Example
///
/// ```rust
/// use conversions_api::identity::hash_identifier;
///
/// let a = hash_identifier(" A@Example.com ");
/// let b = hash_identifier("a@example.com");
/// assert_eq!(a, b);
/// assert_eq!(hash_identifier("   "), "");
/// ```
pub fn hash_identifier(value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        return String::new();
    }

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalizes a raw phone number into a single canonical dial string.
///
/// Strips all non-digit characters, prepends `default_country_code` when the
/// digits do not already start with it, and prefixes the international `+`
/// marker. `"(303) 555-0100"`, `"303-555-0100"` and `"3035550100"` all
/// normalize to the same string. Idempotent: feeding the output back in
/// returns it unchanged.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }

    if digits.starts_with(default_country_code) {
        format!("+{}", digits)
    } else {
        format!("+{}{}", default_country_code, digits)
    }
}

/// Normalizes then hashes a phone number.
///
/// This is the only phone representation that may cross the network boundary
/// to an advertising platform.
pub fn hash_phone(raw: &str, default_country_code: &str) -> String {
    hash_identifier(&normalize_phone(raw, default_country_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash_identifier("jane@example.com");
        let b = hash_identifier("jane@example.com");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_normalizes_case_and_whitespace() {
        assert_eq!(
            hash_identifier("  JANE@Example.COM "),
            hash_identifier("jane@example.com")
        );
    }

    #[test]
    fn test_distinct_inputs_hash_differently() {
        assert_ne!(
            hash_identifier("jane@example.com"),
            hash_identifier("john@example.com")
        );
    }

    #[test]
    fn test_empty_input_yields_empty_string() {
        assert_eq!(hash_identifier(""), "");
        assert_eq!(hash_identifier("   "), "");
        assert_eq!(hash_identifier("\t\n"), "");
    }

    #[test]
    fn test_normalize_phone_strips_formatting() {
        assert_eq!(normalize_phone("(303) 555-0100", "1"), "+13035550100");
        assert_eq!(normalize_phone("303-555-0100", "1"), "+13035550100");
        assert_eq!(normalize_phone("3035550100", "1"), "+13035550100");
    }

    #[test]
    fn test_normalize_phone_keeps_existing_country_code() {
        assert_eq!(normalize_phone("+1 303 555 0100", "1"), "+13035550100");
        assert_eq!(normalize_phone("13035550100", "1"), "+13035550100");
    }

    #[test]
    fn test_normalize_phone_is_idempotent() {
        let once = normalize_phone("(303) 555-0100", "1");
        let twice = normalize_phone(&once, "1");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_phone_empty_input() {
        assert_eq!(normalize_phone("", "1"), "");
        assert_eq!(normalize_phone("---", "1"), "");
    }

    #[test]
    fn test_hash_phone_collapses_formats() {
        let formats = ["(303) 555-0100", "303-555-0100", "3035550100"];
        let hashes: Vec<String> = formats.iter().map(|f| hash_phone(f, "1")).collect();
        assert_eq!(hashes[0], hashes[1]);
        assert_eq!(hashes[1], hashes[2]);
        assert!(!hashes[0].is_empty());
    }

    #[test]
    fn test_hash_phone_empty_input_yields_empty_string() {
        assert_eq!(hash_phone("", "1"), "");
        assert_eq!(hash_phone("()- ", "1"), "");
    }
}
