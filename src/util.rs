//! Conversion and sanitization helpers shared by the resource clients.

use chrono::NaiveDate;

use crate::error::{EngineError, EngineResult};

/// One day in seconds, minus the final second.
pub const SECONDS_IN_A_DAY_MINUS_ONE: i64 = 86_399;

/// Convert rupees to paisa (minor units). RazorpayX wire amounts are paisa.
pub fn rupees_to_paisa(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Convert paisa back to rupees.
pub fn paisa_to_rupees(amount: i64) -> f64 {
    amount as f64 / 100.0
}

/// Unix timestamp for 00:00:00 of the given date.
pub fn start_of_day_epoch(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
        .timestamp()
}

/// Unix timestamp for 23:59:59 of the given date.
pub fn end_of_day_epoch(date: NaiveDate) -> i64 {
    start_of_day_epoch(date) + SECONDS_IN_A_DAY_MINUS_ONE
}

/// Validate a payout narration/description.
///
/// RazorpayX accepts at most 30 characters, letters, digits and spaces only.
pub fn validate_description(description: &str) -> EngineResult<()> {
    let valid = !description.is_empty()
        && description.len() <= 30
        && description
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ');

    if valid {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "Payout description '{description}' is invalid: maximum 30 characters, \
             letters, digits and spaces only"
        )))
    }
}

/// Derive the `X-Payout-Idempotency` header value from a source docname.
///
/// The Provider only accepts alphanumerics and hyphens, so every other
/// character collapses to a hyphen. The mapping is deterministic: the same
/// docname always yields the same key.
pub fn idempotency_key(source_docname: &str) -> String {
    source_docname
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Sanitize a party name for the Provider's contact API.
///
/// Keeps letters, digits, spaces and `'._/()-`, trims leading/trailing
/// non-alphanumerics, truncates to 50 characters and left-pads with `.` to
/// the 3-character minimum the Provider enforces.
pub fn sanitize_contact_name(name: &str) -> String {
    const ALLOWED_SPECIAL: &[char] = &['\'', '.', '_', '/', '(', ')', '-', ' '];

    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || ALLOWED_SPECIAL.contains(c))
        .collect();

    let trimmed = kept
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string();

    let mut out: String = trimmed.chars().take(50).collect();

    while out.len() < 3 {
        out.insert(0, '.');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rupee_paisa_round_trip() {
        for paisa in [0i64, 1, 99, 100, 50_000, 123_456_789] {
            assert_eq!(rupees_to_paisa(paisa_to_rupees(paisa)), paisa);
        }
        assert_eq!(rupees_to_paisa(500.0), 50_000);
        assert_eq!(rupees_to_paisa(0.1 + 0.2), 30);
    }

    #[test]
    fn day_window_spans_86399_seconds() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 30).unwrap();
        assert_eq!(
            end_of_day_epoch(date) - start_of_day_epoch(date),
            SECONDS_IN_A_DAY_MINUS_ONE
        );
    }

    #[test]
    fn description_rules() {
        assert!(validate_description("Payout for vendor bill 42").is_ok());
        assert!(validate_description("a").is_ok());
        assert!(validate_description(&"x".repeat(30)).is_ok());

        assert!(validate_description("").is_err());
        assert!(validate_description(&"x".repeat(31)).is_err());
        assert!(validate_description("hyphen-inside").is_err());
        assert!(validate_description("emoji 🙂").is_err());
    }

    #[test]
    fn idempotency_key_is_deterministic() {
        assert_eq!(idempotency_key("PE 0001"), "PE-0001");
        assert_eq!(idempotency_key("PE-0001"), "PE-0001");
        assert_eq!(idempotency_key("ACC/PAY#7"), "ACC-PAY-7");
        assert_eq!(idempotency_key("PE 0001"), idempotency_key("PE 0001"));
    }

    #[test]
    fn contact_name_sanitization() {
        let out = sanitize_contact_name("  @@John//Doe!!  ");
        assert!(out
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "'._/()- ".contains(c)));
        assert!(out.len() <= 50);
        assert!(out.len() >= 3);
        assert_eq!(out, "John//Doe");

        assert_eq!(sanitize_contact_name("Jo"), ".Jo");
        assert_eq!(sanitize_contact_name("!!"), "...");
        assert_eq!(sanitize_contact_name(&"a".repeat(80)).len(), 50);
    }
}
