//! Phone number normalization.

use std::sync::LazyLock;

use regex::Regex;

use super::NotifyError;

static E164: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").ok());

/// Canadian area codes; `+1` numbers outside this list are treated as US.
const CANADIAN_AREA_CODES: &[u16] = &[
    204, 226, 236, 249, 250, 289, 306, 343, 365, 403, 416, 418, 431, 437, 438, 450, 506, 514, 519,
    579, 581, 587, 604, 613, 639, 647, 705, 709, 778, 780, 782, 807, 819, 825, 867, 873, 902, 905,
];

/// True if `phone` is E.164 (`+` then 2 to 15 digits, no leading zero).
pub fn is_e164(phone: &str) -> bool {
    E164.as_ref().is_some_and(|re| re.is_match(phone))
}

/// Normalize free-form input to E.164.
///
/// Separators are stripped. A leading `+` keeps the digits as written;
/// bare ten-digit numbers get the `+1` country code; anything else is
/// prefixed with `+`. Already-normalized input is returned unchanged.
pub fn normalize_phone_number(raw: &str) -> Result<String, NotifyError> {
    let trimmed = raw.trim();
    if is_e164(trimmed) {
        return Ok(trimmed.to_owned());
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(NotifyError::InvalidPhone(raw.to_owned()));
    }
    let candidate = if !trimmed.starts_with('+') && digits.len() == 10 {
        format!("+1{digits}")
    } else {
        format!("+{digits}")
    };
    if is_e164(&candidate) {
        Ok(candidate)
    } else {
        Err(NotifyError::InvalidPhone(raw.to_owned()))
    }
}

/// True for `+1` numbers that are not in a Canadian area code.
pub fn is_us_phone_number(e164: &str) -> bool {
    let Some(rest) = e164.strip_prefix("+1") else {
        return false;
    };
    match rest.get(..3).and_then(|code| code.parse::<u16>().ok()) {
        Some(area) => !CANADIAN_AREA_CODES.contains(&area),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn formats_common_inputs() {
        assert_eq!(normalize_phone_number("(555) 123-4567").unwrap(), "+15551234567");
        assert_eq!(normalize_phone_number("+44 7700 900123").unwrap(), "+447700900123");
        assert_eq!(normalize_phone_number("447700900123").unwrap(), "+447700900123");
        assert_eq!(normalize_phone_number(" +15551234567 ").unwrap(), "+15551234567");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["555.123.4567", "+1 (416) 555-0100", "33 1 23 45 67 89"] {
            let once = normalize_phone_number(raw).unwrap();
            assert!(is_e164(&once), "{once}");
            assert_eq!(normalize_phone_number(&once).unwrap(), once);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(normalize_phone_number("").is_err());
        assert!(normalize_phone_number("call me").is_err());
        assert!(normalize_phone_number("0123").is_err());
        assert!(normalize_phone_number("+1234567890123456").is_err());
    }

    #[test]
    fn us_detection_excludes_canada() {
        assert!(is_us_phone_number("+15551234567"));
        assert!(!is_us_phone_number("+14165550100"));
        assert!(!is_us_phone_number("+447700900123"));
    }
}
