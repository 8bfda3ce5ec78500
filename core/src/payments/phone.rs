// storefront/src/payments/phone.rs

use crate::error::{ShopError, ShopResult};

pub const COUNTRY_CODE: &str = "254";
const SUBSCRIBER_DIGITS: usize = 9;

/// Normalizes a Kenyan mobile number to `254XXXXXXXXX`.
///
/// Accepts the national form `0XXXXXXXXX` and the bare international form
/// `254XXXXXXXXX`. Anything else, including a leading `+`, is rejected with
/// `InvalidPhoneFormat`.
pub fn normalize_phone(raw: &str) -> ShopResult<String> {
  let number = raw.trim();
  if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
    return Err(ShopError::InvalidPhoneFormat(raw.to_string()));
  }

  if let Some(subscriber) = number.strip_prefix('0') {
    if subscriber.len() == SUBSCRIBER_DIGITS {
      return Ok(format!("{}{}", COUNTRY_CODE, subscriber));
    }
  }
  if let Some(subscriber) = number.strip_prefix(COUNTRY_CODE) {
    if subscriber.len() == SUBSCRIBER_DIGITS {
      return Ok(number.to_string());
    }
  }
  Err(ShopError::InvalidPhoneFormat(raw.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn national_and_international_forms_normalize_alike() {
    assert_eq!(normalize_phone("0712345678").unwrap(), "254712345678");
    assert_eq!(normalize_phone("254712345678").unwrap(), "254712345678");
    assert_eq!(normalize_phone(" 0112345678 ").unwrap(), "254112345678");
  }

  #[test]
  fn other_shapes_are_rejected() {
    for bad in ["+254712345678", "1234567", "", "07123456789", "25471234567", "0712-345678", "255712345678"] {
      assert!(
        matches!(normalize_phone(bad), Err(ShopError::InvalidPhoneFormat(_))),
        "{:?} should be rejected",
        bad
      );
    }
  }
}
