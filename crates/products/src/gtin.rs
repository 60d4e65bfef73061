//! GS1 Global Trade Item Number.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use lotledger_core::DomainError;

/// A validated GTIN-8, GTIN-12, GTIN-13 or GTIN-14.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gtin(String);

impl Gtin {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let digits = raw.trim();

        if !matches!(digits.len(), 8 | 12 | 13 | 14) {
            return Err(DomainError::validation(format!(
                "GTIN must have 8, 12, 13 or 14 digits, got {}",
                digits.len()
            )));
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation("GTIN must contain digits only"));
        }

        let expected = check_digit(&digits[..digits.len() - 1]);
        let actual = digits.as_bytes()[digits.len() - 1] - b'0';
        if expected != actual {
            return Err(DomainError::validation(format!(
                "GTIN check digit mismatch: expected {expected}, got {actual}"
            )));
        }

        Ok(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Left-pad to the 14-digit form used on case labels.
    pub fn to_gtin14(&self) -> String {
        format!("{:0>14}", self.0)
    }
}

/// GS1 mod-10: weights alternate 3,1,3,... starting from the rightmost body digit.
fn check_digit(body: &str) -> u8 {
    let sum: u32 = body
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 0 { d * 3 } else { d }
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

impl FromStr for Gtin {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Gtin {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Gtin> for String {
    fn from(value: Gtin) -> Self {
        value.0
    }
}

impl core::fmt::Display for Gtin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_known_good_codes() {
        // EAN-13, UPC-A, EAN-8, GTIN-14
        for code in ["4006381333931", "036000291452", "96385074", "10012345678902"] {
            assert!(Gtin::parse(code).is_ok(), "{code} should be valid");
        }
    }

    #[test]
    fn rejects_bad_check_digit() {
        let err = Gtin::parse("4006381333932").unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("check digit")));
    }

    #[test]
    fn rejects_wrong_length_and_non_digits() {
        assert!(Gtin::parse("12345").is_err());
        assert!(Gtin::parse("40063813339A1").is_err());
    }

    #[test]
    fn pads_to_fourteen_digits() {
        let gtin = Gtin::parse("036000291452").unwrap();
        assert_eq!(gtin.to_gtin14(), "00036000291452");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: appending the computed check digit always yields a valid GTIN-13.
        #[test]
        fn computed_check_digit_validates(body in "[0-9]{12}") {
            let code = format!("{body}{}", check_digit(&body));
            prop_assert!(Gtin::parse(&code).is_ok());
        }
    }
}
