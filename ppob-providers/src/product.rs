//! Bill products and their customer id formats.

use std::ops::RangeInclusive;
use std::str::FromStr;

use ppob_types::ProviderError;

/// A bill product served by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BillProduct {
    /// Regional water utility
    Pdam,
    /// National health insurance
    Bpjs,
}

impl BillProduct {
    pub fn code(&self) -> &'static str {
        match self {
            BillProduct::Pdam => "pdam",
            BillProduct::Bpjs => "bpjs",
        }
    }

    /// Accepted customer id lengths; ids are all digits.
    pub fn customer_id_digits(&self) -> RangeInclusive<usize> {
        match self {
            BillProduct::Pdam => 10..=12,
            BillProduct::Bpjs => 13..=13,
        }
    }

    pub fn validate_customer_id(&self, customer_id: &str) -> bool {
        self.customer_id_digits().contains(&customer_id.len())
            && customer_id.bytes().all(|b| b.is_ascii_digit())
    }

    /// Service area encoded in the customer id, for products that have one.
    pub fn area_code<'a>(&self, customer_id: &'a str) -> Option<&'a str> {
        match self {
            BillProduct::Pdam => customer_id.get(..4),
            BillProduct::Bpjs => None,
        }
    }

    /// Default API root of the product's provider.
    pub fn base_url(&self, sandbox: bool) -> String {
        let host = if sandbox { "sandbox" } else { "api" };
        format!("https://{host}.{}.com/v1", self.code())
    }
}

impl std::fmt::Display for BillProduct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BillProduct {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdam" => Ok(BillProduct::Pdam),
            "bpjs" => Ok(BillProduct::Bpjs),
            other => Err(ProviderError::Rejected(format!(
                "unsupported bill product: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdam_customer_ids() {
        let pdam = BillProduct::Pdam;
        assert!(pdam.validate_customer_id("0123456789"));
        assert!(pdam.validate_customer_id("012345678901"));
        assert!(!pdam.validate_customer_id("012345678"));
        assert!(!pdam.validate_customer_id("0123456789012"));
        assert!(!pdam.validate_customer_id("01234x6789"));
        assert_eq!(pdam.area_code("0123456789"), Some("0123"));
    }

    #[test]
    fn test_bpjs_customer_ids() {
        let bpjs = BillProduct::Bpjs;
        assert!(bpjs.validate_customer_id("0001234567890"));
        assert!(!bpjs.validate_customer_id("0123456789"));
        assert_eq!(bpjs.area_code("0001234567890"), None);
    }

    #[test]
    fn test_base_url_and_parse() {
        assert_eq!(
            BillProduct::Pdam.base_url(true),
            "https://sandbox.pdam.com/v1"
        );
        assert_eq!(BillProduct::Bpjs.base_url(false), "https://api.bpjs.com/v1");
        assert_eq!("BPJS".parse::<BillProduct>().unwrap(), BillProduct::Bpjs);
        assert!("telkom".parse::<BillProduct>().is_err());
    }
}
