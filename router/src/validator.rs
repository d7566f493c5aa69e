// Quote request validation
// Structural and semantic checks applied before any pathfinding happens.
// Checks run in a fixed order and the first violation wins; the validator
// either admits a request or rejects it, never partially.

use crate::errors::RouterError;
use crate::types::{Asset, QuoteRequest};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

/// Largest admissible input amount.
pub const AMOUNT_MAX: u64 = 1_000_000_000_000_000_000;

static ISSUER_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^r[1-9A-HJ-NP-Za-km-z]{24,34}$").expect("issuer address pattern"));

static CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{3,40}$").expect("currency code pattern"));

#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, req: &QuoteRequest) -> Result<(), RouterError> {
        if req.amount <= Decimal::ZERO {
            return Err(RouterError::InvalidAmount);
        }

        if req.amount > Decimal::from(AMOUNT_MAX) {
            return Err(RouterError::AmountTooLarge);
        }

        self.validate_asset(&req.input)?;
        self.validate_asset(&req.output)?;

        if req.input.canonical() == req.output.canonical() {
            return Err(RouterError::SameAssets);
        }

        Ok(())
    }

    pub fn validate_asset(&self, asset: &Asset) -> Result<(), RouterError> {
        if asset.currency.is_empty() {
            return Err(RouterError::InvalidAsset);
        }

        // The native asset never carries an issuer.
        if asset.is_native() {
            return Ok(());
        }
        if asset.currency == crate::types::NATIVE_CURRENCY {
            return Err(RouterError::InvalidAsset);
        }

        if !CURRENCY_CODE.is_match(&asset.currency) {
            return Err(RouterError::InvalidAsset);
        }

        if asset.issuer.is_empty() {
            return Err(RouterError::InvalidAsset);
        }

        if !self.is_valid_issuer_address(&asset.issuer) {
            return Err(RouterError::InvalidAddress);
        }

        Ok(())
    }

    pub fn is_valid_issuer_address(&self, address: &str) -> bool {
        let address = address.trim();
        !address.is_empty() && ISSUER_ADDRESS.is_match(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ISSUER: &str = "rvYAfWj5gh67oV6fW32ZzP3Aw4Eubs59B";

    fn request(amount: Decimal) -> QuoteRequest {
        QuoteRequest {
            input: Asset::native(),
            output: Asset::issued("USD", ISSUER),
            amount,
        }
    }

    #[test]
    fn accepts_valid_request() {
        let v = Validator::new();
        assert_eq!(v.validate(&request(dec!(100))), Ok(()));
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let v = Validator::new();
        assert_eq!(
            v.validate(&request(Decimal::ZERO)),
            Err(RouterError::InvalidAmount)
        );
        assert_eq!(
            v.validate(&request(dec!(-5))),
            Err(RouterError::InvalidAmount)
        );
    }

    #[test]
    fn rejects_oversized_amount() {
        let v = Validator::new();
        let too_large = Decimal::from(AMOUNT_MAX) + Decimal::ONE;
        assert_eq!(
            v.validate(&request(too_large)),
            Err(RouterError::AmountTooLarge)
        );
        assert_eq!(v.validate(&request(Decimal::from(AMOUNT_MAX))), Ok(()));
    }

    #[test]
    fn rejects_same_assets() {
        let v = Validator::new();
        let req = QuoteRequest {
            input: Asset::issued("USD", ISSUER),
            output: Asset::issued("USD", ISSUER),
            amount: dec!(1),
        };
        assert_eq!(v.validate(&req), Err(RouterError::SameAssets));
    }

    #[test]
    fn rejects_empty_currency() {
        let v = Validator::new();
        assert_eq!(
            v.validate_asset(&Asset::issued("", ISSUER)),
            Err(RouterError::InvalidAsset)
        );
    }

    #[test]
    fn rejects_native_with_issuer() {
        let v = Validator::new();
        assert_eq!(
            v.validate_asset(&Asset::issued("XRP", ISSUER)),
            Err(RouterError::InvalidAsset)
        );
    }

    #[test]
    fn rejects_bad_currency_code() {
        let v = Validator::new();
        for currency in ["us", "usd", "U$D", "AB"] {
            assert_eq!(
                v.validate_asset(&Asset::issued(currency, ISSUER)),
                Err(RouterError::InvalidAsset),
                "currency {currency:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_missing_issuer() {
        let v = Validator::new();
        assert_eq!(
            v.validate_asset(&Asset::issued("USD", "")),
            Err(RouterError::InvalidAsset)
        );
    }

    #[test]
    fn rejects_malformed_issuer_address() {
        let v = Validator::new();
        // Wrong prefix, too short, and base58 exclusions (0, O, I, l).
        for issuer in [
            "xvYAfWj5gh67oV6fW32ZzP3Aw4Eubs59B",
            "rShort",
            "r0YAfWj5gh67oV6fW32ZzP3Aw4Eubs59B",
            "rOYAfWj5gh67oV6fW32ZzP3Aw4EubslIB",
        ] {
            assert_eq!(
                v.validate_asset(&Asset::issued("USD", issuer)),
                Err(RouterError::InvalidAddress),
                "issuer {issuer:?} should be rejected"
            );
        }
    }

    #[test]
    fn issuer_is_trimmed_before_matching() {
        let v = Validator::new();
        assert!(v.is_valid_issuer_address(&format!("  {ISSUER}  ")));
        assert!(!v.is_valid_issuer_address("   "));
    }

    #[test]
    fn validation_order_amount_before_assets() {
        let v = Validator::new();
        let req = QuoteRequest {
            input: Asset::issued("", ""),
            output: Asset::issued("", ""),
            amount: Decimal::ZERO,
        };
        // Both the amount and the assets are invalid; the amount check fires first.
        assert_eq!(v.validate(&req), Err(RouterError::InvalidAmount));
    }
}
