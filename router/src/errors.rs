// Error types for the quote engine and the KV store
// Every rejection a caller can observe is one of these variants; they are
// categorical, and all of them are recoverable from the engine's perspective.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("invalid amount")]
    InvalidAmount,
    #[error("amount too large")]
    AmountTooLarge,
    #[error("invalid asset format")]
    InvalidAsset,
    #[error("input and output assets cannot be the same")]
    SameAssets,
    #[error("invalid issuer address")]
    InvalidAddress,
    #[error("no route found")]
    NoRoute,
    #[error("insufficient liquidity")]
    InsufficientLiquidity,
    #[error("circuit breaker open")]
    CircuitBreakerOpen,
}

impl RouterError {
    /// Stable machine-readable code used in audit logs and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::InvalidAmount => "invalid_amount",
            RouterError::AmountTooLarge => "amount_too_large",
            RouterError::InvalidAsset => "invalid_asset",
            RouterError::SameAssets => "same_assets",
            RouterError::InvalidAddress => "invalid_address",
            RouterError::NoRoute => "no_route",
            RouterError::InsufficientLiquidity => "insufficient_liquidity",
            RouterError::CircuitBreakerOpen => "circuit_breaker_open",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("key exceeds maximum length")]
    KeyTooLong,
    #[error("key cannot be empty")]
    KeyEmpty,
    #[error("namespace cannot be empty")]
    NamespaceEmpty,
    #[error("value exceeds maximum size")]
    ValueTooLarge,
    #[error("memory limit exceeded")]
    MemoryLimit,
    #[error("key not found")]
    KeyNotFound,
    #[error("namespace quota exceeded")]
    NamespaceQuota,
    #[error("invalid counter value")]
    InvalidCounter,
}
