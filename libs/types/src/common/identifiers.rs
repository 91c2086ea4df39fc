//! # Typed Identifiers
//!
//! Zero-cost wrappers around `u64` so accounts, strategies, assets, venues and pools
//! can never be confused for one another at a call site.
//!
//! ```rust
//! use types::{AccountId, StrategyId};
//!
//! fn allocate(account: AccountId, strategy: StrategyId) { /* ... */ }
//!
//! allocate(AccountId::new(7), StrategyId::new(1)); // ✅ Correct
//! // allocate(StrategyId::new(1), AccountId::new(7)); // ❌ Compile error!
//! ```

/// Macro for generating zero-cost typed ID wrappers
///
/// Creates a new type that wraps `u64` with complete type safety while maintaining
/// identical runtime performance and memory layout.
#[macro_export]
macro_rules! define_typed_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Default
        )]
        #[repr(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new typed ID
            #[inline(always)]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Create a new typed ID, rejecting the null (zero) value
            #[inline]
            pub fn new_validated(id: u64) -> Result<Self, $crate::common::errors::ValidationError> {
                if id == 0 {
                    return Err($crate::common::errors::ValidationError::NullId);
                }
                Ok(Self(id))
            }

            /// Extract the inner u64 value
            #[inline(always)]
            pub const fn inner(&self) -> u64 {
                self.0
            }

            /// Check if this is a null/zero ID
            #[inline(always)]
            pub fn is_null(&self) -> bool {
                self.0 == 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<u64> for $name {
            #[inline(always)]
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            #[inline(always)]
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        // Serializes as raw u64 so config files and snapshots stay readable
        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                <u64 as serde::Deserialize>::deserialize(deserializer).map(Self)
            }
        }
    };
}

define_typed_id!(
    /// Depositor account owning exactly one vault
    AccountId
);

define_typed_id!(
    /// Yield-bearing strategy a vault can allocate to
    StrategyId
);

define_typed_id!(
    /// Asset (token) held by strategies or traded on venues
    AssetId
);

define_typed_id!(
    /// Liquidity venue (AMM family or orderbook exchange)
    VenueId
);

define_typed_id!(
    /// Single pool or market inside a venue
    PoolId
);
