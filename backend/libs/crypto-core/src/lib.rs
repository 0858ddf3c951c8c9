//! Shared token primitives for the credential service.
//!
//! - `jwt`: signed, kind-tagged credential tokens (`TokenCodec`)
//! - `clock`: injectable time source used for minting and expiry checks
pub mod clock;
pub mod jwt;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use jwt::{
    AccessClaims, PasswordResetClaims, RefreshClaims, TokenClaims, TokenCodec, TokenError,
    TokenKind,
};
