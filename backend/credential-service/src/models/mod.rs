pub mod account;
pub mod wire;

pub use account::Account;
pub use wire::{
    CompletePasswordResetRequest, ErrorResponse, LoginRequest, PasswordResetRequest,
    RefreshRequest, TokenPair,
};
