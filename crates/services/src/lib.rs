pub mod auth;
pub mod common;

pub use auth::{
    CallbackOutcome, OAuthCallbackService, OAuthCallbackServiceTrait, OAuthError, Platform,
};
