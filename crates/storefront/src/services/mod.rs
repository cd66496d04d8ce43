//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Shopper accounts with the identity provider, ID token refresh
//!   and sign-in form validation

pub mod auth;
