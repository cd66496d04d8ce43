//! LTRQ Core - Shared types library.
//!
//! This crate provides the domain types shared by the storefront library,
//! its HTTP binary and the integration tests:
//! - catalog records ([`Product`]) exactly as the remote product store sends them
//! - type-safe identifiers, prices and email addresses
//! - chat roles used on the completion wire format
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices, emails, statuses and products

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
