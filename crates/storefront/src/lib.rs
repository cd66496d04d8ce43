//! LTRQ Storefront library.
//!
//! The synced shopper cart, the shopping assistant, catalog access and
//! identity, plus the axum router that serves them. The binary in
//! `main.rs` only wires configuration, tracing and Sentry around
//! [`routes::app`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod assistant;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
