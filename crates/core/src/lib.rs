//! Cart Sync Core - Shared types library.
//!
//! This crate provides the types shared by every cart-sync component:
//! - `cart-sync` - Cookie-backed reference store and catalog reconciler
//! - `cart-sync-cli` - Command-line front end over a file-backed cookie
//!
//! # Architecture
//!
//! The core crate contains only types and pure list operations - no I/O, no
//! HTTP clients, no async runtime. This keeps it lightweight and allows it to
//! be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Product IDs, prices, product details, reference lists, and cart state

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
