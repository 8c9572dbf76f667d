//! Right Water Core - shared types and the authorization model.
//!
//! This crate is used by every Right Water component:
//! - `storefront` - HTTP service for customers and catalog administrators
//! - `cli` - Migrations and the out-of-band admin grant/revoke process
//!
//! # Architecture
//!
//! The core crate contains only types, traits and pure decision logic - no
//! I/O, no database access, no HTTP. Both the client-side gate (route guard,
//! session state) and the store-side rule engine (access policy) live here so
//! that the two layers are built from the same vocabulary.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, prices, statuses, identities
//! - [`records`] - Document shapes stored in each collection
//! - [`authz`] - Collections, access policy, role, session state, route guard

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod authz;
pub mod records;
pub mod types;

pub use types::*;
