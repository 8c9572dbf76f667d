//! Business logic services for the storefront.
//!
//! # Services
//!
//! - [`identity`] - Email/password identity provider and per-client auth
//! - [`role`] - Role resolution from Authorization Records
//! - [`session`] - Session State Store and its driver
//! - [`clients`] - Per-browser client contexts
//! - [`account`] - Sign-up profile and display name maintenance
//! - [`catalog`] - Product catalog management
//! - [`orders`] - Order placement and status updates
//! - [`statistics`] - Admin statistics summary
//! - [`blob`] - Image storage with upload progress
//! - [`mail`] - Password reset email

pub mod account;
pub mod blob;
pub mod catalog;
pub mod clients;
pub mod identity;
pub mod mail;
pub mod orders;
pub mod role;
pub mod session;
pub mod statistics;
