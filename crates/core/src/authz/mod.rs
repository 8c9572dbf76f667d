//! Authorization model.
//!
//! Two layers share one source of truth, the Authorization Record in the
//! `admins` collection:
//!
//! - [`AccessPolicy`] is evaluated by the document store on every request
//!   and is authoritative.
//! - [`guard::evaluate`] gates navigation from a client's [`SessionState`].

mod caller;
mod collection;
pub mod guard;
mod operation;
mod policy;
mod role;
mod session;

pub use caller::Caller;
pub use collection::{Collection, UnknownCollection};
pub use guard::{GuardOutcome, RouteRequirement};
pub use operation::Operation;
pub use policy::{AccessPolicy, AccessRequest, CollectionPolicy, Constraint, Denied, Ownership, Rule};
pub use role::Role;
pub use session::SessionState;
