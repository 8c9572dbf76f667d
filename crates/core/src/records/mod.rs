//! Document shapes stored in each collection.
//!
//! Field names follow the document store's camelCase convention; the
//! document id is never duplicated into the body except where a rule needs
//! it (`users.uid`).

mod order;
mod product;
mod profile;

pub use order::{
    LineItem, MAX_LINE_QUANTITY, NewOrder, NewOrderLine, ORDER_OWNER_FIELD, Order, OrderData,
    StatisticsSummary,
};
pub use product::{DraftMode, Product, ProductData, ProductDraft, ValidationError, ensure_image};
pub use profile::{AuthorizationRecord, PROFILE_ROLE_FIELD, PROFILE_UID_FIELD, UserProfile};
