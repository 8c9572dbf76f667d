//! Declarative per-collection access rules, evaluated by the document store.
//!
//! The table in [`AccessPolicy::storefront`] is the authoritative gate for
//! every read and write. Client-side gating (the route guard) is a
//! convenience layered on top and is never consulted here.

use serde_json::{Map, Value};

use super::{Caller, Collection, Operation};
use crate::records::{ORDER_OWNER_FIELD, PROFILE_ROLE_FIELD, PROFILE_UID_FIELD};
use crate::types::ProfileRole;

/// Who may perform one operation on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Anyone,
    Authenticated,
    Admin,
    /// An admin, or the caller owns the document (see [`Ownership`]).
    AdminOrOwner,
    Nobody,
}

/// How the owner of a document is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The document id is the owner's uid.
    DocumentId,
    /// A field of the document body holds the owner's uid.
    Field(&'static str),
    /// Documents have no owner.
    Unowned,
}

/// Extra conditions on document bodies for create and update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Owner field: stamped from the caller on create, must name the caller
    /// unless the caller is an admin, immutable afterwards.
    OwnerField(&'static str),
    /// Field must equal the document id.
    MatchesDocumentId(&'static str),
    /// Field a non-admin may only leave at `default` on create and never
    /// change on update.
    AdminOnly {
        field: &'static str,
        default: &'static str,
    },
}

/// Rules for one collection.
#[derive(Debug, Clone, Copy)]
pub struct CollectionPolicy {
    pub read: Rule,
    pub create: Rule,
    pub update: Rule,
    pub delete: Rule,
    pub ownership: Ownership,
    pub constraints: &'static [Constraint],
}

impl CollectionPolicy {
    const fn rule(&self, operation: Operation) -> Rule {
        match operation {
            Operation::Read => self.read,
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// A single access decision request.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub caller: &'a Caller,
    pub collection: Collection,
    pub operation: Operation,
    pub document_id: &'a str,
    /// Stored document body, if the document exists.
    pub existing: Option<&'a Value>,
    /// Body after the write (create and update only).
    pub incoming: Option<&'a Value>,
}

/// A rejected access request.
///
/// Displays as a generic message; the reason is for server logs only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("permission denied")]
pub struct Denied {
    reason: &'static str,
}

impl Denied {
    const fn because(reason: &'static str) -> Self {
        Self { reason }
    }

    /// Internal reason, never sent to clients.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        self.reason
    }
}

/// The full rule set.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    products: CollectionPolicy,
    users: CollectionPolicy,
    orders: CollectionPolicy,
    admins: CollectionPolicy,
    statistics: CollectionPolicy,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::storefront()
    }
}

impl AccessPolicy {
    /// The storefront rule set.
    #[must_use]
    pub const fn storefront() -> Self {
        Self {
            products: CollectionPolicy {
                read: Rule::Anyone,
                create: Rule::Admin,
                update: Rule::Admin,
                delete: Rule::Admin,
                ownership: Ownership::Unowned,
                constraints: &[],
            },
            users: CollectionPolicy {
                read: Rule::AdminOrOwner,
                create: Rule::AdminOrOwner,
                update: Rule::AdminOrOwner,
                delete: Rule::Admin,
                ownership: Ownership::DocumentId,
                constraints: &[
                    Constraint::MatchesDocumentId(PROFILE_UID_FIELD),
                    Constraint::AdminOnly {
                        field: PROFILE_ROLE_FIELD,
                        default: ProfileRole::USER_LABEL,
                    },
                ],
            },
            orders: CollectionPolicy {
                read: Rule::AdminOrOwner,
                create: Rule::Authenticated,
                update: Rule::Admin,
                delete: Rule::Admin,
                ownership: Ownership::Field(ORDER_OWNER_FIELD),
                constraints: &[Constraint::OwnerField(ORDER_OWNER_FIELD)],
            },
            // Written only out of band; readable by the identity it names so
            // role resolution can run with the caller's own credentials.
            admins: CollectionPolicy {
                read: Rule::AdminOrOwner,
                create: Rule::Nobody,
                update: Rule::Nobody,
                delete: Rule::Nobody,
                ownership: Ownership::DocumentId,
                constraints: &[],
            },
            statistics: CollectionPolicy {
                read: Rule::Admin,
                create: Rule::Admin,
                update: Rule::Admin,
                delete: Rule::Admin,
                ownership: Ownership::Unowned,
                constraints: &[],
            },
        }
    }

    /// Rules for `collection`.
    #[must_use]
    pub const fn collection(&self, collection: Collection) -> &CollectionPolicy {
        match collection {
            Collection::Products => &self.products,
            Collection::Users => &self.users,
            Collection::Orders => &self.orders,
            Collection::Admins => &self.admins,
            Collection::Statistics => &self.statistics,
        }
    }

    /// Fill server-controlled fields of a new document before it is checked.
    ///
    /// Missing owner fields are set to the caller's uid, missing id fields
    /// to the document id, and missing admin-only fields to their default.
    /// Values already present are left for [`check`](Self::check) to judge.
    pub fn stamp(
        &self,
        caller: &Caller,
        collection: Collection,
        document_id: &str,
        data: &mut Map<String, Value>,
    ) {
        for constraint in self.collection(collection).constraints {
            match *constraint {
                Constraint::OwnerField(field) => {
                    if let Some(uid) = caller.uid() {
                        data.entry(field)
                            .or_insert_with(|| Value::String(uid.to_string()));
                    }
                }
                Constraint::MatchesDocumentId(field) => {
                    data.entry(field)
                        .or_insert_with(|| Value::String(document_id.to_owned()));
                }
                Constraint::AdminOnly { field, default } => {
                    data.entry(field)
                        .or_insert_with(|| Value::String(default.to_owned()));
                }
            }
        }
    }

    /// Decide a request.
    ///
    /// # Errors
    ///
    /// Returns [`Denied`] when the caller may not perform the operation.
    pub fn check(&self, request: &AccessRequest<'_>) -> Result<(), Denied> {
        let policy = self.collection(request.collection);
        let caller = request.caller;

        match policy.rule(request.operation) {
            Rule::Anyone => {}
            Rule::Nobody => return Err(Denied::because("operation not permitted")),
            Rule::Authenticated => {
                if !caller.is_authenticated() {
                    return Err(Denied::because("authentication required"));
                }
            }
            Rule::Admin => {
                if !caller.is_admin() {
                    return Err(Denied::because("administrator required"));
                }
            }
            Rule::AdminOrOwner => {
                if !caller.is_admin() && !is_owner(policy.ownership, request) {
                    return Err(Denied::because("caller neither admin nor owner"));
                }
            }
        }

        match request.operation {
            Operation::Create | Operation::Update => {
                check_constraints(policy.constraints, request)
            }
            Operation::Read | Operation::Delete => Ok(()),
        }
    }
}

impl AccessPolicy {
    /// Decide whether a query may run at all, from its equality filters.
    ///
    /// Owner-restricted collections only admit non-admin queries that filter
    /// on the owner field with the caller's own uid. The result documents are
    /// still checked one by one afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Denied`] when the query could reach documents the caller may
    /// not read.
    pub fn check_query(
        &self,
        caller: &Caller,
        collection: Collection,
        filters: &[(String, Value)],
    ) -> Result<(), Denied> {
        let policy = self.collection(collection);
        match policy.read {
            Rule::Anyone => Ok(()),
            Rule::Nobody => Err(Denied::because("operation not permitted")),
            Rule::Authenticated if caller.is_authenticated() => Ok(()),
            Rule::Authenticated => Err(Denied::because("authentication required")),
            Rule::Admin if caller.is_admin() => Ok(()),
            Rule::Admin => Err(Denied::because("administrator required")),
            Rule::AdminOrOwner if caller.is_admin() => Ok(()),
            Rule::AdminOrOwner => match policy.ownership {
                Ownership::Field(owner_field) => {
                    let restricted = filters.iter().any(|(name, value)| {
                        name == owner_field && value.as_str().is_some_and(|uid| caller.is(uid))
                    });
                    if restricted {
                        Ok(())
                    } else {
                        Err(Denied::because("query not restricted to caller's documents"))
                    }
                }
                Ownership::DocumentId | Ownership::Unowned => {
                    Err(Denied::because("collection cannot be queried by non-admins"))
                }
            },
        }
    }
}

/// The document body the ownership check should look at: the incoming body
/// when creating, the stored one otherwise.
const fn owned_body<'a>(request: &AccessRequest<'a>) -> Option<&'a Value> {
    match request.operation {
        Operation::Create => request.incoming,
        _ => request.existing,
    }
}

fn is_owner(ownership: Ownership, request: &AccessRequest<'_>) -> bool {
    match ownership {
        Ownership::Unowned => false,
        Ownership::DocumentId => request.caller.is(request.document_id),
        Ownership::Field(field) => owned_body(request)
            .and_then(|body| body.get(field))
            .and_then(Value::as_str)
            .is_some_and(|owner| request.caller.is(owner)),
    }
}

fn field<'a>(body: Option<&'a Value>, name: &str) -> Option<&'a Value> {
    body.and_then(|b| b.get(name))
}

fn check_constraints(constraints: &[Constraint], request: &AccessRequest<'_>) -> Result<(), Denied> {
    let caller = request.caller;
    let incoming = request.incoming;
    let creating = request.operation == Operation::Create;

    for constraint in constraints {
        match *constraint {
            Constraint::OwnerField(name) => {
                let owner = field(incoming, name).and_then(Value::as_str);
                if creating {
                    let Some(owner) = owner else {
                        return Err(Denied::because("owner field missing"));
                    };
                    if !caller.is_admin() && !caller.is(owner) {
                        return Err(Denied::because("owner field names another identity"));
                    }
                } else if field(request.existing, name) != field(incoming, name) {
                    return Err(Denied::because("owner field is immutable"));
                }
            }
            Constraint::MatchesDocumentId(name) => {
                let value = field(incoming, name).and_then(Value::as_str);
                if value != Some(request.document_id) {
                    return Err(Denied::because("id field does not match document id"));
                }
            }
            Constraint::AdminOnly { field: name, default } => {
                if caller.is_admin() {
                    continue;
                }
                let value = field(incoming, name);
                let allowed = if creating {
                    value.is_none_or(|v| v.as_str() == Some(default))
                } else {
                    value == field(request.existing, name)
                };
                if !allowed {
                    return Err(Denied::because("field reserved for administrators"));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Uid;

    fn admin() -> Caller {
        Caller::authenticated(Uid::new("root"), true)
    }

    fn customer(uid: &str) -> Caller {
        Caller::authenticated(Uid::new(uid), false)
    }

    fn request<'a>(
        caller: &'a Caller,
        collection: Collection,
        operation: Operation,
        document_id: &'a str,
    ) -> AccessRequest<'a> {
        AccessRequest {
            caller,
            collection,
            operation,
            document_id,
            existing: None,
            incoming: None,
        }
    }

    #[test]
    fn products_readable_by_anyone_writable_by_admin_only() {
        let policy = AccessPolicy::storefront();
        let anonymous = Caller::anonymous();
        let alice = customer("alice");
        let body = json!({"name": "Filter", "price": "10"});

        assert!(policy
            .check(&request(&anonymous, Collection::Products, Operation::Read, "p1"))
            .is_ok());

        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            for caller in [&anonymous, &alice] {
                let mut req = request(caller, Collection::Products, op, "p1");
                req.existing = Some(&body);
                req.incoming = Some(&body);
                assert!(policy.check(&req).is_err(), "{op} by {caller:?}");
            }
            let admin = admin();
            let mut req = request(&admin, Collection::Products, op, "p1");
            req.existing = Some(&body);
            req.incoming = Some(&body);
            assert!(policy.check(&req).is_ok(), "{op} by admin");
        }
    }

    #[test]
    fn denial_message_is_generic() {
        let policy = AccessPolicy::storefront();
        let alice = customer("alice");
        let err = policy
            .check(&request(&alice, Collection::Statistics, Operation::Read, "summary"))
            .unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
        assert_eq!(err.reason(), "administrator required");
    }

    #[test]
    fn orders_creatable_by_owner_only() {
        let policy = AccessPolicy::storefront();
        let alice = customer("alice");

        let own = json!({"userId": "alice", "items": []});
        let mut req = request(&alice, Collection::Orders, Operation::Create, "o1");
        req.incoming = Some(&own);
        assert!(policy.check(&req).is_ok());

        let foreign = json!({"userId": "bob", "items": []});
        req.incoming = Some(&foreign);
        assert!(policy.check(&req).is_err());

        let anonymous = Caller::anonymous();
        let mut req = request(&anonymous, Collection::Orders, Operation::Create, "o1");
        req.incoming = Some(&own);
        assert!(policy.check(&req).is_err());
    }

    #[test]
    fn stamp_fills_owner_from_caller() {
        let policy = AccessPolicy::storefront();
        let alice = customer("alice");
        let mut data = Map::new();
        policy.stamp(&alice, Collection::Orders, "o1", &mut data);
        assert_eq!(data[ORDER_OWNER_FIELD], "alice");

        // an existing owner is kept for the check to reject
        let mut data = Map::new();
        data.insert(ORDER_OWNER_FIELD.to_owned(), json!("bob"));
        policy.stamp(&alice, Collection::Orders, "o1", &mut data);
        assert_eq!(data[ORDER_OWNER_FIELD], "bob");
    }

    #[test]
    fn orders_readable_by_owner_and_admin() {
        let policy = AccessPolicy::storefront();
        let stored = json!({"userId": "alice"});

        for (caller, allowed) in [
            (customer("alice"), true),
            (customer("bob"), false),
            (admin(), true),
            (Caller::anonymous(), false),
        ] {
            let mut req = request(&caller, Collection::Orders, Operation::Read, "o1");
            req.existing = Some(&stored);
            assert_eq!(policy.check(&req).is_ok(), allowed, "{caller:?}");
        }
    }

    #[test]
    fn order_updates_are_admin_only_and_owner_immutable() {
        let policy = AccessPolicy::storefront();
        let stored = json!({"userId": "alice", "status": "pending"});
        let shipped = json!({"userId": "alice", "status": "shipped"});
        let moved = json!({"userId": "bob", "status": "pending"});

        let alice = customer("alice");
        let mut req = request(&alice, Collection::Orders, Operation::Update, "o1");
        req.existing = Some(&stored);
        req.incoming = Some(&shipped);
        assert!(policy.check(&req).is_err());

        let admin = admin();
        req.caller = &admin;
        assert!(policy.check(&req).is_ok());

        req.incoming = Some(&moved);
        assert!(policy.check(&req).is_err());
    }

    #[test]
    fn storefront_table_evaluates_at_compile_time() {
        const TABLE: AccessPolicy = AccessPolicy::storefront();
        let alice = customer("alice");
        assert!(TABLE
            .check(&request(&alice, Collection::Products, Operation::Read, "p1"))
            .is_ok());
    }

    #[test]
    fn users_self_create_with_default_role_only() {
        let policy = AccessPolicy::storefront();
        let alice = customer("alice");

        let mut data = Map::new();
        data.insert("displayName".to_owned(), json!("Alice"));
        policy.stamp(&alice, Collection::Users, "alice", &mut data);
        assert_eq!(data["role"], json!(ProfileRole::USER_LABEL));
        let body = Value::Object(data);
        let mut req = request(&alice, Collection::Users, Operation::Create, "alice");
        req.incoming = Some(&body);
        assert!(policy.check(&req).is_ok());

        let escalated = json!({"uid": "alice", "role": "admin"});
        req.incoming = Some(&escalated);
        assert!(policy.check(&req).is_err());

        // someone else's profile
        let body = json!({"uid": "bob", "role": "user"});
        let mut req = request(&alice, Collection::Users, Operation::Create, "bob");
        req.incoming = Some(&body);
        assert!(policy.check(&req).is_err());
    }

    #[test]
    fn users_cannot_change_own_role_label() {
        let policy = AccessPolicy::storefront();
        let alice = customer("alice");
        let stored = json!({"uid": "alice", "displayName": "A", "role": "user"});
        let renamed = json!({"uid": "alice", "displayName": "Alice", "role": "user"});
        let promoted = json!({"uid": "alice", "displayName": "A", "role": "admin"});

        let mut req = request(&alice, Collection::Users, Operation::Update, "alice");
        req.existing = Some(&stored);
        req.incoming = Some(&renamed);
        assert!(policy.check(&req).is_ok());

        req.incoming = Some(&promoted);
        assert!(policy.check(&req).is_err());

        let admin = admin();
        req.caller = &admin;
        assert!(policy.check(&req).is_ok());
    }

    #[test]
    fn queries_must_be_restricted_to_own_orders() {
        let policy = AccessPolicy::storefront();
        let alice = customer("alice");
        let own = [(ORDER_OWNER_FIELD.to_owned(), json!("alice"))];
        let other = [(ORDER_OWNER_FIELD.to_owned(), json!("bob"))];

        assert!(policy.check_query(&alice, Collection::Orders, &own).is_ok());
        assert!(policy.check_query(&alice, Collection::Orders, &other).is_err());
        assert!(policy.check_query(&alice, Collection::Orders, &[]).is_err());
        assert!(policy.check_query(&admin(), Collection::Orders, &[]).is_ok());
    }

    #[test]
    fn empty_admin_only_queries_are_still_denied() {
        let policy = AccessPolicy::storefront();
        assert!(policy
            .check_query(&Caller::anonymous(), Collection::Statistics, &[])
            .is_err());
        assert!(policy
            .check_query(&customer("alice"), Collection::Users, &[])
            .is_err());
        assert!(policy
            .check_query(&Caller::anonymous(), Collection::Products, &[])
            .is_ok());
    }

    #[test]
    fn admins_collection_is_read_only() {
        let policy = AccessPolicy::storefront();
        let alice = customer("alice");
        let admin = admin();
        let body = json!({"grantedAt": "2024-01-01T00:00:00Z"});

        assert!(policy
            .check(&request(&alice, Collection::Admins, Operation::Read, "alice"))
            .is_ok());
        assert!(policy
            .check(&request(&alice, Collection::Admins, Operation::Read, "bob"))
            .is_err());
        assert!(policy
            .check(&request(&admin, Collection::Admins, Operation::Read, "bob"))
            .is_ok());

        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            let mut req = request(&admin, Collection::Admins, op, "alice");
            req.incoming = Some(&body);
            assert!(policy.check(&req).is_err());
        }
    }
}
