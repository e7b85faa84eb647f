//! Generic child-collection reconciliation.
//!
//! Moving a persisted child collection to a submitted desired state uses
//! one of two strategies, chosen by whether the child carries an identity
//! the outside world can reference:
//!
//! - by membership, for rows whose payload is their key (recipients,
//!   command targets, group/template links, operation conditions): rows
//!   present on both sides are left untouched, there is no "update";
//! - by identity, for operations: a desired item without an id is an
//!   insert, an id unknown to the current set is an integrity error,
//!   never a silent insert.
//!
//! Filter conditions carry no client-referenceable identity and are
//! reconciled positionally by the service instead.

use std::collections::HashSet;
use std::hash::Hash;

use actum_state::MembershipDelta;

use crate::error::ActionError;

/// Membership diff keyed by a key extractor: `insert = desired − current`,
/// `delete = current − desired`. Duplicate desired keys are inserted once.
pub fn diff_membership<T, K>(
    current: &[T],
    desired: &[T],
    key: impl Fn(&T) -> K,
) -> MembershipDelta<T>
where
    T: Clone,
    K: Eq + Hash,
{
    let current_keys: HashSet<K> = current.iter().map(&key).collect();
    let desired_keys: HashSet<K> = desired.iter().map(&key).collect();

    let mut delta = MembershipDelta::default();
    let mut inserted: HashSet<K> = HashSet::new();
    for item in desired {
        let k = key(item);
        if !current_keys.contains(&k) && inserted.insert(k) {
            delta.insert.push(item.clone());
        }
    }
    for item in current {
        if !desired_keys.contains(&key(item)) {
            delta.delete.push(item.clone());
        }
    }
    delta
}

/// One step of an identity diff.
#[derive(Debug, PartialEq, Eq)]
pub enum IdentityChange<'a, C, D> {
    /// Desired item with no id.
    Insert(&'a D),
    /// Desired item matched to a current row; may still carry field
    /// changes, which the caller diffs.
    Update { current: &'a C, desired: &'a D },
    /// Current row absent from the desired set.
    Delete(&'a C),
}

/// Identity diff over a current set keyed by `current_key` and a desired
/// set whose items may or may not carry an id.
///
/// A desired id absent from the current set is an integrity error: ids are
/// allocated by the store, so the client cannot legitimately present one
/// the loaded state does not know.
pub fn diff_identity<'a, C, D, K>(
    current: &'a [C],
    desired: &'a [D],
    current_key: impl Fn(&C) -> K,
    desired_key: impl Fn(&D) -> Option<K>,
    describe: impl Fn(&K) -> String,
) -> Result<Vec<IdentityChange<'a, C, D>>, ActionError>
where
    K: Eq + Hash,
{
    let mut changes = Vec::with_capacity(current.len() + desired.len());
    let mut matched: HashSet<K> = HashSet::with_capacity(desired.len());

    for item in desired {
        match desired_key(item) {
            None => changes.push(IdentityChange::Insert(item)),
            Some(id) => {
                let existing = current.iter().find(|c| current_key(c) == id);
                match existing {
                    Some(row) => {
                        changes.push(IdentityChange::Update {
                            current: row,
                            desired: item,
                        });
                        matched.insert(id);
                    }
                    None => return Err(ActionError::Integrity(describe(&id))),
                }
            }
        }
    }

    for row in current {
        if !matched.contains(&current_key(row)) {
            changes.push(IdentityChange::Delete(row));
        }
    }

    Ok(changes)
}
