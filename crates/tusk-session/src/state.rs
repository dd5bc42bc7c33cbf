//! Record persistence states.
//!
//! Transitions here are pure: they take the current state and the tracked
//! original values and return the next state. Storage effects of `commit`
//! live on [`Record`](crate::Record).
//!
//! | State | set | rollback | delete |
//! |-------|-----|----------|--------|
//! | Transient | track original NULL | no-op | no-op |
//! | Clean | Dirty if the value changes | no-op | Deleted |
//! | Dirty | Clean once every change is reverted | Clean | Deleted |
//! | Deleted | error | no-op | no-op |
//! | Immutable | error | no-op | error |

use std::collections::HashMap;
use tusk_core::{AccessErrorKind, Value};

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Built in memory, never stored
    Transient,
    /// Matches storage
    Clean,
    /// Holds changes not yet stored
    Dirty,
    /// Marked for deletion on the next commit
    Deleted,
    /// Read only: deleted from storage or loaded by a grouped query
    Immutable,
}

impl RecordState {
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordState::Transient => "transient",
            RecordState::Clean => "clean",
            RecordState::Dirty => "dirty",
            RecordState::Deleted => "deleted",
            RecordState::Immutable => "immutable",
        }
    }

    /// Whether a row exists (or existed) in storage for this record.
    pub const fn is_persisted(self) -> bool {
        !matches!(self, RecordState::Transient)
    }

    /// Reading an unloaded member of an immutable record fails, since it
    /// can no longer be fetched.
    pub fn check_read(self, loaded: bool) -> Result<(), AccessErrorKind> {
        if self == RecordState::Immutable && !loaded {
            Err(AccessErrorKind::Immutable)
        } else {
            Ok(())
        }
    }

    pub fn check_write(self) -> Result<(), AccessErrorKind> {
        match self {
            RecordState::Deleted => Err(AccessErrorKind::DeletedImmutable),
            RecordState::Immutable => Err(AccessErrorKind::Immutable),
            _ => Ok(()),
        }
    }

    /// State after writing `new` over `current` for the member `name`,
    /// updating the tracked originals.
    pub fn on_set(
        self,
        originals: &mut HashMap<String, Value>,
        name: &str,
        current: &Value,
        new: &Value,
    ) -> RecordState {
        match self {
            RecordState::Transient => {
                originals
                    .entry(name.to_string())
                    .or_insert(Value::Null);
                RecordState::Transient
            }
            RecordState::Clean => {
                if same(current, new) {
                    RecordState::Clean
                } else {
                    RecordState::Dirty.on_set(originals, name, current, new)
                }
            }
            RecordState::Dirty => {
                match originals.get(name) {
                    Some(original) if same(original, new) => {
                        originals.remove(name);
                    }
                    Some(_) => {}
                    None if same(current, new) => {}
                    None => {
                        originals.insert(name.to_string(), current.clone());
                    }
                }
                if originals.is_empty() {
                    RecordState::Clean
                } else {
                    RecordState::Dirty
                }
            }
            RecordState::Deleted | RecordState::Immutable => self,
        }
    }

    /// State after `delete`. A Dirty record's edits must be reverted by the
    /// caller.
    pub fn on_delete(self) -> Result<RecordState, AccessErrorKind> {
        match self {
            RecordState::Clean | RecordState::Dirty => Ok(RecordState::Deleted),
            RecordState::Transient | RecordState::Deleted => Ok(self),
            RecordState::Immutable => Err(AccessErrorKind::Immutable),
        }
    }

    /// State after `rollback`. The caller restores tracked originals.
    pub fn on_rollback(self) -> RecordState {
        match self {
            RecordState::Dirty => RecordState::Clean,
            other => other,
        }
    }

    /// State after a successful commit.
    pub fn on_commit(self) -> RecordState {
        match self {
            RecordState::Transient | RecordState::Dirty => RecordState::Clean,
            RecordState::Deleted => RecordState::Immutable,
            other => other,
        }
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality used for change tracking.
pub(crate) fn same(a: &Value, b: &Value) -> bool {
    a == b || a.loose_eq(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(state: RecordState, originals: &mut HashMap<String, Value>, current: i64, new: i64) -> RecordState {
        state.on_set(originals, "age", &Value::BigInt(current), &Value::BigInt(new))
    }

    #[test]
    fn clean_to_dirty_only_on_change() {
        let mut originals = HashMap::new();
        assert_eq!(set(RecordState::Clean, &mut originals, 5, 5), RecordState::Clean);
        assert!(originals.is_empty());
        assert_eq!(set(RecordState::Clean, &mut originals, 5, 6), RecordState::Dirty);
        assert_eq!(originals.get("age"), Some(&Value::BigInt(5)));
    }

    #[test]
    fn reverting_a_change_cleans() {
        let mut originals = HashMap::new();
        let state = set(RecordState::Clean, &mut originals, 5, 6);
        let state = set(state, &mut originals, 6, 7);
        assert_eq!(originals.get("age"), Some(&Value::BigInt(5)));
        assert_eq!(set(state, &mut originals, 7, 5), RecordState::Clean);
        assert!(originals.is_empty());
    }

    #[test]
    fn transient_tracks_null_originals() {
        let mut originals = HashMap::new();
        assert_eq!(set(RecordState::Transient, &mut originals, 0, 3), RecordState::Transient);
        assert_eq!(originals.get("age"), Some(&Value::Null));
    }

    #[test]
    fn write_checks() {
        assert_eq!(
            RecordState::Deleted.check_write(),
            Err(AccessErrorKind::DeletedImmutable)
        );
        assert_eq!(RecordState::Immutable.check_write(), Err(AccessErrorKind::Immutable));
        assert!(RecordState::Dirty.check_write().is_ok());
        assert_eq!(RecordState::Immutable.check_read(false), Err(AccessErrorKind::Immutable));
        assert!(RecordState::Immutable.check_read(true).is_ok());
    }

    #[test]
    fn delete_and_commit_table() {
        assert_eq!(RecordState::Clean.on_delete(), Ok(RecordState::Deleted));
        assert_eq!(RecordState::Dirty.on_delete(), Ok(RecordState::Deleted));
        assert_eq!(RecordState::Transient.on_delete(), Ok(RecordState::Transient));
        assert_eq!(RecordState::Immutable.on_delete(), Err(AccessErrorKind::Immutable));
        assert_eq!(RecordState::Deleted.on_commit(), RecordState::Immutable);
        assert_eq!(RecordState::Dirty.on_rollback(), RecordState::Clean);
        assert_eq!(RecordState::Transient.on_rollback(), RecordState::Transient);
    }

    proptest! {
        #[test]
        fn dirty_iff_some_value_differs(writes in proptest::collection::vec((0_usize..3, 0_i64..4), 0..24)) {
            let names = ["a", "b", "c"];
            let persisted = [0_i64, 1, 2];
            let mut current = persisted;
            let mut originals = HashMap::new();
            let mut state = RecordState::Clean;
            for (slot, value) in writes {
                state = state.on_set(
                    &mut originals,
                    names[slot],
                    &Value::BigInt(current[slot]),
                    &Value::BigInt(value),
                );
                current[slot] = value;
            }
            let changed = current != persisted;
            prop_assert_eq!(state == RecordState::Dirty, changed);
            for (i, name) in names.iter().enumerate() {
                match originals.get(*name) {
                    Some(original) => prop_assert_eq!(original, &Value::BigInt(persisted[i])),
                    None => prop_assert_eq!(current[i], persisted[i]),
                }
            }
        }
    }
}
