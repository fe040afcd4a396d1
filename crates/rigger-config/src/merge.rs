//! Deep merge of TOML tables.

use toml::{Table, Value};

/// Merges `overlay` into `base`.
///
/// Tables present on both sides are merged recursively. Everything else,
/// arrays included, is replaced by the overlay value.
pub fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match value {
            Value::Table(incoming) => match base.get_mut(&key) {
                Some(Value::Table(existing)) => deep_merge(existing, incoming),
                _ => {
                    base.insert(key, Value::Table(incoming));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}
