//! Result mapping
//!
//! Reshape the flat rows of one bulk fetch into one output per requested
//! key, in the order the keys were requested. Batch functions must return
//! results positionally aligned to their keys; these functions produce
//! exactly that.

use std::collections::HashMap;
use std::hash::Hash;

/// A record addressed by its own key
pub trait Keyed<K> {
    fn key(&self) -> K;

    /// Placeholder for a key with no row, e.g. a deleted record
    fn for_missing_key(key: &K) -> Self;
}

/// A record belonging to an owner, as in a 1:many relation
pub trait Owned<K> {
    fn owner_key(&self) -> K;
}

/// One record per key; a key without a row gets [`Keyed::for_missing_key`]
pub fn map_one_to_one<K, V>(rows: Vec<V>, keys: &[K]) -> Vec<V>
where
    K: Eq + Hash,
    V: Keyed<K> + Clone,
{
    map_one_to_one_by(rows, keys, <V as Keyed<K>>::key, <V as Keyed<K>>::for_missing_key)
}

/// One record per key, using `key_of` to address rows and `default_for` to
/// stamp a fresh value for each missing key
///
/// When several rows share a key the first one wins.
pub fn map_one_to_one_by<K, V, KF, DF>(
    rows: Vec<V>,
    keys: &[K],
    key_of: KF,
    default_for: DF,
) -> Vec<V>
where
    K: Eq + Hash,
    V: Clone,
    KF: Fn(&V) -> K,
    DF: Fn(&K) -> V,
{
    let mut by_key: HashMap<K, V> = HashMap::with_capacity(rows.len());
    for row in rows {
        by_key.entry(key_of(&row)).or_insert(row);
    }

    keys.iter()
        .map(|key| match by_key.get(key) {
            Some(row) => row.clone(),
            None => default_for(key),
        })
        .collect()
}

/// All records per owner key; an owner without rows gets an empty list
pub fn map_one_to_many<K, V>(rows: Vec<V>, keys: &[K]) -> Vec<Vec<V>>
where
    K: Eq + Hash + Clone,
    V: Owned<K> + Clone,
{
    map_one_to_many_by(rows, keys, <V as Owned<K>>::owner_key)
}

pub fn map_one_to_many_by<K, V, OF>(rows: Vec<V>, keys: &[K], owner_of: OF) -> Vec<Vec<V>>
where
    K: Eq + Hash + Clone,
    V: Clone,
    OF: Fn(&V) -> K,
{
    let mut grouped: HashMap<K, Vec<V>> = keys.iter().map(|key| (key.clone(), Vec::new())).collect();
    for row in rows {
        if let Some(list) = grouped.get_mut(&owner_of(&row)) {
            list.push(row);
        }
    }

    keys.iter()
        .map(|key| grouped.get(key).cloned().unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Customer {
        id: i64,
        name: String,
    }

    impl Keyed<i64> for Customer {
        fn key(&self) -> i64 {
            self.id
        }

        fn for_missing_key(key: &i64) -> Self {
            Customer {
                id: *key,
                name: String::new(),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Line {
        invoice_id: i64,
        amount: i64,
    }

    impl Owned<i64> for Line {
        fn owner_key(&self) -> i64 {
            self.invoice_id
        }
    }

    fn customer(id: i64, name: &str) -> Customer {
        Customer {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_one_to_one_follows_key_order() {
        let rows = vec![customer(2, "Beta"), customer(1, "Acme")];
        let mapped = map_one_to_one(rows, &[1, 2]);
        assert_eq!(mapped, vec![customer(1, "Acme"), customer(2, "Beta")]);
    }

    #[test]
    fn test_one_to_one_stamps_missing_keys() {
        let mapped = map_one_to_one(vec![customer(1, "Acme")], &[7, 1, 7]);
        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped[0], customer(7, ""));
        assert_eq!(mapped[1], customer(1, "Acme"));
        assert_eq!(mapped[2], customer(7, ""));
    }

    #[test]
    fn test_one_to_one_first_row_wins() {
        let rows = vec![customer(1, "First"), customer(1, "Second")];
        assert_eq!(map_one_to_one(rows, &[1]), vec![customer(1, "First")]);
    }

    #[test]
    fn test_one_to_one_by_closures() {
        let rows = vec![("a".to_string(), 1), ("b".to_string(), 2)];
        let mapped = map_one_to_one_by(
            rows,
            &["b".to_string(), "z".to_string()],
            |row| row.0.clone(),
            |key| (key.clone(), 0),
        );
        assert_eq!(mapped, vec![("b".to_string(), 2), ("z".to_string(), 0)]);
    }

    #[test]
    fn test_one_to_many_groups_by_owner() {
        let rows = vec![
            Line { invoice_id: 10, amount: 5 },
            Line { invoice_id: 30, amount: 1 },
            Line { invoice_id: 10, amount: 7 },
        ];
        let mapped = map_one_to_many(rows, &[20, 10]);
        assert_eq!(mapped.len(), 2);
        assert!(mapped[0].is_empty());
        assert_eq!(
            mapped[1].iter().map(|l| l.amount).collect::<Vec<_>>(),
            vec![5, 7]
        );
    }

    #[test]
    fn test_one_to_many_without_rows() {
        let mapped: Vec<Vec<Line>> = map_one_to_many(Vec::new(), &[1, 2, 3]);
        assert_eq!(mapped, vec![Vec::new(), Vec::new(), Vec::new()]);
    }
}
