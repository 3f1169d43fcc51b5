//! Metadata merge.

use std::collections::{BTreeMap, BTreeSet};

use crate::compute::{Metadata, MetadataItem};

/// Folds `desired` into `existing`.
///
/// Keys only present in `existing` are kept, desired values win on conflict,
/// and the fingerprint of `existing` is carried over so the result can be
/// written back as a single fingerprinted update.
pub fn merge(existing: &Metadata, desired: &BTreeMap<String, String>) -> Metadata {
    let mut items: BTreeMap<&str, &str> = existing
        .items
        .iter()
        .map(|item| (item.key.as_str(), item.value.as_str()))
        .collect();

    for (key, value) in desired {
        items.insert(key.as_str(), value.as_str());
    }

    Metadata {
        fingerprint: existing.fingerprint.clone(),
        items: items
            .into_iter()
            .map(|(key, value)| MetadataItem {
                key: key.to_string(),
                value: value.to_string(),
            })
            .collect(),
    }
}

/// Order-insensitive comparison of two item sets.
pub fn same_items(a: &Metadata, b: &Metadata) -> bool {
    let set = |m: &Metadata| -> BTreeSet<(String, String)> {
        m.items
            .iter()
            .map(|i| (i.key.clone(), i.value.clone()))
            .collect()
    };
    set(a) == set(b)
}
