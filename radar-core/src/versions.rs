use std::collections::HashMap;

use radar_model::{ResourceVersion, Space, VersionSet};

/// Build the version set a check starts from.
///
/// Persisted versions overwrite the seed space by space; seed spaces that
/// have nothing persisted yet are kept. When `latest` carries more than one
/// row for a space, the highest check order wins.
pub fn merge_versions(seed: Option<VersionSet>, latest: &[ResourceVersion]) -> VersionSet {
    let mut merged = seed.unwrap_or_default();
    let mut orders: HashMap<&Space, i64> = HashMap::with_capacity(latest.len());

    for row in latest {
        let newest = orders
            .get(&row.space)
            .is_none_or(|order| row.check_order >= *order);
        if newest {
            orders.insert(&row.space, row.check_order);
            merged.insert(row.space.clone(), row.version.clone());
        }
    }

    merged
}
