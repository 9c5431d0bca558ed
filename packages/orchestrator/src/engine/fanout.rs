//! Room configuration discovery for tenancy fan-out.

use std::collections::HashSet;

use serde_json::Value;

use extraction::{config_name, normalize_config_key};

/// One room configuration selected for a dedicated tenancy extraction.
#[derive(Debug, Clone)]
pub struct FanoutTarget {
    /// Normalized configuration key (`studio-a`)
    pub key: String,
    /// Display name as extracted (`Studio A`)
    pub name: String,
    pub configuration: Value,
}

/// Collect distinct room configurations from a room configs payload.
///
/// Looks in `configurations` and `tenancy_data.configurations`, skips
/// entries with no recognizable name, and dedupes by normalized key in
/// first-seen order.
pub fn collect_configurations(payload: &Value) -> Vec<FanoutTarget> {
    let mut targets = Vec::new();
    let mut seen = HashSet::new();

    let sources = [
        payload.get("configurations"),
        payload
            .get("tenancy_data")
            .and_then(|t| t.get("configurations")),
    ];

    for source in sources.into_iter().flatten() {
        let Some(items) = source.as_array() else {
            continue;
        };
        for item in items {
            let Some(name) = config_name(item) else {
                continue;
            };
            let key = normalize_config_key(&name);
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            targets.push(FanoutTarget {
                key,
                name,
                configuration: item.clone(),
            });
        }
    }

    targets
}
