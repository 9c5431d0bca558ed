//! Deterministic merger for node outputs.
//!
//! Takes the raw JSON from each completed node plus any fanned-out tenancy
//! results and folds them into one canonical listing record. Pure function:
//! same inputs always produce the same output, and merging never fails a
//! job outright. When nothing succeeded the outcome carries no record and a
//! quality score of zero.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::types::NodeType;
use crate::validation::completeness;

/// Fields reconciled between `basic_info` and the tenancy `property_level`.
pub const CONFLICT_FIELDS: [&str; 4] = ["name", "guarantor_required", "source", "source_link"];

const LOCATION_KEYS: [&str; 9] = [
    "address",
    "city",
    "postcode",
    "postal_code",
    "region",
    "country",
    "area",
    "latitude",
    "longitude",
];

/// Result of merging one job's node outputs.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub success: bool,
    pub merged: Option<Value>,
    pub conflicts_found: u32,
    pub conflicts_resolved: u32,
    pub quality_score: f64,
    pub completeness: f64,
    pub coverage: f64,
    pub consistency: f64,
}

impl MergeOutcome {
    fn empty() -> Self {
        Self {
            success: false,
            merged: None,
            conflicts_found: 0,
            conflicts_resolved: 0,
            quality_score: 0.0,
            completeness: 0.0,
            coverage: 0.0,
            consistency: 0.0,
        }
    }
}

/// Merge successful node outputs into the canonical listing schema.
///
/// `outputs` holds each node's raw payload; `fanout` holds per-configuration
/// tenancy payloads keyed by normalized configuration name.
pub fn merge_nodes(
    outputs: &BTreeMap<NodeType, Value>,
    fanout: &BTreeMap<String, Value>,
) -> MergeOutcome {
    if outputs.is_empty() {
        return MergeOutcome::empty();
    }

    let mut merged = Map::new();
    let mut comparisons = 0u32;
    let mut conflicts = 0u32;

    if let Some(basic) = outputs.get(&NodeType::BasicInfo).and_then(Value::as_object) {
        for key in [
            "basic_info",
            "location",
            "features",
            "property_rules",
            "safety_and_security",
        ] {
            if let Some(value) = basic.get(key) {
                merged.insert(key.to_string(), value.clone());
            }
        }
    }

    if let Some(output) = outputs.get(&NodeType::Description) {
        let mut description = output
            .get("description")
            .cloned()
            .unwrap_or_else(|| output.clone());
        // top-level faqs fold under the description object
        if let Some(faqs) = output.get("faqs") {
            if let Some(obj) = description.as_object_mut() {
                obj.entry("faqs").or_insert_with(|| faqs.clone());
            }
        }
        merged.insert("description".to_string(), description);
    }

    let mut configurations: Vec<Value> = outputs
        .get(&NodeType::RoomConfigs)
        .and_then(|o| o.get("configurations"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if let Some(tenancy) = outputs.get(&NodeType::TenancyInfo) {
        resolve_conflicts(&mut merged, tenancy, &mut comparisons, &mut conflicts);

        if let Some(tenancy_configs) = tenancy.get("configurations").and_then(Value::as_array) {
            for tenancy_config in tenancy_configs {
                let options = direct_options(tenancy_config);
                if options.is_empty() {
                    continue;
                }
                if let Some(target) = find_config_mut(&mut configurations, tenancy_config) {
                    extend_options(target, &options);
                }
            }
        }

        augment_location(&mut merged, tenancy);
        merged.insert("tenancy_data".to_string(), tenancy.clone());
    }

    for (key, payload) in fanout {
        let options = collect_payload_options(payload);
        if options.is_empty() {
            continue;
        }
        let position = configurations
            .iter()
            .position(|c| normalized_name(c).as_deref() == Some(key.as_str()))
            .or_else(|| {
                let payload_key = normalized_name(payload)?;
                configurations
                    .iter()
                    .position(|c| normalized_name(c) == Some(payload_key.clone()))
            });
        match position {
            Some(position) => extend_options(&mut configurations[position], &options),
            None => debug!(config_key = %key, "fan-out result matched no configuration"),
        }
    }

    for config in configurations.iter_mut() {
        dedup_options(config);
        recompute_price_bounds(config);
        sort_options(config);
    }

    configurations.sort_by_key(|c| normalized_name(c).unwrap_or_default());

    let features = collect_features(&merged, &configurations);
    if !features.is_empty() {
        merged.insert("features".to_string(), Value::Array(features));
    }

    if !configurations.is_empty() {
        merged.insert("configurations".to_string(), Value::Array(configurations));
    }

    let cleaned = clean_value(Value::Object(merged)).unwrap_or_else(|| json!({}));

    let completeness_score = completeness(&cleaned);
    let coverage = outputs.len() as f64 / NodeType::ALL.len() as f64;
    let consistency = if comparisons == 0 {
        1.0
    } else {
        (comparisons - conflicts) as f64 / comparisons as f64
    };
    let quality_score = 0.4 * completeness_score + 0.3 * coverage + 0.3 * consistency;

    debug!(
        conflicts,
        comparisons,
        coverage,
        quality = quality_score,
        "merged node outputs"
    );

    MergeOutcome {
        success: true,
        merged: Some(cleaned),
        conflicts_found: conflicts,
        conflicts_resolved: conflicts,
        quality_score,
        completeness: completeness_score,
        coverage,
        consistency,
    }
}

/// Normalize a configuration name for matching: lowercase, alphanumeric
/// runs joined by single hyphens.
pub fn normalize_config_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !key.is_empty() {
                key.push('-');
            }
            pending_hyphen = false;
            key.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    key
}

/// Best-effort display name for a configuration object.
pub fn config_name(config: &Value) -> Option<String> {
    config
        .get("name")
        .and_then(scalar_string)
        .or_else(|| {
            config
                .get("Basic")
                .and_then(|b| b.get("Name"))
                .and_then(scalar_string)
        })
        .or_else(|| config.get("room_type").and_then(scalar_string))
        .or_else(|| {
            config
                .get("Description")
                .and_then(|d| d.get("Name"))
                .and_then(scalar_string)
        })
        .or_else(|| config.get("configuration_name").and_then(scalar_string))
        .filter(|s| !s.is_empty())
}

fn normalized_name(config: &Value) -> Option<String> {
    config_name(config).map(|n| normalize_config_key(&n))
}

fn resolve_conflicts(
    merged: &mut Map<String, Value>,
    tenancy: &Value,
    comparisons: &mut u32,
    conflicts: &mut u32,
) {
    let Some(property_level) = tenancy.get("property_level").and_then(Value::as_object) else {
        return;
    };

    let basic = merged
        .entry("basic_info")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(basic) = basic.as_object_mut() else {
        return;
    };

    for field in CONFLICT_FIELDS {
        let theirs = property_level.get(field).filter(|v| !is_empty(v));
        let ours = basic.get(field).filter(|v| !is_empty(v)).cloned();
        match (ours, theirs) {
            (Some(ours), Some(theirs)) => {
                *comparisons += 1;
                // basic_info wins; the tenancy value is discarded
                if &ours != theirs {
                    *conflicts += 1;
                }
            }
            (None, Some(theirs)) => {
                basic.insert(field.to_string(), theirs.clone());
            }
            _ => {}
        }
    }
}

fn augment_location(merged: &mut Map<String, Value>, tenancy: &Value) {
    let Some(property_level) = tenancy.get("property_level") else {
        return;
    };

    let mut sources = Vec::new();
    if let Some(obj) = property_level.as_object() {
        sources.push(obj);
    }
    if let Some(obj) = property_level.get("location").and_then(Value::as_object) {
        sources.push(obj);
    }
    if sources.is_empty() {
        return;
    }

    let location = merged
        .entry("location")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(location) = location.as_object_mut() else {
        return;
    };

    for source in sources {
        for key in LOCATION_KEYS {
            let Some(value) = source.get(key).filter(|v| !is_empty(v)) else {
                continue;
            };
            let missing = location.get(key).map(is_empty).unwrap_or(true);
            if missing {
                location.insert(key.to_string(), value.clone());
            }
        }
    }
}

fn find_config_mut<'a>(
    configurations: &'a mut [Value],
    tenancy_config: &Value,
) -> Option<&'a mut Value> {
    if let Some(id) = config_id(tenancy_config) {
        if let Some(position) = configurations
            .iter()
            .position(|c| config_id(c).as_deref() == Some(id.as_str()))
        {
            return configurations.get_mut(position);
        }
    }

    let key = normalized_name(tenancy_config)?;
    let position = configurations
        .iter()
        .position(|c| normalized_name(c) == Some(key.clone()))?;
    configurations.get_mut(position)
}

fn config_id(config: &Value) -> Option<String> {
    config
        .get("configuration_id")
        .and_then(scalar_string)
        .or_else(|| {
            let source = config.get("Source Details")?;
            source
                .get("configuration_id")
                .and_then(scalar_string)
                .or_else(|| source.get("Configuration ID").and_then(scalar_string))
        })
        .filter(|s| !s.is_empty())
}

fn direct_options(config: &Value) -> Vec<Value> {
    config
        .get("tenancy_options")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn collect_payload_options(payload: &Value) -> Vec<Value> {
    let direct = direct_options(payload);
    if !direct.is_empty() {
        return direct;
    }

    let configs = payload
        .get("configurations")
        .or_else(|| payload.get("tenancy_data").and_then(|t| t.get("configurations")));
    let Some(configs) = configs.and_then(Value::as_array) else {
        return Vec::new();
    };

    configs.iter().flat_map(direct_options).collect()
}

fn extend_options(config: &mut Value, options: &[Value]) {
    let Some(obj) = config.as_object_mut() else {
        return;
    };
    let entry = obj
        .entry("tenancy_options")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Some(existing) = entry.as_array_mut() {
        existing.extend(options.iter().cloned());
    }
}

fn dedup_options(config: &mut Value) {
    let Some(options) = config
        .get_mut("tenancy_options")
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    let mut seen = HashSet::new();
    options.retain(|option| match option_key(option) {
        Some(key) => seen.insert(key),
        // no duration and no price: nothing to dedup on, keep the option
        None => true,
    });
}

// Composite dedup key: (duration, price).
fn option_key(option: &Value) -> Option<String> {
    let duration = option
        .get("tenancy_length_weeks")
        .or_else(|| option.get("tenancy_length"))
        .or_else(|| option.get("duration"))
        .map(normalized_token)
        .unwrap_or_default();
    let price = option
        .get("price_per_week")
        .or_else(|| option.get("price"))
        .map(normalized_token)
        .unwrap_or_default();
    if duration.is_empty() && price.is_empty() {
        return None;
    }
    Some(format!("{duration}|{price}"))
}

/// Numeric values and numeric-looking strings collapse to the same token,
/// so `44`, `"44"` and `"44 weeks"` all dedupe together.
fn normalized_token(value: &Value) -> String {
    if let Some(n) = parse_number(value) {
        if n.fract() == 0.0 {
            return format!("{}", n as i64);
        }
        return format!("{n}");
    }
    scalar_string(value).unwrap_or_default().to_lowercase()
}

fn recompute_price_bounds(config: &mut Value) {
    let prices: Vec<f64> = config
        .get("tenancy_options")
        .and_then(Value::as_array)
        .map(|options| {
            options
                .iter()
                .filter_map(|o| {
                    o.get("price_per_week")
                        .or_else(|| o.get("price"))
                        .and_then(parse_number)
                })
                .collect()
        })
        .unwrap_or_default();

    if prices.is_empty() {
        return;
    }

    let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let Some(obj) = config.as_object_mut() else {
        return;
    };
    let pricing = obj
        .entry("Pricing")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(pricing) = pricing.as_object_mut() {
        pricing.insert("Min Price".to_string(), number(min));
        pricing.insert("Max Price".to_string(), number(max));
    }
}

fn sort_options(config: &mut Value) {
    let Some(options) = config
        .get_mut("tenancy_options")
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    options.sort_by(|a, b| {
        duration_sort_key(a)
            .partial_cmp(&duration_sort_key(b))
            .unwrap_or(Ordering::Equal)
    });
}

fn duration_sort_key(option: &Value) -> f64 {
    option
        .get("tenancy_length_weeks")
        .or_else(|| option.get("tenancy_length"))
        .or_else(|| option.get("duration"))
        .and_then(parse_number)
        .unwrap_or(f64::MAX)
}

fn collect_features(merged: &Map<String, Value>, configurations: &[Value]) -> Vec<Value> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    if let Some(items) = merged.get("features").and_then(Value::as_array) {
        for item in items.clone() {
            push_feature(&mut out, &mut seen, item);
        }
    }

    if let Some(desc_features) = merged.get("description").and_then(|d| d.get("features")) {
        match desc_features {
            Value::String(s) => {
                for part in s.split(',') {
                    push_feature(&mut out, &mut seen, Value::String(part.trim().to_string()));
                }
            }
            Value::Array(items) => {
                for item in items.clone() {
                    push_feature(&mut out, &mut seen, item);
                }
            }
            _ => {}
        }
    }

    for config in configurations {
        for key in ["features", "Features"] {
            if let Some(items) = config.get(key).and_then(Value::as_array) {
                for item in items.clone() {
                    push_feature(&mut out, &mut seen, item);
                }
            }
        }
    }

    out
}

fn push_feature(out: &mut Vec<Value>, seen: &mut HashSet<String>, item: Value) {
    let name = match &item {
        Value::String(s) => s.trim().to_string(),
        Value::Object(o) => o
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    };
    if name.is_empty() {
        return;
    }
    if seen.insert(name.to_lowercase()) {
        out.push(item);
    }
}

/// Strip nulls, blank strings, and empty collections recursively.
/// Returns `None` when the whole value is empty.
fn clean_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            if s.trim().is_empty() {
                None
            } else {
                Some(Value::String(s))
            }
        }
        Value::Array(items) => {
            let cleaned: Vec<Value> = items.into_iter().filter_map(clean_value).collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Array(cleaned))
            }
        }
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| clean_value(v).map(|v| (k, v)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        other => Some(other),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if digits.chars().any(|c| c.is_ascii_digit()) {
                digits.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_info_output() -> Value {
        json!({
            "basic_info": {"name": "Unite House", "source": "unite-students"},
            "location": {"city": "Leeds", "postcode": ""},
            "features": ["Wifi", "Gym"],
            "property_rules": ["No smoking"],
            "safety_and_security": ["CCTV"]
        })
    }

    fn tenancy_output() -> Value {
        json!({
            "property_level": {
                "name": "Unite House",
                "guarantor_required": true,
                "address": "12 Portland Way",
                "city": "Leeds"
            },
            "configurations": [{
                "name": "Studio A",
                "tenancy_options": [
                    {"tenancy_length_weeks": 44, "price_per_week": 150}
                ]
            }]
        })
    }

    fn room_configs_output() -> Value {
        json!({
            "configurations": [{
                "Basic": {"Name": "Studio A"},
                "Source Details": {"Configuration ID": "cfg-1"},
                "Pricing": {"Min Price": 999, "Max Price": 999},
                "features": ["wifi", "Desk"]
            }]
        })
    }

    fn all_outputs() -> BTreeMap<NodeType, Value> {
        let mut outputs = BTreeMap::new();
        outputs.insert(NodeType::BasicInfo, basic_info_output());
        outputs.insert(
            NodeType::Description,
            json!({"description": {"summary": "A nice studio building.", "features": "Cinema Room, Wifi"}}),
        );
        outputs.insert(NodeType::RoomConfigs, room_configs_output());
        outputs.insert(NodeType::TenancyInfo, tenancy_output());
        outputs
    }

    #[test]
    fn empty_outputs_merge_to_nothing() {
        let outcome = merge_nodes(&BTreeMap::new(), &BTreeMap::new());
        assert!(!outcome.success);
        assert!(outcome.merged.is_none());
        assert_eq!(outcome.quality_score, 0.0);
    }

    #[test]
    fn merge_is_deterministic() {
        let outputs = all_outputs();
        let fanout = BTreeMap::new();
        let first = merge_nodes(&outputs, &fanout);
        let second = merge_nodes(&outputs, &fanout);
        assert_eq!(first.merged, second.merged);
        assert_eq!(first.conflicts_found, second.conflicts_found);
        assert_eq!(first.quality_score, second.quality_score);
    }

    #[test]
    fn conflicting_name_keeps_basic_info_and_counts_one_conflict() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            NodeType::BasicInfo,
            json!({"basic_info": {"name": "A"}}),
        );
        outputs.insert(
            NodeType::TenancyInfo,
            json!({"property_level": {"name": "B"}}),
        );

        let outcome = merge_nodes(&outputs, &BTreeMap::new());
        assert_eq!(outcome.conflicts_found, 1);
        assert_eq!(outcome.conflicts_resolved, 1);
        assert_eq!(outcome.consistency, 0.0);

        let merged = outcome.merged.unwrap();
        assert_eq!(merged["basic_info"]["name"], "A");
    }

    #[test]
    fn agreeing_fields_do_not_count_as_conflicts() {
        let outcome = merge_nodes(&all_outputs(), &BTreeMap::new());
        // name agrees, guarantor_required only on the tenancy side
        assert_eq!(outcome.conflicts_found, 0);
        assert_eq!(outcome.consistency, 1.0);

        let merged = outcome.merged.unwrap();
        assert_eq!(merged["basic_info"]["guarantor_required"], true);
        assert_eq!(merged["basic_info"]["source"], "unite-students");
    }

    #[test]
    fn tenancy_options_dedup_by_duration_and_price() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            NodeType::RoomConfigs,
            json!({"configurations": [{"name": "Studio A"}]}),
        );
        outputs.insert(
            NodeType::TenancyInfo,
            json!({
                "configurations": [{
                    "name": "Studio A",
                    "tenancy_options": [
                        {"duration": "44 weeks", "price": 150},
                        {"tenancy_length_weeks": 44, "price_per_week": "£150"},
                        {"tenancy_length_weeks": 51, "price_per_week": 145}
                    ]
                }]
            }),
        );

        let outcome = merge_nodes(&outputs, &BTreeMap::new());
        let merged = outcome.merged.unwrap();
        let options = merged["configurations"][0]["tenancy_options"]
            .as_array()
            .unwrap();
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn options_without_duration_or_price_are_all_kept() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            NodeType::RoomConfigs,
            json!({"configurations": [{"name": "Studio A"}]}),
        );
        outputs.insert(
            NodeType::TenancyInfo,
            json!({
                "configurations": [{
                    "name": "Studio A",
                    "tenancy_options": [
                        {"price_total": 5000},
                        {"price_total": 7000},
                        {"availability": "sold out"}
                    ]
                }]
            }),
        );

        let outcome = merge_nodes(&outputs, &BTreeMap::new());
        let merged = outcome.merged.unwrap();
        let options = merged["configurations"][0]["tenancy_options"]
            .as_array()
            .unwrap();
        assert_eq!(options.len(), 3);
    }

    #[test]
    fn fanout_result_attaches_by_normalized_key_and_sets_price_bounds() {
        let mut outputs = BTreeMap::new();
        outputs.insert(NodeType::RoomConfigs, room_configs_output());

        let mut fanout = BTreeMap::new();
        fanout.insert(
            "studio-a".to_string(),
            json!({
                "configurations": [{
                    "name": "Studio A",
                    "tenancy_options": [{"duration": "44 weeks", "price": 150}]
                }]
            }),
        );

        let outcome = merge_nodes(&outputs, &fanout);
        let merged = outcome.merged.unwrap();
        let configs = merged["configurations"].as_array().unwrap();
        assert_eq!(configs.len(), 1);

        let options = configs[0]["tenancy_options"].as_array().unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(configs[0]["Pricing"]["Min Price"], 150);
        assert_eq!(configs[0]["Pricing"]["Max Price"], 150);
    }

    #[test]
    fn price_bounds_span_all_attached_options() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            NodeType::RoomConfigs,
            json!({"configurations": [{"name": "En-suite"}]}),
        );
        outputs.insert(
            NodeType::TenancyInfo,
            json!({
                "configurations": [{
                    "name": "En-suite",
                    "tenancy_options": [
                        {"tenancy_length_weeks": 44, "price_per_week": 150},
                        {"tenancy_length_weeks": 51, "price_per_week": 139.5}
                    ]
                }]
            }),
        );

        let outcome = merge_nodes(&outputs, &BTreeMap::new());
        let merged = outcome.merged.unwrap();
        let pricing = &merged["configurations"][0]["Pricing"];
        assert_eq!(pricing["Min Price"], 139.5);
        assert_eq!(pricing["Max Price"], 150);
    }

    #[test]
    fn features_union_is_case_insensitive() {
        let outcome = merge_nodes(&all_outputs(), &BTreeMap::new());
        let merged = outcome.merged.unwrap();
        let features: Vec<&str> = merged["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f.as_str().unwrap())
            .collect();
        // "wifi" from the config and "Wifi" from description both fold into
        // the first-seen "Wifi"
        assert_eq!(features, vec!["Wifi", "Gym", "Cinema Room", "Desk"]);
    }

    #[test]
    fn location_backfills_from_property_level() {
        let outcome = merge_nodes(&all_outputs(), &BTreeMap::new());
        let merged = outcome.merged.unwrap();
        assert_eq!(merged["location"]["address"], "12 Portland Way");
        // city came from basic_info and is not overwritten
        assert_eq!(merged["location"]["city"], "Leeds");
    }

    #[test]
    fn cleaning_strips_empty_values() {
        let outcome = merge_nodes(&all_outputs(), &BTreeMap::new());
        let merged = outcome.merged.unwrap();
        // blank postcode from basic_info is gone
        assert!(merged["location"].get("postcode").is_none());
    }

    #[test]
    fn configurations_sort_by_normalized_name() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            NodeType::RoomConfigs,
            json!({"configurations": [
                {"name": "Studio B"},
                {"name": "En-suite"},
                {"name": "Studio A"}
            ]}),
        );

        let outcome = merge_nodes(&outputs, &BTreeMap::new());
        let merged = outcome.merged.unwrap();
        let names: Vec<&str> = merged["configurations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["En-suite", "Studio A", "Studio B"]);
    }

    #[test]
    fn quality_blends_completeness_coverage_and_consistency() {
        let outcome = merge_nodes(&all_outputs(), &BTreeMap::new());
        assert_eq!(outcome.coverage, 1.0);
        assert_eq!(outcome.consistency, 1.0);
        let expected =
            0.4 * outcome.completeness + 0.3 * outcome.coverage + 0.3 * outcome.consistency;
        assert!((outcome.quality_score - expected).abs() < 1e-9);
        assert!(outcome.quality_score > 0.6);
    }

    #[test]
    fn normalize_config_key_folds_punctuation() {
        assert_eq!(normalize_config_key("Studio A"), "studio-a");
        assert_eq!(normalize_config_key("  En-Suite (Gold) "), "en-suite-gold");
        assert_eq!(normalize_config_key("STUDIO"), "studio");
    }
}
