//! Per-node shape validation and completeness scoring.
//!
//! Validation never blocks the pipeline: a report with errors still flows
//! into the merge, and the completeness score becomes the node's confidence.

use serde_json::Value;

use crate::types::NodeType;

/// Outcome of validating one node's extracted payload.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub completeness_score: f64,
}

impl ValidationReport {
    fn finish(mut self, data: &Value) -> Self {
        self.is_valid = self.errors.is_empty();
        self.completeness_score = completeness(data);
        self
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Validate a node payload against its expected shape.
pub fn validate_node(node: NodeType, data: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !data.is_object() {
        report.error(format!("{} payload must be a JSON object", node));
        return report.finish(data);
    }

    match node {
        NodeType::BasicInfo => validate_basic_info(data, &mut report),
        NodeType::Description => validate_description(data, &mut report),
        NodeType::RoomConfigs => validate_room_configs(data, &mut report),
        NodeType::TenancyInfo => validate_tenancy_info(data, &mut report),
    }

    report.finish(data)
}

fn validate_basic_info(data: &Value, report: &mut ValidationReport) {
    for key in ["basic_info", "location"] {
        if let Some(value) = data.get(key) {
            if !value.is_object() {
                report.error(format!("'{key}' must be an object"));
            }
        }
    }

    for key in ["features", "property_rules", "safety_and_security"] {
        if let Some(value) = data.get(key) {
            if !value.is_array() {
                report.error(format!("'{key}' must be a list"));
            }
        }
    }

    if data.get("basic_info").is_none() && data.get("location").is_none() {
        report.warn("neither 'basic_info' nor 'location' present");
    }
}

fn validate_description(data: &Value, report: &mut ValidationReport) {
    let Some(description) = data.get("description") else {
        report.error("'description' object is required");
        return;
    };

    let Some(description) = description.as_object() else {
        report.error("'description' must be an object");
        return;
    };

    if let Some(email) = description.get("email").and_then(Value::as_str) {
        if !looks_like_email(email) {
            report.warn(format!("'email' does not look like an email: {email}"));
        }
    }

    let faqs = description
        .get("faqs")
        .or_else(|| data.get("faqs"));
    if let Some(faqs) = faqs {
        match faqs.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    let ok = item
                        .as_object()
                        .map(|o| o.contains_key("question") && o.contains_key("answer"))
                        .unwrap_or(false);
                    if !ok {
                        report.warn(format!("faq {i} is missing 'question' or 'answer'"));
                    }
                }
            }
            None => report.error("'faqs' must be a list"),
        }
    }
}

fn validate_room_configs(data: &Value, report: &mut ValidationReport) {
    let Some(configs) = data.get("configurations") else {
        report.error("'configurations' list is required");
        return;
    };

    let Some(configs) = configs.as_array() else {
        report.error("'configurations' must be a list");
        return;
    };

    for (i, config) in configs.iter().enumerate() {
        let Some(config) = config.as_object() else {
            report.error(format!("configuration {i} must be an object"));
            continue;
        };

        for section in ["Basic", "Source Details", "Pricing"] {
            if !config.contains_key(section) {
                report.warn(format!("configuration {i} is missing '{section}'"));
            }
        }
    }
}

fn validate_tenancy_info(data: &Value, report: &mut ValidationReport) {
    if let Some(property_level) = data.get("property_level") {
        if !property_level.is_object() {
            report.error("'property_level' must be an object");
        }
    }

    let Some(configs) = data.get("configurations") else {
        return;
    };

    let Some(configs) = configs.as_array() else {
        report.error("'configurations' must be a list");
        return;
    };

    for (i, config) in configs.iter().enumerate() {
        let Some(config) = config.as_object() else {
            report.error(format!("configuration {i} must be an object"));
            continue;
        };

        let Some(options) = config.get("tenancy_options") else {
            continue;
        };

        let Some(options) = options.as_array() else {
            report.error(format!("configuration {i} 'tenancy_options' must be a list"));
            continue;
        };

        for (j, option) in options.iter().enumerate() {
            let Some(option) = option.as_object() else {
                report.error(format!("tenancy option {i}.{j} must be an object"));
                continue;
            };

            if let Some(weeks) = option.get("tenancy_length_weeks") {
                if !weeks.is_null() && !weeks.is_i64() && !weeks.is_u64() {
                    report.warn(format!(
                        "tenancy option {i}.{j} 'tenancy_length_weeks' should be an integer"
                    ));
                }
            }

            for key in ["price_per_week", "price_total"] {
                if let Some(price) = option.get(key) {
                    if !price.is_null() && !price.is_number() {
                        report.warn(format!(
                            "tenancy option {i}.{j} '{key}' should be numeric"
                        ));
                    }
                }
            }
        }
    }
}

/// Fraction of scalar leaves that carry a value.
///
/// Nulls, blank strings, and empty collections count as empty leaves.
/// Returns 0.0 for a payload with no leaves at all.
pub fn completeness(data: &Value) -> f64 {
    let mut total = 0usize;
    let mut filled = 0usize;
    count_leaves(data, &mut total, &mut filled);

    if total == 0 {
        0.0
    } else {
        filled as f64 / total as f64
    }
}

fn count_leaves(value: &Value, total: &mut usize, filled: &mut usize) {
    match value {
        Value::Object(map) => {
            if map.is_empty() {
                *total += 1;
            } else {
                for v in map.values() {
                    count_leaves(v, total, filled);
                }
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                *total += 1;
            } else {
                for v in items {
                    count_leaves(v, total, filled);
                }
            }
        }
        Value::Null => *total += 1,
        Value::String(s) => {
            *total += 1;
            if !s.trim().is_empty() {
                *filled += 1;
            }
        }
        _ => {
            *total += 1;
            *filled += 1;
        }
    }
}

fn looks_like_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn basic_info_with_non_object_location_is_invalid() {
        let data = json!({ "basic_info": {"name": "Unite House"}, "location": "Leeds" });
        let report = validate_node(NodeType::BasicInfo, &data);
        assert!(!report.is_valid);
    }

    #[test]
    fn basic_info_with_list_fields_passes() {
        let data = json!({
            "basic_info": {"name": "Unite House"},
            "location": {"city": "Leeds"},
            "features": ["Wifi"],
            "property_rules": [],
            "safety_and_security": ["CCTV"],
        });
        let report = validate_node(NodeType::BasicInfo, &data);
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn description_requires_description_object() {
        let report = validate_node(NodeType::Description, &json!({"summary": "nice"}));
        assert!(!report.is_valid);
    }

    #[test]
    fn description_flags_bad_email_as_warning_only() {
        let data = json!({ "description": { "email": "not-an-email" } });
        let report = validate_node(NodeType::Description, &data);
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn description_faqs_must_have_question_and_answer() {
        let data = json!({
            "description": {
                "faqs": [
                    {"question": "Q", "answer": "A"},
                    {"question": "Q only"},
                ]
            }
        });
        let report = validate_node(NodeType::Description, &data);
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn room_configs_requires_configurations_list() {
        let report = validate_node(NodeType::RoomConfigs, &json!({}));
        assert!(!report.is_valid);

        let report = validate_node(
            NodeType::RoomConfigs,
            &json!({"configurations": [{"Basic": {}, "Source Details": {}, "Pricing": {}}]}),
        );
        assert!(report.is_valid);
    }

    #[test]
    fn room_config_missing_section_is_a_warning() {
        let report = validate_node(
            NodeType::RoomConfigs,
            &json!({"configurations": [{"Basic": {"Name": "Studio A"}}]}),
        );
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn tenancy_options_typed_fields_warn_on_wrong_type() {
        let data = json!({
            "property_level": {"name": "Unite House"},
            "configurations": [{
                "name": "Studio A",
                "tenancy_options": [
                    {"tenancy_length_weeks": "44", "price_per_week": "150"}
                ]
            }]
        });
        let report = validate_node(NodeType::TenancyInfo, &data);
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn completeness_counts_empty_leaves() {
        let full = json!({"a": "x", "b": 1});
        assert!((completeness(&full) - 1.0).abs() < f64::EPSILON);

        let half = json!({"a": "x", "b": null});
        assert!((completeness(&half) - 0.5).abs() < f64::EPSILON);

        let empty = json!({"a": "", "b": [], "c": {}});
        assert_eq!(completeness(&empty), 0.0);
    }

    #[test]
    fn non_object_payload_is_invalid() {
        let report = validate_node(NodeType::BasicInfo, &json!("just a string"));
        assert!(!report.is_valid);
    }
}
