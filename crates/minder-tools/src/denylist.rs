//! Fixed denylist of command substrings.
//!
//! Checked before confirmation gating and never bypassable by approval: a
//! call matching a blocked pattern is rejected identically regardless of
//! confirmation state.

use minder_protocol::ToolError;
use serde_json::Value;

/// Scan every string value in the arguments for blocked substrings.
pub fn check_denylist(
    tool_name: &str,
    blocked: &[String],
    args: &Value,
) -> Result<(), ToolError> {
    if blocked.is_empty() {
        return Ok(());
    }
    let mut hit = None;
    visit_strings(args, &mut |text| {
        let lowered = text.to_lowercase();
        for pattern in blocked {
            if lowered.contains(&pattern.to_lowercase()) {
                hit = Some(pattern.clone());
                return;
            }
        }
    });
    match hit {
        Some(pattern) => Err(ToolError::Denied(format!(
            "{tool_name}: arguments match blocked pattern '{pattern}'"
        ))),
        None => Ok(()),
    }
}

fn visit_strings(value: &Value, visit: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => visit(s),
        Value::Array(items) => {
            for item in items {
                visit_strings(item, visit);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                visit_strings(item, visit);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::check_denylist;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn blocked() -> Vec<String> {
        vec![
            "rm -rf /".to_string(),
            "format".to_string(),
            "mkfs".to_string(),
        ]
    }

    #[test]
    fn clean_arguments_pass() {
        let args = json!({ "command": "ls -la" });
        check_denylist("shell", &blocked(), &args).expect("clean");
    }

    #[test]
    fn blocked_substring_is_denied() {
        let args = json!({ "command": "sudo rm -rf / --no-preserve-root" });
        let err = check_denylist("shell", &blocked(), &args).expect_err("blocked");
        assert_eq!(err.kind(), "denied");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let args = json!({ "command": "MKFS.ext4 /dev/sda1" });
        let err = check_denylist("shell", &blocked(), &args).expect_err("blocked");
        assert_eq!(err.kind(), "denied");
    }

    #[test]
    fn nested_string_values_are_scanned() {
        let args = json!({ "steps": [{ "run": "format c:" }] });
        let err = check_denylist("shell", &blocked(), &args).expect_err("blocked");
        assert_eq!(err.kind(), "denied");
    }
}
