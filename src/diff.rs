//! Compare two profiles, or a profile against the live files.

use anyhow::Result;
use serde_json::Value;

use crate::fs_utils::read_optional;
use crate::paths::Paths;
use crate::profiles::load_profile;
use crate::targets::Target;

/// How one target compares between two sides
#[derive(Debug, Clone, PartialEq)]
pub enum TargetDiff {
    Identical,
    /// Both sides present, content differs. For JSON targets `keys` holds
    /// the differing dotted paths with the value on each side.
    Differs { keys: Vec<KeyDiff> },
    MissingLeft,
    MissingRight,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyDiff {
    pub key: String,
    pub left: Option<Value>,
    pub right: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct DiffReport {
    pub left: String,
    pub right: String,
    /// Targets present on at least one side, in canonical order
    pub entries: Vec<(Target, TargetDiff)>,
}

impl DiffReport {
    pub fn is_identical(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, d)| matches!(d, TargetDiff::Identical))
    }
}

/// Compare two profiles
pub fn diff_profiles(paths: &Paths, left: &str, right: &str) -> Result<DiffReport> {
    load_profile(paths, left)?;
    load_profile(paths, right)?;

    let mut entries = Vec::new();
    for target in Target::all() {
        let a = read_optional(&target.profile_path(paths, left))?;
        let b = read_optional(&target.profile_path(paths, right))?;
        if let Some(diff) = compare(target, a.as_deref(), b.as_deref()) {
            entries.push((target, diff));
        }
    }

    Ok(DiffReport {
        left: left.to_string(),
        right: right.to_string(),
        entries,
    })
}

/// Compare a profile with the live files it governs
///
/// Only the profile's own targets are compared; live files it does not
/// govern are not its concern.
pub fn diff_profile_current(paths: &Paths, name: &str) -> Result<DiffReport> {
    let profile = load_profile(paths, name)?;

    let mut entries = Vec::new();
    for entry in &profile.entries {
        let a = Some(entry.read()?);
        let b = read_optional(&entry.target.live_path(paths))?;
        if let Some(diff) = compare(entry.target, a.as_deref(), b.as_deref()) {
            entries.push((entry.target, diff));
        }
    }

    Ok(DiffReport {
        left: name.to_string(),
        right: "current".to_string(),
        entries,
    })
}

fn compare(target: Target, left: Option<&[u8]>, right: Option<&[u8]>) -> Option<TargetDiff> {
    match (left, right) {
        (None, None) => None,
        (None, Some(_)) => Some(TargetDiff::MissingLeft),
        (Some(_), None) => Some(TargetDiff::MissingRight),
        (Some(a), Some(b)) if a == b => Some(TargetDiff::Identical),
        (Some(a), Some(b)) => {
            let mut keys = Vec::new();
            if target.is_json() {
                if let (Ok(ja), Ok(jb)) = (
                    serde_json::from_slice::<Value>(a),
                    serde_json::from_slice::<Value>(b),
                ) {
                    compare_json_values(&ja, &jb, "", &mut keys);
                    // Same JSON, different formatting
                    if keys.is_empty() {
                        return Some(TargetDiff::Identical);
                    }
                }
            }
            Some(TargetDiff::Differs { keys })
        }
    }
}

/// Recursively compare JSON values and collect differences
fn compare_json_values(v1: &Value, v2: &Value, path: &str, differences: &mut Vec<KeyDiff>) {
    let join = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", path, key)
        }
    };

    match (v1, v2) {
        (Value::Object(o1), Value::Object(o2)) => {
            for (key, val1) in o1 {
                match o2.get(key) {
                    Some(val2) => compare_json_values(val1, val2, &join(key), differences),
                    None => differences.push(KeyDiff {
                        key: join(key),
                        left: Some(val1.clone()),
                        right: None,
                    }),
                }
            }
            for (key, val2) in o2 {
                if !o1.contains_key(key) {
                    differences.push(KeyDiff {
                        key: join(key),
                        left: None,
                        right: Some(val2.clone()),
                    });
                }
            }
        }
        _ => {
            if v1 != v2 {
                differences.push(KeyDiff {
                    key: path.to_string(),
                    left: Some(v1.clone()),
                    right: Some(v2.clone()),
                });
            }
        }
    }
}

/// Format a JSON value for display (truncate if too long)
pub fn format_json_value(val: &Option<Value>) -> String {
    match val {
        None => "(missing)".to_string(),
        Some(v) => {
            let s = match v {
                Value::String(s) => format!("\"{}\"", s),
                Value::Array(arr) => format!("[{} items]", arr.len()),
                Value::Object(obj) => format!("{{...}} ({} keys)", obj.len()),
                other => other.to_string(),
            };
            if s.chars().count() > 50 {
                format!("{}...", s.chars().take(47).collect::<String>())
            } else {
                s
            }
        }
    }
}
