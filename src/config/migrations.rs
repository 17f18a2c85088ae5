//! Schema migrations applied to the raw JSON record.

use super::model::CURRENT_VERSION;
use semver::{Version, VersionReq};
use serde_json::Value;

/// One schema upgrade step.
pub struct Migration {
    /// Requirement the record's version must satisfy for this step to run.
    pub from: &'static str,
    pub to: &'static str,
    pub description: &'static str,
    /// Whether the step discards information.
    pub destructive: bool,
    pub apply: fn(&mut Value) -> Result<(), String>,
}

impl Migration {
    pub fn applies_to(&self, version: &Version) -> bool {
        VersionReq::parse(self.from).is_ok_and(|req| req.matches(version))
    }
}

/// Every known migration, in application order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    from: "<1.0.0",
    to: CURRENT_VERSION,
    description: "stamp pre-release records with the 1.0.0 schema version",
    destructive: false,
    apply: stamp_version,
}];

fn stamp_version(value: &mut Value) -> Result<(), String> {
    let object = value
        .as_object_mut()
        .ok_or_else(|| "configuration root is not an object".to_string())?;
    object.insert(
        "version".to_string(),
        Value::String(CURRENT_VERSION.to_string()),
    );
    Ok(())
}

/// Read the `version` field of a raw record.
pub fn raw_version(value: &Value) -> Option<Version> {
    value
        .get("version")
        .and_then(Value::as_str)
        .and_then(|v| Version::parse(v).ok())
}

/// Whether a record at `version` is older than the current schema.
pub fn needs_migration(version: &Version) -> bool {
    Version::parse(CURRENT_VERSION).is_ok_and(|current| *version < current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_bump_applies_to_pre_release_records() {
        let migration = &MIGRATIONS[0];
        assert!(migration.applies_to(&Version::new(0, 9, 0)));
        assert!(!migration.applies_to(&Version::new(1, 0, 0)));

        let mut value = json!({ "version": "0.9.0", "trackedPaths": [] });
        (migration.apply)(&mut value).unwrap();
        assert_eq!(value["version"], "1.0.0");
        assert_eq!(value["trackedPaths"], json!([]));
    }

    #[test]
    fn version_bump_rejects_non_objects() {
        let mut value = json!(["not", "an", "object"]);
        assert!((MIGRATIONS[0].apply)(&mut value).is_err());
    }

    #[test]
    fn needs_migration_only_for_older_versions() {
        assert!(needs_migration(&Version::new(0, 1, 0)));
        assert!(!needs_migration(&Version::new(1, 0, 0)));
        assert!(!needs_migration(&Version::new(2, 0, 0)));
    }
}
