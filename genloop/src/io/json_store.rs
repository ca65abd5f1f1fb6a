//! JSON load/save helpers with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::bundle::validate_bundle;
use crate::core::types::CodeBundle;

pub const CODE_BUNDLE_SCHEMA: &str = include_str!("../../schemas/code_bundle.schema.json");
pub const CONTAINER_ARTIFACTS_SCHEMA: &str =
    include_str!("../../schemas/container_artifacts.schema.json");
pub const DOCUMENTATION_SCHEMA: &str = include_str!("../../schemas/documentation.schema.json");

/// Read `path`, validate it against `schema`, and deserialize it as `T`.
pub fn load_validated<T: DeserializeOwned>(schema: &str, path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    validate_against(schema, &value).with_context(|| format!("validate {}", path.display()))?;
    let parsed = serde_json::from_value(value)
        .with_context(|| format!("deserialize {}", path.display()))?;
    Ok(parsed)
}

/// Load a code bundle and check both schema and bundle invariants.
pub fn load_bundle(path: &Path) -> Result<CodeBundle> {
    let bundle: CodeBundle = load_validated(CODE_BUNDLE_SCHEMA, path)?;
    let errors = validate_bundle(&bundle);
    if !errors.is_empty() {
        return Err(anyhow!(
            "bundle invariants failed:\n- {}",
            errors.join("\n- ")
        ));
    }
    Ok(bundle)
}

/// Validate a JSON instance against a JSON Schema document.
pub fn validate_against(schema: &str, instance: &Value) -> Result<()> {
    let schema_value: Value = serde_json::from_str(schema).context("parse json schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(instance) {
        let messages = compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContainerArtifacts, Documentation};
    use crate::test_support::{bundle_with, unit};
    use serde_json::json;

    #[test]
    fn bundle_round_trips_through_schema() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bundle.json");
        let bundle = bundle_with(vec![unit("main.py", true), unit("util.py", false)]);
        write_json(&path, &bundle).expect("write");
        assert_eq!(load_bundle(&path).expect("load"), bundle);
    }

    #[test]
    fn bundle_with_two_entry_points_fails_invariants() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bundle.json");
        write_json(&path, &bundle_with(vec![unit("a.py", true), unit("b.py", true)]))
            .expect("write");
        let err = load_bundle(&path).expect_err("invalid");
        assert!(err.to_string().contains("exactly one is required"));
    }

    #[test]
    fn schema_rejects_missing_fields() {
        let err = validate_against(CODE_BUNDLE_SCHEMA, &json!({"description": "x"}))
            .expect_err("invalid");
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn container_output_without_project_name_deserializes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("output.json");
        write_json(
            &path,
            &json!({
                "description": "python image",
                "dockerfile": "FROM python:3.12-slim",
                "compose": "services: {}",
                "folder_watching": "bind mount ./src"
            }),
        )
        .expect("write");
        let artifacts: ContainerArtifacts =
            load_validated(CONTAINER_ARTIFACTS_SCHEMA, &path).expect("load");
        assert_eq!(artifacts.project_name, "");
        assert_eq!(artifacts.dockerfile, "FROM python:3.12-slim");
    }

    #[test]
    fn documentation_schema_requires_both_documents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("docs.json");
        write_json(&path, &json!({"readme": "# App"})).expect("write");
        assert!(load_validated::<Documentation>(DOCUMENTATION_SCHEMA, &path).is_err());
    }
}
