//! Resolution of a step's declared inputs into concrete data sources.

use tracing::debug;

use crate::error::{Error, Result};
use crate::request::DataSource;
use crate::workflow::{Step, StepOutputs};

/// Whether an input name refers to an externally supplied source.
///
/// External references carry a scheme (`s3://…`, `obj://…`); bare names
/// refer to prior step outputs.
fn is_external_ref(name: &str) -> bool {
    name.contains("://")
}

/// Resolve every declared input of `step`, in declaration order.
///
/// External references are looked up among `external` by id and passed
/// through unchanged. Bare names are looked up in `outputs` and wrapped
/// as internal sources, so downstream code cannot tell where a source
/// came from. The first name that resolves nowhere fails the whole step
/// with [`Error::DataSourceNotFound`].
pub fn resolve_data_sources(
    step: &Step,
    outputs: &StepOutputs,
    external: &[DataSource],
) -> Result<Vec<DataSource>> {
    let mut resolved = Vec::with_capacity(step.input.len());
    for name in &step.input {
        let source = if is_external_ref(name) {
            external
                .iter()
                .find(|source| source.id == *name)
                .cloned()
                .ok_or_else(|| Error::DataSourceNotFound { name: name.clone() })?
        } else {
            let output = outputs
                .get(name)
                .ok_or_else(|| Error::DataSourceNotFound { name: name.clone() })?;
            DataSource::internal(name, serde_json::to_value(output)?)
        };
        debug!(input = %name, source = %source.id, "resolved step input");
        resolved.push(source);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectedResults;
    use crate::workflow::StepOp;
    use serde_json::json;

    fn step_reading(input: &[&str]) -> Step {
        Step {
            status_message: None,
            input: input.iter().map(|s| s.to_string()).collect(),
            op: StepOp::Prompt("go".into()),
            output_to: "out".into(),
        }
    }

    fn one_output(name: &str) -> StepOutputs {
        let mut collected = CollectedResults::new();
        collected.insert("ctx-1".into(), json!("partial answer"));
        let mut outputs = StepOutputs::new();
        outputs.insert(name.into(), collected);
        outputs
    }

    #[test]
    fn test_external_references_resolve_by_id() {
        let external = vec![DataSource::new("s3://doc", json!("body"))];
        let resolved =
            resolve_data_sources(&step_reading(&["s3://doc"]), &StepOutputs::new(), &external)
                .unwrap();

        assert_eq!(resolved, external);
    }

    #[test]
    fn test_bare_names_resolve_from_outputs_as_internal_sources() {
        let outputs = one_output("summary");
        let resolved = resolve_data_sources(&step_reading(&["summary"]), &outputs, &[]).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, "obj://summary");
        assert_eq!(resolved[0].content, json!({"ctx-1": "partial answer"}));
    }

    #[test]
    fn test_resolution_preserves_declaration_order() {
        let external = vec![
            DataSource::new("s3://b", json!(2)),
            DataSource::new("s3://a", json!(1)),
        ];
        let outputs = one_output("mid");

        let resolved = resolve_data_sources(
            &step_reading(&["s3://a", "mid", "s3://b"]),
            &outputs,
            &external,
        )
        .unwrap();

        let ids: Vec<_> = resolved.iter().map(|source| source.id.as_str()).collect();
        assert_eq!(ids, vec!["s3://a", "obj://mid", "s3://b"]);
    }

    #[test]
    fn test_first_unresolved_input_wins() {
        let err = resolve_data_sources(
            &step_reading(&["s3://missing", "also-missing"]),
            &StepOutputs::new(),
            &[],
        )
        .unwrap_err();

        assert!(matches!(err, Error::DataSourceNotFound { ref name } if name == "s3://missing"));
    }

    #[test]
    fn test_unknown_bare_name_never_resolves_to_an_empty_source() {
        let err =
            resolve_data_sources(&step_reading(&["no-such-output"]), &StepOutputs::new(), &[])
                .unwrap_err();

        assert!(matches!(err, Error::DataSourceNotFound { ref name } if name == "no-such-output"));
    }
}
