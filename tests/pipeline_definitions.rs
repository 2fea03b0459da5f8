//! Loading the shipped pipeline definitions.

use std::path::PathBuf;

use claimcheck::adapters::RunCredentials;
use claimcheck::core::{validate_pipelines, PipelineDefinition, ValidationError};
use claimcheck::domain::{PipelineId, ResultSchema};
use serde_json::json;
use tempfile::TempDir;

fn shipped_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("pipelines")
}

#[test]
fn test_shipped_pipelines_load() {
    let definitions = PipelineDefinition::load_dir(&shipped_dir()).unwrap();

    let ids: Vec<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["evidence", "integrity"]);

    let evidence = &definitions[0];
    assert_eq!(evidence.schema, ResultSchema::Evidence);
    assert_eq!(evidence.result_key, "evidence_dossier");
    assert_eq!(
        evidence.stage("executor").unwrap().render(&json!({"search_results": [1, 2, 3, 4]})),
        "Executor found 4 sources."
    );

    let integrity = &definitions[1];
    assert_eq!(integrity.schema, ResultSchema::Integrity);
    assert_eq!(integrity.initial_state("hello")["raw_input"], "hello");
    assert!(integrity.stages.iter().all(|s| s.surface.is_none()));
}

#[test]
fn test_shipped_pipelines_need_generation_key() {
    let definitions = PipelineDefinition::load_dir(&shipped_dir()).unwrap();

    let err = validate_pipelines(&definitions, &RunCredentials::default()).unwrap_err();
    assert_eq!(
        err,
        ValidationError::MissingCredential {
            pipeline: PipelineId::new("evidence"),
            credential: "generation".to_string(),
        }
    );

    // Search is optional for the evidence pipeline.
    let credentials = RunCredentials {
        generation_key: Some("g-key".to_string()),
        search_key: None,
    };
    assert!(validate_pipelines(&definitions, &credentials).is_ok());
}

#[test]
fn test_load_dir_skips_other_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("zeta.yml"),
        "id: zeta\nresult_key: out\nstages:\n  - name: one\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("alpha.yaml"), "id: alpha\nresult_key: out\n").unwrap();
    std::fs::write(dir.path().join("README.md"), "# not a pipeline").unwrap();

    let definitions = PipelineDefinition::load_dir(dir.path()).unwrap();
    let ids: Vec<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "zeta"]);
    assert_eq!(definitions[0].schema, ResultSchema::Open);
}

#[test]
fn test_load_dir_rejects_duplicate_stage() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("bad.yaml"),
        "id: bad\nresult_key: out\nstages:\n  - name: one\n  - name: one\n",
    )
    .unwrap();

    let err = PipelineDefinition::load_dir(dir.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("more than once"));
}
