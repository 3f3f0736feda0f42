use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn scigraph(dir: &Path) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("scigraph").into();
    cmd.current_dir(dir);
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("SCIGRAPH_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd
}

/// A corpus directory with two documents and an output directory next to it.
fn corpus() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("papers");
    fs::create_dir(&input).unwrap();
    fs::write(
        input.join("roberta.txt"),
        "RoBERTa is based on BERT. RoBERTa was trained on BookCorpus.",
    )
    .unwrap();
    fs::write(input.join("gpt4.txt"), "GPT-4 was evaluated on MMLU.").unwrap();
    let out = tmp.path().join("out");
    (tmp, input, out)
}

fn extract(dir: &Path, input: &Path, out: &Path) {
    scigraph(dir)
        .arg("extract")
        .arg(input)
        .arg("--out")
        .arg(out)
        .assert()
        .success();
}

// --- Binary startup ---

#[test]
fn binary_runs() {
    let mut cmd: Command = cargo_bin_cmd!("scigraph").into();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("scigraph"));
}

// --- Extract ---

#[test]
fn extract_writes_per_document_artifacts() {
    let (tmp, input, out) = corpus();
    extract(tmp.path(), &input, &out);

    for doc in ["roberta", "gpt4"] {
        for file in ["entities.json", "relationships.json", "knowledge_graph.json"] {
            assert!(out.join(doc).join(file).exists(), "{doc}/{file} missing");
        }
    }
    assert!(out.join("extraction_statistics.json").exists());
    assert!(out.join("checkpoint.json").exists());

    let relationships = fs::read_to_string(out.join("gpt4").join("relationships.json")).unwrap();
    assert!(relationships.contains("EVALUATED_ON"));
}

#[test]
fn extract_single_file() {
    let (tmp, input, out) = corpus();
    extract(tmp.path(), &input.join("gpt4.txt"), &out);
    assert!(out.join("gpt4").join("knowledge_graph.json").exists());
    assert!(!out.join("roberta").exists());
}

#[test]
fn extract_resume_skips_finished_documents() {
    let (tmp, input, out) = corpus();
    extract(tmp.path(), &input, &out);

    scigraph(tmp.path())
        .arg("extract")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .arg("--resume")
        .assert()
        .success()
        .stderr(predicate::str::contains("2 skipped"));
}

#[test]
fn extract_uses_entity_sidecar() {
    let (tmp, input, out) = corpus();
    fs::write(
        input.join("gpt4.entities.json"),
        r#"[
            {"id": "E1", "text": "GPT-4", "type": "MODEL", "confidence": 0.95, "start": 0, "end": 5},
            {"id": "E2", "text": "MMLU", "type": "BENCHMARK", "confidence": 0.9, "start": 23, "end": 27}
        ]"#,
    )
    .unwrap();
    extract(tmp.path(), &input, &out);

    let entities = fs::read_to_string(out.join("gpt4").join("entities.json")).unwrap();
    assert!(entities.contains("\"E1\""));
    let relationships = fs::read_to_string(out.join("gpt4").join("relationships.json")).unwrap();
    assert!(relationships.contains("\"source_id\": \"E1\""));
}

#[test]
fn extract_rejects_invalid_min_confidence() {
    let (tmp, input, out) = corpus();
    scigraph(tmp.path())
        .arg("extract")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .args(["--min-confidence", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_relationship_confidence"));
}

#[test]
fn extract_missing_input_fails() {
    let tmp = TempDir::new().unwrap();
    scigraph(tmp.path())
        .args(["extract", "nowhere", "--out", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

// --- Graph queries ---

#[test]
fn path_between_entities() {
    let (tmp, input, out) = corpus();
    extract(tmp.path(), &input, &out);

    scigraph(tmp.path())
        .arg("path")
        .arg(out.join("roberta").join("knowledge_graph.json"))
        .args(["RoBERTa", "BookCorpus"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RoBERTa (MODEL) -> BookCorpus (DATASET)"));
}

#[test]
fn path_unknown_node_fails() {
    let (tmp, input, out) = corpus();
    extract(tmp.path(), &input, &out);

    scigraph(tmp.path())
        .arg("path")
        .arg(out.join("gpt4").join("knowledge_graph.json"))
        .args(["GPT-4", "ImageNet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no node matches 'ImageNet'"));
}

#[test]
fn cycles_on_acyclic_graph() {
    let (tmp, input, out) = corpus();
    extract(tmp.path(), &input, &out);

    scigraph(tmp.path())
        .arg("cycles")
        .arg(out.join("gpt4").join("knowledge_graph.json"))
        .assert()
        .success()
        .stderr(predicate::str::contains("No cycles"));
}

#[test]
fn stats_prints_json() {
    let (tmp, input, out) = corpus();
    extract(tmp.path(), &input, &out);

    scigraph(tmp.path())
        .arg("stats")
        .arg(out.join("gpt4").join("knowledge_graph.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"node_count\": 2"))
        .stdout(predicate::str::contains("\"document_id\": \"gpt4\""));
}

// --- Config ---

#[test]
fn config_prints_defaults() {
    let tmp = TempDir::new().unwrap();
    scigraph(tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path())
        .env("HOME", tmp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_distance\": 100"))
        .stdout(predicate::str::contains("\"low_confidence_threshold\": 0.7"));
}

#[test]
fn config_reads_explicit_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("custom.json");
    fs::write(&path, r#"{"pairing": {"context_window": 12}}"#).unwrap();

    scigraph(tmp.path())
        .arg("config")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"context_window\": 12"));
}

#[test]
fn config_from_environment() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("env.json");
    fs::write(&path, r#"{"pairing": {"max_distance": 7}}"#).unwrap();

    scigraph(tmp.path())
        .env("SCIGRAPH_CONFIG", &path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_distance\": 7"));
}
