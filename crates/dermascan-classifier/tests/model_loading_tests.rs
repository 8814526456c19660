//! Checkpoint loading tests
//!
//! Builds a small MobileNetV2 with random weights, saves its state dict the
//! way an exporting program would (under a `model.` prefix), and loads it
//! back through a schema file.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use dermascan_classifier::{
    CandleModelLoader, HeadConfig, ImageClassifier, MobileNetV2, ModelLoader, ModelProvider,
    ModelStatus, PredictionEngine,
};
use dermascan_core::{Error, LabelCatalog};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const INPUT_SIZE: usize = 64;

fn write_checkpoint(dir: &Path) -> MobileNetV2 {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = MobileNetV2::new("source", vb.pp("model"), 7, 0.25, &HeadConfig::default(), INPUT_SIZE)
        .unwrap();
    varmap.save(dir.join("weights.safetensors")).unwrap();
    model
}

fn write_schema(dir: &Path, extra: &str) -> std::path::PathBuf {
    let schema = format!(
        r#"
version: "1"
name: "tiny-lesion"
architecture:
  type: mobilenet-v2
  num_classes: 7
  width_mult: 0.25
{extra}
input:
  size: {INPUT_SIZE}
checkpoint:
  source:
    type: local
    path: "weights.safetensors"
"#
    );
    let path = dir.join("model.yaml");
    std::fs::write(&path, schema).unwrap();
    path
}

fn sample_input() -> Tensor {
    Tensor::rand(0f32, 1f32, (1, 3, INPUT_SIZE, INPUT_SIZE), &Device::Cpu).unwrap()
}

#[tokio::test]
async fn test_load_prefixed_safetensors() {
    let dir = TempDir::new().unwrap();
    let original = write_checkpoint(dir.path());
    let loader = CandleModelLoader::from_schema_file(write_schema(dir.path(), "")).unwrap();

    let loaded = loader.load().await.unwrap();
    assert_eq!(loaded.name(), "tiny-lesion");
    assert_eq!(loaded.output_width(), 7);
    assert_eq!(loaded.input_size(), INPUT_SIZE);

    let input = sample_input();
    let expected: Vec<f32> = original.forward(&input).unwrap().flatten_all().unwrap().to_vec1().unwrap();
    let actual: Vec<f32> = loaded.forward(&input).unwrap().flatten_all().unwrap().to_vec1().unwrap();

    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!((a - e).abs() < 1e-4, "loaded output {} differs from {}", a, e);
    }
}

#[tokio::test]
async fn test_loaded_model_ranks_all_classes() {
    let dir = TempDir::new().unwrap();
    write_checkpoint(dir.path());
    let loader = CandleModelLoader::from_schema_file(write_schema(dir.path(), "")).unwrap();
    let model = loader.load().await.unwrap();

    let engine = PredictionEngine::for_model(LabelCatalog::ham10000(), model.as_ref(), 7).unwrap();
    let results = engine.predict(&sample_input(), model.as_ref()).unwrap();

    assert_eq!(results.ranked.len(), 7);
    let total: f32 = results.ranked.iter().map(|r| r.confidence).sum();
    assert!((total - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_head_mismatch_fails_to_load() {
    let dir = TempDir::new().unwrap();
    write_checkpoint(dir.path());
    let schema = write_schema(dir.path(), "  head:\n    hidden: [64]");
    let loader = CandleModelLoader::from_schema_file(schema).unwrap();

    let err = loader.load().await.err().unwrap();
    assert!(matches!(err, Error::ModelLoad(_)));
}

#[tokio::test]
async fn test_wrong_prefix_fails_to_load() {
    let dir = TempDir::new().unwrap();
    write_checkpoint(dir.path());
    let schema = write_schema(dir.path(), "");
    let yaml = std::fs::read_to_string(&schema).unwrap() + "  prefix: \"net.\"\n";
    std::fs::write(&schema, yaml).unwrap();

    let loader = CandleModelLoader::from_schema_file(schema).unwrap();
    assert!(loader.load().await.is_err());
}

#[tokio::test]
async fn test_missing_checkpoint_degrades_provider() {
    let dir = TempDir::new().unwrap();
    let loader = CandleModelLoader::from_schema_file(write_schema(dir.path(), "")).unwrap();
    assert!(loader.describe().contains("weights.safetensors"));

    let provider = ModelProvider::new(Arc::new(loader));
    match provider.preload().await {
        ModelStatus::Degraded(message) => assert!(message.contains("checkpoint not found")),
        other => panic!("Expected degraded status, got {:?}", other),
    }
}
