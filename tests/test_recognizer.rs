//! Integration tests for recognizer construction and inference.

mod common;

use digitcam::error::ErrorStage;
use digitcam::{
    CanonicalImage, CanonicalImageConverter, CapturedImage, PipelineError, RecognizerConfig,
    RecognizerHandle,
};
use image::{GrayImage, Luma};

use common::*;

#[test]
fn test_classify_returns_single_digit_label() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let config = write_network(dir.path(), NetworkShape::Direct, 7);

    let recognizer = RecognizerHandle::construct(&config)?;
    let canonical = CanonicalImageConverter::default()
        .convert(CapturedImage::upright(paper_digit(80, 100)))?;
    let result = recognizer.classify(&canonical)?;

    assert_eq!(recognizer.input_size(), (28, 28));
    assert_eq!(recognizer.config(), &config);
    assert_eq!(result.label, "7");
    assert_eq!(result.label.chars().count(), 1);
    assert_eq!(result.digit, 7);
    assert_eq!(result.scores.len(), 10);
    assert!(result.confidence > 0.99);

    Ok(())
}

#[test]
fn test_hidden_layer_network() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let config = write_network(dir.path(), NetworkShape::Hidden(8), 2);

    let recognizer = RecognizerHandle::construct(&config)?;
    let result = recognizer.classify(&CanonicalImage::new(GrayImage::new(28, 28)))?;

    assert_eq!(result.label, "2");
    Ok(())
}

#[test]
fn test_handle_can_be_reused() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let config = write_network(dir.path(), NetworkShape::Direct, 4);
    let recognizer = RecognizerHandle::construct(&config)?;

    for value in [0u8, 128, 255] {
        let image = CanonicalImage::new(GrayImage::from_pixel(28, 28, Luma([value])));
        assert_eq!(recognizer.classify(&image)?.label, "4");
    }
    Ok(())
}

#[test]
fn test_dimension_mismatch_is_inference_error() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let config = write_network(dir.path(), NetworkShape::Direct, 1);
    let recognizer = RecognizerHandle::construct(&config)?;

    let err = recognizer
        .classify(&CanonicalImage::new(GrayImage::new(20, 20)))
        .unwrap_err();

    assert!(matches!(err, PipelineError::Inference(_)));
    assert_eq!(err.stage(), ErrorStage::Inference);
    Ok(())
}

#[test]
fn test_missing_resources_are_load_errors() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let valid = write_network(dir.path(), NetworkShape::Direct, 1);

    let missing_topology =
        RecognizerConfig::new(dir.path().join("nope.txt"), valid.weights.clone());
    let missing_weights = RecognizerConfig::new(valid.topology.clone(), dir.path().join("nope.bin"));

    for config in [missing_topology, missing_weights] {
        let err = RecognizerHandle::construct(&config).unwrap_err();
        assert!(matches!(err, PipelineError::ResourceLoad { .. }), "{err}");
        assert_eq!(err.stage(), ErrorStage::Loading);
    }
    Ok(())
}

#[test]
fn test_malformed_weights_are_load_errors() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let config = write_network(dir.path(), NetworkShape::Direct, 1);
    std::fs::write(&config.weights, b"DGTW garbage")?;

    let err = RecognizerHandle::construct(&config).unwrap_err();

    assert!(matches!(err, PipelineError::ResourceLoad { .. }), "{err}");
    Ok(())
}

#[test]
fn test_weights_must_match_topology() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let config = write_network(dir.path(), NetworkShape::Hidden(4), 1);
    std::fs::write(&config.topology, "layer:0:28x28\nlayer:1:10x1\n")?;

    let err = RecognizerHandle::construct(&config).unwrap_err();

    assert!(matches!(err, PipelineError::ResourceLoad { .. }), "{err}");
    Ok(())
}

#[test]
fn test_oversized_topology_is_load_error() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let config = write_network(dir.path(), NetworkShape::Direct, 1);
    std::fs::write(&config.topology, "layer:0:4294967295x4294967295\nlayer:1:10x1\n")?;

    let err = RecognizerHandle::construct(&config).unwrap_err();

    assert!(matches!(err, PipelineError::ResourceLoad { .. }), "{err}");
    assert!(err.to_string().contains("too large"), "{err}");
    Ok(())
}
