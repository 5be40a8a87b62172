//! End-to-end transfers over safetensors files on disk.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use ctrlxfer_merge::{
    load_checkpoint, run_transfer, CheckpointSaver, MergeError, ParameterStore, SafetensorsSaver,
    TransferBuilder, TransferConfig,
};

fn t(values: &[f32]) -> Tensor {
    Tensor::new(values, &Device::Cpu).unwrap()
}

fn write(dir: &Path, name: &str, entries: Vec<(&str, Tensor)>) -> PathBuf {
    let path = dir.join(name);
    let store: ParameterStore = entries.into_iter().collect();
    SafetensorsSaver::new().save(&store, &path).unwrap();
    path
}

struct Fixture {
    _dir: tempfile::TempDir,
    base: PathBuf,
    control: PathBuf,
    donor: PathBuf,
    output: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let base = write(
        dir.path(),
        "base.safetensors",
        vec![
            ("first_stage_model.decoder.w", t(&[0.0, 0.0])),
            ("model.diffusion_model.input_blocks.0.0.weight", t(&[1.0, 2.0, 3.0])),
            ("model.diffusion_model.time_embed.0.bias", t(&[0.5])),
        ],
    );
    let control = write(
        dir.path(),
        "control.safetensors",
        vec![
            ("first_stage_model.decoder.w", t(&[0.0, 0.0])),
            ("cond_stage_model.transformer.w", t(&[1.0])),
            ("control_model.input_blocks.0.0.weight", t(&[10.0, 10.0, 10.0])),
            ("control_model.time_embed.0.bias", t(&[4.0])),
            ("control_model.input_hint_block.0.weight", t(&[7.0, 7.0])),
        ],
    );
    let donor = write(
        dir.path(),
        "donor.safetensors",
        vec![
            ("first_stage_model.decoder.w", t(&[3.0, 4.0])),
            ("cond_stage_model.transformer.w", t(&[2.0])),
            ("model.diffusion_model.input_blocks.0.0.weight", t(&[2.0, 2.0, 2.0])),
            ("model.diffusion_model.time_embed.0.bias", t(&[0.5])),
        ],
    );
    let output = dir.path().join("control_donor.safetensors");
    Fixture {
        _dir: dir,
        base,
        control,
        donor,
        output,
    }
}

fn values(store: &ParameterStore, key: &str) -> Vec<f32> {
    store
        .get(key)
        .unwrap()
        .to_dtype(DType::F32)
        .unwrap()
        .to_vec1::<f32>()
        .unwrap()
}

#[test]
fn test_end_to_end_transfer() {
    let f = fixture();
    let summary = TransferBuilder::new()
        .base_model(&f.base)
        .control_model(&f.control)
        .donor_model(&f.donor)
        .output(&f.output)
        .run()
        .unwrap();

    assert_eq!(summary.output_path.as_deref(), Some(f.output.as_path()));
    assert_eq!(summary.report.substituted, 2);
    assert_eq!(summary.report.offset, 2);
    assert_eq!(summary.report.passed_through, 1);

    let out = load_checkpoint(&f.output).unwrap();
    let control = load_checkpoint(&f.control).unwrap();

    let mut out_keys = out.names().to_vec();
    let mut control_keys = control.names().to_vec();
    out_keys.sort();
    control_keys.sort();
    assert_eq!(out_keys, control_keys);

    assert_eq!(values(&out, "first_stage_model.decoder.w"), vec![3.0, 4.0]);
    assert_eq!(values(&out, "cond_stage_model.transformer.w"), vec![2.0]);
    assert_eq!(
        values(&out, "control_model.input_blocks.0.0.weight"),
        vec![11.0, 10.0, 9.0]
    );
    assert_eq!(values(&out, "control_model.time_embed.0.bias"), vec![4.0]);
    assert_eq!(
        values(&out, "control_model.input_hint_block.0.weight"),
        vec![7.0, 7.0]
    );
}

#[test]
fn test_donor_equal_to_base_keeps_adapter() {
    let f = fixture();
    let config = TransferConfig::new(&f.base, &f.control, &f.base, &f.output);
    // The base lacks the text encoder, so substitution fails; drop it first.
    let control = load_checkpoint(&f.control).unwrap();
    let trimmed: ParameterStore = control
        .iter()
        .filter(|(name, _)| !name.starts_with("cond_stage_model"))
        .map(|(name, tensor)| (name.to_string(), tensor.clone()))
        .collect();
    SafetensorsSaver::new().save(&trimmed, &f.control).unwrap();

    run_transfer(&config).unwrap();
    let out = load_checkpoint(&f.output).unwrap();
    for (name, tensor) in trimmed.iter() {
        if name.starts_with("first_stage_model") {
            continue;
        }
        assert_eq!(
            values(&out, name),
            tensor.to_vec1::<f32>().unwrap(),
            "offset did not collapse for {name}"
        );
    }
}

#[test]
fn test_dry_run_writes_nothing() {
    let f = fixture();
    let mut config = TransferConfig::new(&f.base, &f.control, &f.donor, &f.output);
    config.dry_run = true;

    let summary = run_transfer(&config).unwrap();
    assert!(summary.output_path.is_none());
    assert_eq!(summary.report.total(), 5);
    assert!(!f.output.exists());
}

#[test]
fn test_missing_base_path_fails_before_loading() {
    let f = fixture();
    let missing = f.base.with_file_name("v1-5-pruned.ckpt");
    let config = TransferConfig::new(&missing, &f.control, &f.donor, &f.output);

    let err = run_transfer(&config).unwrap_err();
    assert!(matches!(err, MergeError::Precondition { what: "Base model", .. }));
    assert!(err.to_string().contains("v1-5-pruned.ckpt"));
    assert!(!f.output.exists());
}

#[test]
fn test_missing_donor_substitution_produces_no_output() {
    let f = fixture();
    let donor = write(
        f.donor.parent().unwrap(),
        "partial_donor.safetensors",
        vec![("cond_stage_model.transformer.w", t(&[2.0]))],
    );
    let config = TransferConfig::new(&f.base, &f.control, &donor, &f.output);

    let err = run_transfer(&config).unwrap_err();
    assert!(matches!(
        err,
        MergeError::MissingTensor { ref name, store: "donor" } if name == "first_stage_model.decoder.w"
    ));
    assert!(!f.output.exists());
}

#[test]
fn test_shape_mismatch_reports_key() {
    let f = fixture();
    let donor = write(
        f.donor.parent().unwrap(),
        "wide_donor.safetensors",
        vec![
            ("first_stage_model.decoder.w", t(&[3.0, 4.0])),
            ("cond_stage_model.transformer.w", t(&[2.0])),
            ("model.diffusion_model.input_blocks.0.0.weight", t(&[2.0, 2.0])),
        ],
    );
    let config = TransferConfig::new(&f.base, &f.control, &donor, &f.output);

    let err = run_transfer(&config).unwrap_err();
    assert!(err
        .to_string()
        .contains("control_model.input_blocks.0.0.weight"));
}

#[test]
fn test_pickle_base_with_half_precision_donor() {
    let dir = tempfile::tempdir().unwrap();
    let base = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("wrapped.ckpt");
    let control = write(
        dir.path(),
        "control.safetensors",
        vec![("control_model.w", t(&[10.0, 10.0, 10.0]))],
    );
    let donor = write(
        dir.path(),
        "donor.safetensors",
        vec![(
            "model.diffusion_model.w",
            t(&[2.0, 2.0, 2.0]).to_dtype(DType::F16).unwrap(),
        )],
    );
    let output = dir.path().join("out.safetensors");

    let summary = run_transfer(&TransferConfig::new(&base, &control, &donor, &output)).unwrap();
    assert_eq!(summary.report.offset, 1);

    let out = load_checkpoint(&output).unwrap();
    let merged = out.get("control_model.w").unwrap();
    assert_eq!(merged.dtype(), DType::F32);
    assert_eq!(merged.to_vec1::<f32>().unwrap(), vec![11.0, 10.0, 9.0]);
}
