//! Integration tests driving the layer entry points from YAML hyperparameters.

use cuantizar::aqt::fake_quantize;
use cuantizar::config::ExecutionPath;
use cuantizar::operations::{einsum, layer_einsum};
use cuantizar::{AqtState, QuantizationHParams, TensorQuantizer};
use ndarray::{ArrayD, Dimension, IxDyn};

const AQT_YAML: &str = r#"
quantization_type: aqt
mode: training
weight_params:
  precision: 8
  channel_axis: 1
act_params:
  precision: 8
  calibration:
    strategy: moving_average
    momentum: 0.5
"#;

const PTQ_INT4_YAML: &str = r#"
quantization_type: ptq
mode: inference
weight_params:
  precision: 4
  channel_axis: 1
  min_clipping: 0.5
  num_optimize_clipping: 11
"#;

fn ramp(shape: &[usize], offset: f32) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(shape), |ix| {
        let flat: usize = ix.slice().iter().sum();
        ((flat as f32 + offset) * 0.37).sin()
    })
}

fn max_diff(a: &ArrayD<f32>, b: &ArrayD<f32>) -> f32 {
    a.iter().zip(b).fold(0.0, |m, (x, y)| m.max((x - y).abs()))
}

#[test]
fn test_aqt_layer_threads_activation_state() {
    let hparams = QuantizationHParams::from_yaml(AQT_YAML).unwrap();
    assert_eq!(hparams.execution_path(), ExecutionPath::Integer);

    let weight = ramp(&[16, 4], 0.0);
    let mut state = AqtState::new();
    for step in 1..=3 {
        let x = ramp(&[2, 16], step as f32);
        let out = layer_einsum("bd,dn->bn", x.view(), weight.view(), &hparams, &mut state).unwrap();
        let exact = einsum("bd,dn->bn", x.view(), weight.view()).unwrap();
        assert_eq!(out.shape(), &[2, 4]);
        assert!(max_diff(&out, &exact) < 0.1);
        assert_eq!(state.steps(), step);
    }
}

#[test]
fn test_ptq_int4_weight_only() {
    let hparams = QuantizationHParams::from_yaml(PTQ_INT4_YAML).unwrap();
    assert_eq!(hparams.execution_path(), ExecutionPath::WeightOnly);
    let weight_config = hparams.weight_config().unwrap();
    assert_eq!(weight_config.bits(), 4);
    assert!(weight_config.search_config().is_some());

    let x = ramp(&[3, 32], 1.0);
    let weight = ramp(&[32, 8], 2.0);
    let mut state = AqtState::new();
    let out = layer_einsum("bd,dn->bn", x.view(), weight.view(), &hparams, &mut state).unwrap();
    let exact = einsum("bd,dn->bn", x.view(), weight.view()).unwrap();
    assert!(max_diff(&out, &exact) < 2.0);
    assert_eq!(state.steps(), 0);
}

#[test]
fn test_training_fake_quant_path() {
    let yaml = "quantization_type: fq\nmode: training\nweight_params:\n  precision: 8\n";
    let hparams = QuantizationHParams::from_yaml(yaml).unwrap();
    assert_eq!(hparams.execution_path(), ExecutionPath::FakeQuant);

    let x = ramp(&[2, 8], 0.5);
    let weight = ramp(&[8, 3], 1.5);
    let out = layer_einsum("bd,dn->bn", x.view(), weight.view(), &hparams, &mut AqtState::new()).unwrap();

    let fq_weight = fake_quantize(weight.view(), &hparams.weight_config().unwrap(), &mut AqtState::new()).unwrap();
    assert_eq!(out, einsum("bd,dn->bn", x.view(), fq_weight.view()).unwrap());
}

#[test]
fn test_quantizers_from_hparams() {
    let hparams = QuantizationHParams::from_yaml(AQT_YAML).unwrap();
    let mut act = TensorQuantizer::for_activation("inputs", &hparams).unwrap();
    let weight = TensorQuantizer::for_weight("w", &hparams).unwrap();
    assert!(act.is_enabled());
    assert_eq!(weight.config().map(|c| c.bits()), Some(8));

    let x = ramp(&[4, 4], 0.0);
    let q = act.quantize(x.view()).unwrap();
    assert_eq!(q.shape(), &[4, 4]);
    assert_eq!(act.state().steps(), 1);
}
