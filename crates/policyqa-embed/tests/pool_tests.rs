use candle_core::{Device, Tensor};
use policyqa_embed::masked_mean_l2;

#[test]
fn padding_tokens_are_ignored() {
    let dev = Device::Cpu;
    // second token is padding and must not move the mean
    let h = Tensor::from_slice(&[1.0f32, 2.0, 2.0, 4.0, 100.0, -100.0, 50.0, 9.0], (1, 2, 4), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0u32], (1, 2), &dev).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    let expected = [0.2f32, 0.4, 0.4, 0.8];
    for (a, b) in out[0].iter().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
}

#[test]
fn all_tokens_unmasked_averages_then_normalizes() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[3.0f32, 0.0, 0.0, 4.0], (1, 2, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 1u32], (1, 2), &dev).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    // mean [1.5, 2.0], norm 2.5
    assert!((out[0][0] - 0.6).abs() < 1e-5);
    assert!((out[0][1] - 0.8).abs() < 1e-5);
}

#[test]
fn rejects_two_dimensional_input() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[1.0f32, 2.0], (1, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32], (1, 1), &dev).unwrap();
    assert!(masked_mean_l2(&h, &mask).is_err());
}
