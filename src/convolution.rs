//! Same-size 1D convolution over the rows or columns of a 2D array.
//!
//! Kernels are applied centred on the output sample: tap `k` of a kernel of length `n` reads
//! the input at offset `k - (n - 1) / 2`. Reads that fall outside the array are clamped to the
//! nearest edge sample, so the output always has the dimensions of the input.

use ndarray::{Array2, ArrayView2, Axis};

/// Slides `kernel` along `axis` of `input` and returns a freshly allocated result.
///
/// `Axis(0)` runs the kernel down each column (vertical pass), `Axis(1)` along each row
/// (horizontal pass).
pub fn convolve(input: ArrayView2<f64>, kernel: &[f64], axis: Axis) -> Array2<f64> {
    let mut output = Array2::zeros(input.raw_dim());
    convolve_into(input, kernel, axis, &mut output);
    output
}

/// Like [`convolve`], but writes into `output`, which is reallocated if its shape differs from
/// the input's.
///
/// An empty input or an empty kernel copies the input unchanged. `axis` must be `Axis(0)` or
/// `Axis(1)`.
pub fn convolve_into(
    input: ArrayView2<f64>,
    kernel: &[f64],
    axis: Axis,
    output: &mut Array2<f64>,
) {
    debug_assert!(axis.index() < 2, "2D arrays only have axes 0 and 1");
    if output.dim() != input.dim() {
        *output = Array2::zeros(input.raw_dim());
    }
    if input.is_empty() || kernel.is_empty() {
        output.assign(&input);
        return;
    }

    let half = (kernel.len() - 1) / 2;
    let last = input.len_of(axis) - 1;
    input
        .lanes(axis)
        .into_iter()
        .zip(output.lanes_mut(axis))
        .for_each(|(src, mut dst)| {
            dst.iter_mut().enumerate().for_each(|(i, out)| {
                *out = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, tap)| src[(i + k).saturating_sub(half).min(last)] * tap)
                    .sum();
            });
        });
}

#[test]
fn identity_kernel_copies_input() {
    let input = Array2::from_shape_fn((4, 5), |(r, c)| (r * 5 + c) as f64);
    let out = convolve(input.view(), &[0., 1., 0.], Axis(0));
    assert_eq!(out, input);
    let out = convolve(input.view(), &[0., 1., 0.], Axis(1));
    assert_eq!(out, input);
}

#[test]
fn central_difference_on_ramp() {
    // value = 3 * col, derivative along columns is 3 in the interior
    let input = Array2::from_shape_fn((3, 6), |(_, c)| 3. * c as f64);
    let out = convolve(input.view(), &[-0.5, 0., 0.5], Axis(1));
    for r in 0..3 {
        for c in 1..5 {
            assert!((out[(r, c)] - 3.).abs() < 1e-12, "({r},{c}) = {}", out[(r, c)]);
        }
        // clamped borders only see one neighbour
        assert!((out[(r, 0)] - 1.5).abs() < 1e-12);
        assert!((out[(r, 5)] - 1.5).abs() < 1e-12);
    }
    // no variation down the columns
    let out = convolve(input.view(), &[-0.5, 0., 0.5], Axis(0));
    assert!(out.iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn clamped_border_preserves_constant() {
    let input = Array2::from_elem((5, 7), 42.);
    let kernel = [0.1, 0.2, 0.4, 0.2, 0.1];
    for axis in [Axis(0), Axis(1)] {
        let out = convolve(input.view(), &kernel, axis);
        assert!(out.iter().all(|v| (v - 42.).abs() < 1e-9));
    }
}

#[test]
fn output_is_reshaped_to_input() {
    let input = Array2::from_elem((3, 4), 1.);
    let mut output = Array2::zeros((1, 1));
    convolve_into(input.view(), &[1.], Axis(1), &mut output);
    assert_eq!(output.dim(), (3, 4));
    assert_eq!(output, input);
}

#[test]
fn empty_kernel_copies_input() {
    let input = Array2::from_shape_fn((2, 2), |(r, c)| (r + c) as f64);
    assert_eq!(convolve(input.view(), &[], Axis(0)), input);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic]
fn only_two_axes() {
    let input = Array2::from_elem((2, 2), 1.);
    let _ = convolve(input.view(), &[1.], Axis(2));
}
