//! Dense 2-D tensor carrying its own gradient accumulator.

use ndarray::{Array2, ArrayView2, Zip};

/// A dense row-major matrix with a same-shaped gradient buffer.
///
/// Gradients are only ever added into `grad`; `apply_gradient_step` consumes
/// them and leaves the buffer zeroed for the next update.
#[derive(Clone, Debug, PartialEq)]
pub struct Mat {
    value: Array2<f64>,
    grad: Array2<f64>,
}

impl Mat {
    /// Zero-filled `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Mat {
            value: Array2::zeros((rows, cols)),
            grad: Array2::zeros((rows, cols)),
        }
    }

    /// Adopt a flat row-major buffer. Panics if `values.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, values: Vec<f64>) -> Self {
        let value = Array2::from_shape_vec((rows, cols), values)
            .unwrap_or_else(|e| panic!("Mat::from_vec: buffer does not fit {}x{}: {}", rows, cols, e));
        Self::from_array(value)
    }

    /// Wrap an existing array, allocating a fresh zero gradient.
    pub fn from_array(value: Array2<f64>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Mat { value, grad }
    }

    pub fn rows(&self) -> usize {
        self.value.nrows()
    }

    pub fn cols(&self) -> usize {
        self.value.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.value.dim()
    }

    pub fn value(&self) -> &Array2<f64> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Array2<f64> {
        &mut self.value
    }

    pub fn grad(&self) -> &Array2<f64> {
        &self.grad
    }

    /// Add `grad` into the accumulator. Shapes must match exactly.
    pub fn accumulate_grad(&mut self, grad: ArrayView2<f64>) {
        assert_eq!(
            self.grad.dim(),
            grad.dim(),
            "accumulate_grad: gradient shape does not match tensor"
        );
        self.grad += &grad;
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Plain SGD: `value -= rate * grad`, then reset the gradient to zero.
    pub fn apply_gradient_step(&mut self, rate: f64) {
        Zip::from(&mut self.value)
            .and(&self.grad)
            .for_each(|w, &dw| *w -= rate * dw);
        self.zero_grad();
    }

    /// Row-major copy of the values.
    pub fn to_vec(&self) -> Vec<f64> {
        self.value.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_zeros_shapes_match() {
        let m = Mat::zeros(3, 2);
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.value().len(), 6);
        assert_eq!(m.grad().len(), 6);
        assert!(m.value().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_from_vec_is_row_major() {
        let m = Mat::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.value()[[0, 2]], 3.0);
        assert_eq!(m.value()[[1, 0]], 4.0);
        assert_eq!(m.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(m.grad().iter().all(|&g| g == 0.0));
    }

    #[test]
    #[should_panic]
    fn test_from_vec_wrong_length_panics() {
        let _ = Mat::from_vec(2, 2, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_gradient_step_updates_and_resets() {
        let mut m = Mat::from_vec(1, 2, vec![1.0, -1.0]);
        m.accumulate_grad(array![[2.0, 4.0]].view());
        m.accumulate_grad(array![[1.0, 0.0]].view());
        assert_eq!(m.grad(), &array![[3.0, 4.0]]);

        m.apply_gradient_step(0.5);
        assert_eq!(m.value(), &array![[-0.5, -3.0]]);
        assert!(m.grad().iter().all(|&g| g == 0.0));
    }

    #[test]
    #[should_panic]
    fn test_accumulate_wrong_shape_panics() {
        let mut m = Mat::zeros(2, 2);
        m.accumulate_grad(array![[1.0, 2.0]].view());
    }
}
