use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;

use crate::tensor::Mat;

/// Standard deviation used for Q-network weights.
pub const DEFAULT_WEIGHT_STD: f64 = 0.01;

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    /// Normal distribution with custom mean and std
    Normal { mean: f64, std: f64 },

    /// All zeros
    Zeros,
}

impl WeightInit {
    /// Zero-mean Gaussian with the small default spread.
    pub fn small_normal() -> Self {
        WeightInit::Normal {
            mean: 0.0,
            std: DEFAULT_WEIGHT_STD,
        }
    }

    /// Build a `rows x cols` tensor, drawing every element independently.
    ///
    /// Panics if `std` is negative or not finite.
    pub fn initialize<R: Rng + ?Sized>(&self, rows: usize, cols: usize, rng: &mut R) -> Mat {
        let value = match *self {
            WeightInit::Normal { mean, std } => {
                let dist = Normal::new(mean, std)
                    .unwrap_or_else(|e| panic!("invalid normal init (mean {}, std {}): {}", mean, std, e));
                Array2::random_using((rows, cols), dist, rng)
            }
            WeightInit::Zeros => Array2::zeros((rows, cols)),
        };
        Mat::from_array(value)
    }
}
