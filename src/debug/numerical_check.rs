use ndarray::ArrayView2;

use crate::network::QWeights;

/// Types of numerical issues
#[derive(Debug, Clone, PartialEq)]
pub enum NumericalIssue {
    NaN { tensor: &'static str, count: usize },
    Infinity { tensor: &'static str, count: usize },
}

/// Count NaN and infinite values in one array.
pub fn check_array(tensor: &'static str, values: ArrayView2<f64>) -> Vec<NumericalIssue> {
    let mut issues = Vec::new();
    let nan_count = values.iter().filter(|v| v.is_nan()).count();
    let inf_count = values.iter().filter(|v| v.is_infinite()).count();

    if nan_count > 0 {
        log::warn!("{}: found {} NaN values", tensor, nan_count);
        issues.push(NumericalIssue::NaN { tensor, count: nan_count });
    }
    if inf_count > 0 {
        log::warn!("{}: found {} infinite values", tensor, inf_count);
        issues.push(NumericalIssue::Infinity { tensor, count: inf_count });
    }
    issues
}

/// Check all four Q-network tensors.
pub fn check_tensors(weights: &QWeights) -> Vec<NumericalIssue> {
    ["W1", "B1", "W2", "B2"]
        .iter()
        .zip(weights.tensors())
        .flat_map(|(&name, mat)| check_array(name, mat.value().view()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_clean_weights_have_no_issues() {
        let weights = QWeights::new(3, 2, 4, &mut StdRng::seed_from_u64(0));
        assert!(check_tensors(&weights).is_empty());
    }

    #[test]
    fn test_detects_nan_and_inf() {
        let mut weights = QWeights::new(3, 2, 4, &mut StdRng::seed_from_u64(0));
        weights.w2.value_mut()[[0, 0]] = f64::NAN;
        weights.b1.value_mut()[[1, 0]] = f64::INFINITY;
        weights.b1.value_mut()[[2, 0]] = f64::NEG_INFINITY;
        let issues = check_tensors(&weights);
        assert!(issues.contains(&NumericalIssue::NaN { tensor: "W2", count: 1 }));
        assert!(issues.contains(&NumericalIssue::Infinity { tensor: "B1", count: 2 }));
    }
}
