use ndarray::{Array2, ArrayView2};

use crate::graph::{Graph, NodeId};

/// Outcome of comparing backward-pass gradients against finite differences.
#[derive(Debug, Clone)]
pub struct GradientReport {
    /// Largest absolute difference over every input element
    pub max_abs_error: f64,
    /// `(input index, (row, col))` of that difference
    pub worst: Option<(usize, (usize, usize))>,
    pub analytic: Vec<Array2<f64>>,
    pub numerical: Vec<Array2<f64>>,
}

/// Check the gradients of `build` with respect to every element of `inputs`.
///
/// The scalar loss is `sum(output * seed)`, so `seed` is exactly the gradient
/// injected at the output. Numerical gradients use centered differences with
/// step `epsilon`.
pub fn check_gradients<F>(
    inputs: &[Array2<f64>],
    seed: ArrayView2<f64>,
    epsilon: f64,
    build: F,
) -> GradientReport
where
    F: Fn(&mut Graph<'_>, &[NodeId]) -> NodeId,
{
    let analytic = {
        let mut graph = Graph::new(true);
        let ids: Vec<NodeId> = inputs.iter().map(|x| graph.input_view(x.view())).collect();
        let out = build(&mut graph, &ids);
        graph.seed(out, seed.to_owned());
        graph.backward();
        ids.iter()
            .map(|&id| graph.grad(id).map(|g| g.to_owned()).unwrap_or_default())
            .collect::<Vec<_>>()
    };

    let loss = |values: &[Array2<f64>]| -> f64 {
        let mut graph = Graph::new(false);
        let ids: Vec<NodeId> = values.iter().map(|x| graph.input_view(x.view())).collect();
        let out = build(&mut graph, &ids);
        let values = graph.value(out);
        (&values * &seed).sum()
    };

    let mut perturbed = inputs.to_vec();
    let mut numerical = Vec::with_capacity(inputs.len());
    let mut max_abs_error = 0.0;
    let mut worst = None;

    for (i, input) in inputs.iter().enumerate() {
        let mut grad = Array2::zeros(input.raw_dim());
        for ((r, c), &original) in input.indexed_iter() {
            perturbed[i][[r, c]] = original + epsilon;
            let plus = loss(&perturbed);
            perturbed[i][[r, c]] = original - epsilon;
            let minus = loss(&perturbed);
            perturbed[i][[r, c]] = original;

            let estimate = (plus - minus) / (2.0 * epsilon);
            grad[[r, c]] = estimate;

            let error = (estimate - analytic[i][[r, c]]).abs();
            if error > max_abs_error {
                max_abs_error = error;
                worst = Some((i, (r, c)));
            }
        }
        numerical.push(grad);
    }

    GradientReport {
        max_abs_error,
        worst,
        analytic,
        numerical,
    }
}
