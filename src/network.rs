//! The two-layer Q-function: `Q(s) = W2 . tanh(W1 . s + B1) + B2`.

use std::sync::{Arc, RwLock};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

use crate::graph::{Graph, NodeId};
use crate::initialization::WeightInit;
use crate::tensor::Mat;

/// Parameters of the Q-network.
///
/// `w1` is `hidden x states`, `b1` is `hidden x 1`, `w2` is `actions x hidden`
/// and `b2` is `actions x 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct QWeights {
    pub w1: Mat,
    pub b1: Mat,
    pub w2: Mat,
    pub b2: Mat,
}

/// Weights shared between agents. Passes run under the read guard, the SGD
/// step under the write guard.
pub type SharedWeights = Arc<RwLock<QWeights>>;

/// Gradients of one backward pass, one array per parameter.
#[derive(Clone, Debug)]
pub struct QGradients {
    pub w1: Array2<f64>,
    pub b1: Array2<f64>,
    pub w2: Array2<f64>,
    pub b2: Array2<f64>,
}

impl QWeights {
    /// Gaussian weights (std 0.01), zero biases.
    pub fn new<R: Rng + ?Sized>(
        num_states: usize,
        num_actions: usize,
        hidden_units: usize,
        rng: &mut R,
    ) -> Self {
        let init = WeightInit::small_normal();
        QWeights {
            w1: init.initialize(hidden_units, num_states, rng),
            b1: WeightInit::Zeros.initialize(hidden_units, 1, rng),
            w2: init.initialize(num_actions, hidden_units, rng),
            b2: WeightInit::Zeros.initialize(num_actions, 1, rng),
        }
    }

    /// Assemble from existing tensors, checking that the four shapes line up.
    pub fn from_parts(w1: Mat, b1: Mat, w2: Mat, b2: Mat) -> Option<Self> {
        let hidden = w1.rows();
        let actions = w2.rows();
        let consistent = b1.shape() == (hidden, 1)
            && w2.cols() == hidden
            && b2.shape() == (actions, 1);
        consistent.then(|| QWeights { w1, b1, w2, b2 })
    }

    pub fn into_shared(self) -> SharedWeights {
        Arc::new(RwLock::new(self))
    }

    pub fn num_states(&self) -> usize {
        self.w1.cols()
    }

    pub fn num_actions(&self) -> usize {
        self.w2.rows()
    }

    pub fn hidden_units(&self) -> usize {
        self.w1.rows()
    }

    pub fn tensors(&self) -> [&Mat; 4] {
        [&self.w1, &self.b1, &self.w2, &self.b2]
    }

    /// Build the graph for one forward pass over a `states x 1` column.
    pub fn forward<'a>(&'a self, state: ArrayView2<'a, f64>, taping: bool) -> QPass<'a> {
        let mut graph = Graph::new(taping);
        let w1 = graph.param(&self.w1);
        let b1 = graph.param(&self.b1);
        let w2 = graph.param(&self.w2);
        let b2 = graph.param(&self.b2);
        let s = graph.input_view(state);

        let pre = graph.matmul(w1, s);
        let pre = graph.add(pre, b1);
        let hidden = graph.tanh(pre);
        let out = graph.matmul(w2, hidden);
        let output = graph.add(out, b2);

        QPass {
            graph,
            output,
            params: [w1, b1, w2, b2],
        }
    }

    /// Inference-only Q-values for a flat state vector.
    pub fn q_values(&self, state: &[f64]) -> Array1<f64> {
        let column = state_column(state);
        let pass = self.forward(column.view(), false);
        pass.q_values().to_owned()
    }

    /// Accumulate `grads` into each tensor and take one SGD step of size `alpha`.
    pub fn apply_gradients(&mut self, grads: &QGradients, alpha: f64) {
        self.w1.accumulate_grad(grads.w1.view());
        self.b1.accumulate_grad(grads.b1.view());
        self.w2.accumulate_grad(grads.w2.view());
        self.b2.accumulate_grad(grads.b2.view());

        self.w1.apply_gradient_step(alpha);
        self.b1.apply_gradient_step(alpha);
        self.w2.apply_gradient_step(alpha);
        self.b2.apply_gradient_step(alpha);
    }
}

/// One forward pass, kept alive so its tape can be replayed.
pub struct QPass<'a> {
    graph: Graph<'a>,
    output: NodeId,
    params: [NodeId; 4],
}

impl<'a> QPass<'a> {
    /// The `actions x 1` output column.
    pub fn output(&self) -> ArrayView2<'_, f64> {
        self.graph.value(self.output)
    }

    pub fn q_values(&self) -> ArrayView1<'_, f64> {
        self.output().index_axis_move(Axis(1), 0)
    }

    pub fn graph(&self) -> &Graph<'a> {
        &self.graph
    }

    /// Seed `error` at `action` (every other output gradient stays zero),
    /// run the backward pass and hand back the parameter gradients.
    ///
    /// Panics on a pass built without taping.
    pub fn backward_from(mut self, action: usize, error: f64) -> QGradients {
        assert!(self.graph.is_taping(), "backward_from on an inference pass");
        self.graph.set_grad(self.output, action, 0, error);
        self.graph.backward();

        let [w1, b1, w2, b2] = self.params;
        let mut take = |id: NodeId| {
            self.graph
                .take_grad(id)
                .expect("taping pass keeps parameter gradients")
        };
        QGradients {
            w1: take(w1),
            b1: take(b1),
            w2: take(w2),
            b2: take(b2),
        }
    }
}

/// Flat state vector as an `n x 1` column.
pub fn state_column(state: &[f64]) -> Array2<f64> {
    Array1::from(state.to_vec()).insert_axis(Axis(1))
}

/// Index of the largest value, lowest index on ties.
pub fn greedy_action(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Largest value of a Q column.
pub fn max_q(values: ArrayView1<f64>) -> f64 {
    values.fold(f64::NEG_INFINITY, |m, &v| m.max(v))
}
