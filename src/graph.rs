//! Reverse-mode automatic differentiation over 2-D matrices.
//!
//! A [`Graph`] owns an arena of nodes. Every operation evaluates its output
//! eagerly and, when taping is enabled, appends an [`Op`] to the tape. Calling
//! [`Graph::backward`] pops the tape in reverse order and accumulates gradients
//! into every node that contributed to the seeded output.
//!
//! Weights enter the graph borrowed (see [`Graph::param`]), so a pass never
//! copies parameter buffers and never mutates them. Their gradients land in
//! the graph's own accumulators and are collected with [`Graph::take_grad`].
//!
//! ```
//! use reinforce::graph::Graph;
//! use ndarray::array;
//!
//! let mut g = Graph::new(true);
//! let x = g.input(array![[1.0], [2.0]]);
//! let w = g.input(array![[0.5, -0.5]]);
//! let y = g.matmul(w, x);
//! g.seed(y, array![[1.0]]);
//! g.backward();
//! assert_eq!(g.grad(w).unwrap(), array![[1.0, 2.0]]);
//! ```

use ndarray::{Array2, ArrayView2, CowArray, Ix2, Zip};

use crate::tensor::Mat;

/// Element count above which `tanh` is mapped in parallel.
const PARALLEL_MAP_THRESHOLD: usize = 1 << 14;

/// Handle to a node in a [`Graph`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A recorded forward operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Add { a: NodeId, b: NodeId, out: NodeId },
    Matmul { a: NodeId, b: NodeId, out: NodeId },
    Tanh { input: NodeId, out: NodeId },
}

struct Node<'a> {
    value: CowArray<'a, f64, Ix2>,
    grad: Option<Array2<f64>>,
}

/// Single-use computation graph.
pub struct Graph<'a> {
    nodes: Vec<Node<'a>>,
    tape: Vec<Op>,
    taping: bool,
    consumed: bool,
}

impl<'a> Graph<'a> {
    /// Create a graph. With `taping == false` no operations are recorded and
    /// no gradient buffers are allocated.
    pub fn new(taping: bool) -> Self {
        Graph {
            nodes: Vec::new(),
            tape: Vec::new(),
            taping,
            consumed: false,
        }
    }

    pub fn is_taping(&self) -> bool {
        self.taping
    }

    /// Number of recorded tape entries still waiting for `backward`.
    pub fn len(&self) -> usize {
        self.tape.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tape.is_empty()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Register a weight tensor by reference.
    pub fn param(&mut self, mat: &'a Mat) -> NodeId {
        self.push(CowArray::from(mat.value().view()))
    }

    /// Register a borrowed view as a leaf.
    pub fn input_view(&mut self, view: ArrayView2<'a, f64>) -> NodeId {
        self.push(CowArray::from(view))
    }

    /// Register an owned array as a leaf.
    pub fn input(&mut self, value: Array2<f64>) -> NodeId {
        self.push(CowArray::from(value))
    }

    fn push(&mut self, value: CowArray<'a, f64, Ix2>) -> NodeId {
        let grad = if self.taping {
            Some(Array2::zeros(value.raw_dim()))
        } else {
            None
        };
        self.nodes.push(Node { value, grad });
        NodeId(self.nodes.len() - 1)
    }

    pub fn value(&self, id: NodeId) -> ArrayView2<'_, f64> {
        self.nodes[id.0].value.view()
    }

    /// Gradient accumulated for `id`, or `None` on a non-taping graph.
    pub fn grad(&self, id: NodeId) -> Option<ArrayView2<'_, f64>> {
        self.nodes[id.0].grad.as_ref().map(|g| g.view())
    }

    /// Move the gradient of `id` out of the graph.
    pub fn take_grad(&mut self, id: NodeId) -> Option<Array2<f64>> {
        self.nodes[id.0].grad.take()
    }

    /// Set a single element of the gradient of `id`.
    pub fn set_grad(&mut self, id: NodeId, row: usize, col: usize, value: f64) {
        self.grad_mut(id)[[row, col]] = value;
    }

    /// Replace the whole gradient of `id`; the shape must match the node.
    pub fn seed(&mut self, id: NodeId, grad: Array2<f64>) {
        let target = self.grad_mut(id);
        assert_eq!(target.dim(), grad.dim(), "seed: gradient shape does not match node");
        *target = grad;
    }

    fn grad_mut(&mut self, id: NodeId) -> &mut Array2<f64> {
        self.nodes[id.0]
            .grad
            .as_mut()
            .expect("gradient requested on a graph built without taping")
    }

    fn record(&mut self, op: Op) {
        if self.taping {
            self.tape.push(op);
        }
    }

    /// Elementwise `a + b`. Shapes must match exactly.
    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let out = {
            let (va, vb) = (&self.nodes[a.0].value, &self.nodes[b.0].value);
            assert_eq!(
                va.dim(),
                vb.dim(),
                "add: operand shapes {:?} and {:?} differ",
                va.dim(),
                vb.dim()
            );
            va + vb
        };
        let out = self.input(out);
        self.record(Op::Add { a, b, out });
        out
    }

    /// Dense product `a (n x k) . b (k x d)`.
    ///
    /// Goes through `ndarray`'s `dot`, whose summation order is fixed for a
    /// given shape, so repeated passes produce bit-identical results.
    pub fn matmul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let out = {
            let (va, vb) = (&self.nodes[a.0].value, &self.nodes[b.0].value);
            assert_eq!(
                va.ncols(),
                vb.nrows(),
                "matmul: inner dimensions differ ({:?} . {:?})",
                va.dim(),
                vb.dim()
            );
            va.dot(vb)
        };
        let out = self.input(out);
        self.record(Op::Matmul { a, b, out });
        out
    }

    /// Elementwise hyperbolic tangent.
    pub fn tanh(&mut self, input: NodeId) -> NodeId {
        let out = {
            let v = &self.nodes[input.0].value;
            if v.len() >= PARALLEL_MAP_THRESHOLD {
                let mut out = v.to_owned();
                out.par_mapv_inplace(f64::tanh);
                out
            } else {
                v.mapv(f64::tanh)
            }
        };
        let out = self.input(out);
        self.record(Op::Tanh { input, out });
        out
    }

    /// Replay the tape in reverse, accumulating gradients.
    ///
    /// A no-op on a non-taping graph. Panics if called twice on a taping graph.
    pub fn backward(&mut self) {
        if !self.taping {
            return;
        }
        assert!(!self.consumed, "backward called twice on the same graph");
        self.consumed = true;

        while let Some(op) = self.tape.pop() {
            match op {
                Op::Add { a, b, out } => {
                    let d_out = self.grad_of(out).to_owned();
                    self.accumulate(a, d_out.view());
                    self.accumulate(b, d_out.view());
                }
                Op::Matmul { a, b, out } => {
                    let (d_a, d_b) = {
                        let d_out = self.grad_of(out);
                        let va = &self.nodes[a.0].value;
                        let vb = &self.nodes[b.0].value;
                        (d_out.dot(&vb.t()), va.t().dot(d_out))
                    };
                    self.accumulate(a, d_a.view());
                    self.accumulate(b, d_b.view());
                }
                Op::Tanh { input, out } => {
                    let d_in = Zip::from(&self.nodes[out.0].value)
                        .and(self.grad_of(out))
                        .map_collect(|&y, &g| (1.0 - y * y) * g);
                    self.accumulate(input, d_in.view());
                }
            }
        }
    }

    fn grad_of(&self, id: NodeId) -> &Array2<f64> {
        self.nodes[id.0]
            .grad
            .as_ref()
            .expect("taping graph node lost its gradient buffer")
    }

    fn accumulate(&mut self, id: NodeId, delta: ArrayView2<f64>) {
        *self.grad_mut(id) += &delta;
    }
}
