//! Two-operand einsum planning and execution
//!
//! Equations use single ASCII letters per axis and at most one `...` per
//! term, e.g. `"...k,kn->...n"` or `"bqhd,bkhd->bhqk"`. Ellipsis axes are
//! right-aligned across operands like numpy broadcasting, but sizes must
//! match exactly. Without `->` the output is the ellipsis axes followed by
//! the labels that appear once, in alphabetical order.

use std::collections::HashMap;

use ndarray::{Array3, ArrayD, ArrayViewD, Axis, IxDyn, LinalgScalar};

use crate::error::{QuantError, Result};

/// Private-use code points stand in for ellipsis axes
const ELLIPSIS_BASE: u32 = 0xE000;

fn ellipsis_label(i: usize) -> char {
    char::from_u32(ELLIPSIS_BASE + i as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn invalid(msg: String) -> QuantError {
    QuantError::InvalidEquation(msg)
}

fn shape_error(e: ndarray::ShapeError) -> QuantError {
    QuantError::ShapeError(e.to_string())
}

/// Which operand of a two-operand einsum
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Lhs,
    Rhs,
}

#[derive(Debug)]
struct Term {
    labels: Vec<char>,
    /// Insertion point of the ellipsis axes within `labels`
    ellipsis: Option<usize>,
}

impl Term {
    fn parse(term: &str) -> Result<Self> {
        let mut labels = Vec::new();
        let mut ellipsis = None;
        let mut rest = term;
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix("...") {
                if ellipsis.is_some() {
                    return Err(invalid(format!("'{term}' has more than one ellipsis")));
                }
                ellipsis = Some(labels.len());
                rest = tail;
                continue;
            }
            let mut chars = rest.chars();
            let Some(c) = chars.next() else { break };
            if !c.is_ascii_alphabetic() {
                return Err(invalid(format!("invalid label '{c}' in '{term}'")));
            }
            if labels.contains(&c) {
                return Err(invalid(format!("repeated label '{c}' in '{term}'")));
            }
            labels.push(c);
            rest = chars.as_str();
        }
        Ok(Self { labels, ellipsis })
    }

    /// Number of axes the ellipsis covers for an operand of rank `ndim`
    fn ellipsis_rank(&self, ndim: usize, term: &str) -> Result<usize> {
        let explicit = self.labels.len();
        match self.ellipsis {
            Some(_) if ndim >= explicit => Ok(ndim - explicit),
            None if ndim == explicit => Ok(0),
            _ => Err(QuantError::ShapeError(format!(
                "term '{term}' does not fit an operand of rank {ndim}"
            ))),
        }
    }

    fn expand(&self, ellipsis_labels: &[char]) -> Vec<char> {
        match self.ellipsis {
            Some(pos) => {
                let mut labels = self.labels[..pos].to_vec();
                labels.extend_from_slice(ellipsis_labels);
                labels.extend_from_slice(&self.labels[pos..]);
                labels
            }
            None => self.labels.clone(),
        }
    }
}

/// Parsed einsum bound to concrete operand shapes
#[derive(Clone, Debug, PartialEq)]
pub struct EinsumPlan {
    lhs: Vec<char>,
    rhs: Vec<char>,
    output: Vec<char>,
    sizes: HashMap<char, usize>,
}

impl EinsumPlan {
    /// Parse `equation` for operands of the given shapes
    ///
    /// Fails with `InvalidEquation` for malformed equations (wrong operand
    /// count, non-letter labels, repeated labels within a term, output
    /// labels missing from the inputs), `ShapeError` when a term's rank does
    /// not fit its operand and `ShapeMismatch` when a label has two sizes.
    pub fn new(equation: &str, lhs_shape: &[usize], rhs_shape: &[usize]) -> Result<Self> {
        let equation: String = equation.chars().filter(|c| !c.is_whitespace()).collect();
        let (inputs, output) = match equation.split_once("->") {
            Some((inputs, output)) => (inputs, Some(output)),
            None => (equation.as_str(), None),
        };
        let terms: Vec<&str> = inputs.split(',').collect();
        let [lhs_term, rhs_term] = terms.as_slice() else {
            return Err(invalid(format!(
                "expected two operands, got {} in '{equation}'",
                terms.len()
            )));
        };

        let lhs = Term::parse(lhs_term)?;
        let rhs = Term::parse(rhs_term)?;
        let lhs_ell = lhs.ellipsis_rank(lhs_shape.len(), lhs_term)?;
        let rhs_ell = rhs.ellipsis_rank(rhs_shape.len(), rhs_term)?;
        let max_ell = lhs_ell.max(rhs_ell);
        let ell: Vec<char> = (0..max_ell).map(ellipsis_label).collect();

        let lhs_labels = lhs.expand(&ell[max_ell - lhs_ell..]);
        let rhs_labels = rhs.expand(&ell[max_ell - rhs_ell..]);

        let output = match output {
            Some(term) => {
                let out = Term::parse(term)?;
                let labels = out.expand(&ell);
                if let Some(l) = labels
                    .iter()
                    .find(|l| !lhs_labels.contains(l) && !rhs_labels.contains(l))
                {
                    return Err(invalid(format!("output label '{l}' not in any input")));
                }
                labels
            }
            None => {
                let mut once: Vec<char> = lhs
                    .labels
                    .iter()
                    .chain(&rhs.labels)
                    .filter(|l| lhs.labels.contains(l) != rhs.labels.contains(l))
                    .copied()
                    .collect();
                once.sort_unstable();
                ell.iter().copied().chain(once).collect()
            }
        };

        let mut sizes = HashMap::new();
        for (labels, shape) in [(&lhs_labels, lhs_shape), (&rhs_labels, rhs_shape)] {
            for (&label, &size) in labels.iter().zip(shape) {
                let known = *sizes.entry(label).or_insert(size);
                if known != size {
                    return Err(QuantError::ShapeMismatch {
                        expected: vec![known],
                        got: vec![size],
                    });
                }
            }
        }

        Ok(Self {
            lhs: lhs_labels,
            rhs: rhs_labels,
            output,
            sizes,
        })
    }

    fn size(&self, label: char) -> usize {
        self.sizes.get(&label).copied().unwrap_or(1)
    }

    fn extent(&self, labels: &[char]) -> usize {
        labels.iter().map(|&l| self.size(l)).product()
    }

    fn labels(&self, operand: Operand) -> &[char] {
        match operand {
            Operand::Lhs => &self.lhs,
            Operand::Rhs => &self.rhs,
        }
    }

    /// Shape the plan expects for an operand
    pub fn operand_shape(&self, operand: Operand) -> Vec<usize> {
        self.labels(operand).iter().map(|&l| self.size(l)).collect()
    }

    pub fn output_shape(&self) -> Vec<usize> {
        self.output.iter().map(|&l| self.size(l)).collect()
    }

    /// Number of products summed into each output element
    pub fn contraction_size(&self) -> usize {
        let mut summed: Vec<char> = self
            .lhs
            .iter()
            .chain(&self.rhs)
            .filter(|l| !self.output.contains(l))
            .copied()
            .collect();
        summed.sort_unstable();
        summed.dedup();
        self.extent(&summed)
    }

    fn check_operand<T>(&self, operand: Operand, array: &ArrayViewD<'_, T>) -> Result<()> {
        let expected = self.operand_shape(operand);
        if array.shape() != expected.as_slice() {
            return Err(QuantError::ShapeMismatch {
                expected,
                got: array.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Sum out axes that appear in neither the other operand nor the output
    fn reduce_private<T: LinalgScalar>(
        &self,
        array: ArrayViewD<'_, T>,
        labels: &[char],
        other: &[char],
    ) -> (ArrayD<T>, Vec<char>) {
        let mut array = array.to_owned();
        let mut kept = labels.to_vec();
        for axis in (0..labels.len()).rev() {
            let label = labels[axis];
            if !other.contains(&label) && !self.output.contains(&label) {
                array = array.sum_axis(Axis(axis));
                kept.remove(axis);
            }
        }
        (array, kept)
    }

    /// Evaluate the einsum over any ndarray scalar
    ///
    /// Operands are permuted to `(batch, free, contracted)` layouts and
    /// contracted with one batched matrix product, so accumulation happens in
    /// `T` and any rescaling is left to the caller.
    pub fn execute<T: LinalgScalar>(
        &self,
        lhs: ArrayViewD<'_, T>,
        rhs: ArrayViewD<'_, T>,
    ) -> Result<ArrayD<T>> {
        self.check_operand(Operand::Lhs, &lhs)?;
        self.check_operand(Operand::Rhs, &rhs)?;

        let (lhs, lk) = self.reduce_private(lhs, &self.lhs, &self.rhs);
        let (rhs, rk) = self.reduce_private(rhs, &self.rhs, &self.lhs);

        let in_both = |l: &&char| lk.contains(l) && rk.contains(l);
        let batch: Vec<char> = self.output.iter().filter(in_both).copied().collect();
        let lhs_free: Vec<char> = self
            .output
            .iter()
            .filter(|l| lk.contains(l) && !rk.contains(l))
            .copied()
            .collect();
        let rhs_free: Vec<char> = self
            .output
            .iter()
            .filter(|l| rk.contains(l) && !lk.contains(l))
            .copied()
            .collect();
        let contracted: Vec<char> = lk
            .iter()
            .filter(|l| rk.contains(l) && !self.output.contains(l))
            .copied()
            .collect();

        let (b, m, k, n) = (
            self.extent(&batch),
            self.extent(&lhs_free),
            self.extent(&contracted),
            self.extent(&rhs_free),
        );

        let lhs_order = positions(&lk, &[&batch[..], &lhs_free[..], &contracted[..]].concat());
        let rhs_order = positions(&rk, &[&batch[..], &contracted[..], &rhs_free[..]].concat());
        let lhs3 = lhs
            .permuted_axes(IxDyn(&lhs_order))
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((b, m, k))
            .map_err(shape_error)?;
        let rhs3 = rhs
            .permuted_axes(IxDyn(&rhs_order))
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((b, k, n))
            .map_err(shape_error)?;

        let mut out = Array3::<T>::zeros((b, m, n));
        for ((mut o, l), r) in out
            .outer_iter_mut()
            .zip(lhs3.outer_iter())
            .zip(rhs3.outer_iter())
        {
            o.assign(&l.dot(&r));
        }

        let current = [&batch[..], &lhs_free[..], &rhs_free[..]].concat();
        let dims: Vec<usize> = current.iter().map(|&l| self.size(l)).collect();
        let out = out.into_shape_with_order(IxDyn(&dims)).map_err(shape_error)?;
        let order = positions(&current, &self.output);
        Ok(out.permuted_axes(IxDyn(&order)).as_standard_layout().into_owned())
    }

    /// Lay a keepdims per-channel parameter of `operand` out like the output
    ///
    /// Axes that do not survive into the output must have size 1 (a scale
    /// that varies along a contracted axis cannot be applied after
    /// accumulation); `ShapeMismatch` otherwise. Output axes the operand
    /// lacks get size 1.
    pub fn map_to_output<T: Clone>(
        &self,
        operand: Operand,
        param: ArrayViewD<'_, T>,
    ) -> Result<ArrayD<T>> {
        let labels = self.labels(operand);
        let param_shape = param.shape().to_vec();
        let mismatch = || QuantError::ShapeMismatch {
            expected: self.operand_shape(operand),
            got: param_shape.clone(),
        };
        if param.ndim() != labels.len() {
            return Err(mismatch());
        }

        let mut view = param;
        let mut kept = Vec::with_capacity(labels.len());
        for axis in (0..labels.len()).rev() {
            let label = labels[axis];
            let dim = view.shape()[axis];
            if self.output.contains(&label) {
                if dim != 1 && dim != self.size(label) {
                    return Err(mismatch());
                }
                kept.push(label);
            } else if dim != 1 {
                return Err(mismatch());
            } else {
                view = view.index_axis_move(Axis(axis), 0);
            }
        }
        kept.reverse();

        let dims = view.shape().to_vec();
        let mut order: Vec<usize> = (0..kept.len()).collect();
        order.sort_by_key(|&i| self.output.iter().position(|&o| o == kept[i]));
        let shape: Vec<usize> = self
            .output
            .iter()
            .map(|o| kept.iter().position(|k| k == o).map_or(1, |i| dims[i]))
            .collect();

        let permuted = view.permuted_axes(IxDyn(&order));
        permuted
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&shape))
            .map_err(shape_error)
    }
}

fn positions(labels: &[char], order: &[char]) -> Vec<usize> {
    order
        .iter()
        .filter_map(|l| labels.iter().position(|x| x == l))
        .collect()
}

/// Float einsum of two operands
pub fn einsum(equation: &str, lhs: ArrayViewD<'_, f32>, rhs: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
    EinsumPlan::new(equation, lhs.shape(), rhs.shape())?.execute(lhs, rhs)
}
