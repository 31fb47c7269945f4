//! Label-map post-processing for the data path.
//!
//! The engine may hand back a 3-axis stack of per-slice label maps that
//! improperly share one label namespace (a side effect of the engine
//! squeezing its own dimensions). Before transmission the stack is
//! collapsed to a single 2-axis map by element-wise maximum, then relabeled
//! so identifiers run 1..=n with no gaps; the projection can erase an
//! entire label, and downstream consumers must never see the hole it
//! leaves.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array2, ArrayD, ArrayView3, Axis, Ix2, Ix3};

use crate::config::ExecConfig;
use crate::error::TensorError;

/// Collapse a label stack to one 2-axis map by element-wise maximum over
/// the stack axis.
pub fn max_project(stack: ArrayView3<'_, u32>) -> Array2<u32> {
    stack.fold_axis(Axis(0), 0u32, |acc, &v| (*acc).max(v))
}

/// Remap nonzero labels onto 1..=n, ascending, gap-free.
pub fn relabel_sequential(labels: &Array2<u32>) -> Array2<u32> {
    let present: BTreeSet<u32> = labels.iter().copied().filter(|&v| v != 0).collect();
    let mapping: BTreeMap<u32, u32> = present.into_iter().zip(1..).collect();
    labels.mapv(|v| {
        if v == 0 {
            0
        } else {
            mapping.get(&v).copied().unwrap_or(0)
        }
    })
}

/// Post-process one engine result per the bound execution configuration.
///
/// 2-axis results pass through. 3-axis results are max-projected and
/// relabeled when `project_2d` is set, otherwise forwarded as the raw
/// stack. Any other arity is a processing error. `batch_axis` prepends a
/// singleton leading axis to 2-axis output (compatibility shim, not a
/// semantic transform).
pub fn finalize(result: ArrayD<u32>, exec: &ExecConfig) -> Result<ArrayD<u32>, TensorError> {
    let flat: Array2<u32> = match result.ndim() {
        2 => result
            .into_dimensionality::<Ix2>()
            .map_err(|_| TensorError::BadArity { got: 2 })?,
        3 if exec.project_2d => {
            let stack = result
                .view()
                .into_dimensionality::<Ix3>()
                .map_err(|_| TensorError::BadArity { got: 3 })?;
            relabel_sequential(&max_project(stack))
        }
        3 => return Ok(result),
        got => return Err(TensorError::BadArity { got }),
    };
    let mut out = flat.into_dyn();
    if exec.batch_axis {
        out = out.insert_axis(Axis(0));
    }
    Ok(out)
}
