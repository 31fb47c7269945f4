//! Built-in reference engine: intensity threshold plus connected
//! components.
//!
//! Foreground is every pixel whose value exceeds the stitching threshold;
//! 4-connected foreground regions get sequential labels. This keeps the
//! binary runnable end-to-end without an external model runtime and marks
//! the seam where an accelerator-resident engine plugs in.

use ndarray::{Array2, ArrayD, ArrayView2, Ix2};
use tracing::debug;

use crate::config::{EngineConfig, ExecConfig};
use crate::error::EngineError;

use super::InferenceEngine;

pub struct ThresholdEngine;

impl ThresholdEngine {
    pub fn new(setup: &EngineConfig) -> Self {
        // Informational only; this engine runs on the CPU.
        debug!(device = %setup.device, "threshold engine ready");
        Self
    }
}

impl InferenceEngine for ThresholdEngine {
    fn process(
        &mut self,
        input: &ArrayD<f32>,
        exec: &ExecConfig,
    ) -> Result<ArrayD<u32>, EngineError> {
        let img = input.view().into_dimensionality::<Ix2>().map_err(|_| {
            EngineError::BadInput(format!(
                "expected a 2-axis image, got {} axes",
                input.ndim()
            ))
        })?;
        Ok(label_components(img, exec.stitch_threshold as f32).into_dyn())
    }

    fn name(&self) -> &str {
        "threshold"
    }
}

fn label_components(img: ArrayView2<'_, f32>, threshold: f32) -> Array2<u32> {
    let (rows, cols) = img.dim();
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut next = 0u32;
    let mut stack = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if img[[r, c]] <= threshold || labels[[r, c]] != 0 {
                continue;
            }
            next += 1;
            labels[[r, c]] = next;
            stack.push((r, c));
            while let Some((cr, cc)) = stack.pop() {
                for (nr, nc) in neighbors(cr, cc, rows, cols) {
                    if img[[nr, nc]] > threshold && labels[[nr, nc]] == 0 {
                        labels[[nr, nc]] = next;
                        stack.push((nr, nc));
                    }
                }
            }
        }
    }
    labels
}

fn neighbors(r: usize, c: usize, rows: usize, cols: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(4);
    if r > 0 {
        out.push((r - 1, c));
    }
    if r + 1 < rows {
        out.push((r + 1, c));
    }
    if c > 0 {
        out.push((r, c - 1));
    }
    if c + 1 < cols {
        out.push((r, c + 1));
    }
    out
}
