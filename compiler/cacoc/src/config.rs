//! Backend configuration.

use caco_frame::{CallConventionKind, FrameOptions};

/// Knobs for closure conversion and frame generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    pub call_convention: CallConventionKind,
    /// Emit the dynamic 16-byte alignment sequence around runtime calls
    /// made from prologues and around calls built with
    /// [`ClosureConversion::call`](crate::ClosureConversion::call).
    pub align_calls: bool,
    /// Label of the runtime routine that returns a fresh heap cell.
    pub heap_cell_allocator: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let frame = FrameOptions::default();
        Self {
            call_convention: CallConventionKind::default(),
            align_calls: frame.align_calls,
            heap_cell_allocator: frame.heap_cell_allocator,
        }
    }
}

impl BackendConfig {
    #[must_use]
    pub fn with_align_calls(mut self, align: bool) -> Self {
        self.align_calls = align;
        self
    }

    #[must_use]
    pub fn with_heap_cell_allocator(mut self, label: impl Into<String>) -> Self {
        self.heap_cell_allocator = label.into();
        self
    }

    pub(crate) fn frame_options(&self) -> FrameOptions {
        FrameOptions {
            align_calls: self.align_calls,
            heap_cell_allocator: self.heap_cell_allocator.clone(),
        }
    }
}
