//! Per-frame command recording with lazily opened compute passes.
//!
//! Consecutive dispatches share one compute pass. Anything that needs the encoder itself
//! (clears, copies, render passes, barriers) closes the open pass first, so work recorded
//! afterwards starts after everything recorded before it.
//!
//! ```ignore
//! let mut frame = FrameEncoder::new(context.device(), "sprites");
//! let pass = frame.compute_pass();
//! pass.set_pipeline(&pipeline);
//! pass.set_bind_group(0, &bind_group, &[offset]);
//! pass.dispatch_workgroups(64, 1, 1);
//! frame.encoder().clear_buffer(&counter, 0, None);
//! context.queue().submit(Some(frame.finish()));
//! ```

use swarm_core::profiling::profile_function;

pub struct FrameEncoder {
    label: &'static str,
    encoder: wgpu::CommandEncoder,
    pass: Option<wgpu::ComputePass<'static>>,
    passes: u32,
}

impl FrameEncoder {
    pub fn new(device: &wgpu::Device, label: &'static str) -> Self {
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(label),
        });
        Self {
            label,
            encoder,
            pass: None,
            passes: 0,
        }
    }

    /// The open compute pass, beginning one if needed.
    pub fn compute_pass(&mut self) -> &mut wgpu::ComputePass<'static> {
        self.pass.get_or_insert_with(|| {
            self.passes += 1;
            self.encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(self.label),
                    timestamp_writes: None,
                })
                .forget_lifetime()
        })
    }

    /// End the open compute pass, if any.
    pub fn end_pass(&mut self) {
        drop(self.pass.take());
    }

    pub fn has_open_pass(&self) -> bool {
        self.pass.is_some()
    }

    /// Compute passes begun so far.
    pub fn pass_count(&self) -> u32 {
        self.passes
    }

    /// The raw encoder. Closes the open compute pass.
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.end_pass();
        &mut self.encoder
    }

    pub fn finish(mut self) -> wgpu::CommandBuffer {
        profile_function!();
        self.end_pass();
        self.encoder.finish()
    }
}
