//! Blocking GPU buffer readback, used for pipeline debugging and GPU tests.
//!
//! ```ignore
//! let bytes = read_buffer(&context, &buffer, 0, 64)?;
//! let ids: &[u32] = bytemuck::cast_slice(&bytes);
//! ```

use crate::GraphicsContext;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadbackError {
    #[error("buffer mapping failed: {0}")]
    MapFailed(String),
    #[error("device poll failed: {0}")]
    PollFailed(String),
    #[error("readback of unknown or released buffer")]
    UnknownBuffer,
    #[error("readback range {offset}..{end} exceeds buffer size {size}")]
    OutOfRange { offset: u64, end: u64, size: u64 },
}

/// Copy `size` bytes at `offset` of `source` into a staging buffer and wait for them.
///
/// `source` needs `COPY_SRC` usage. Work already submitted on the queue completes first.
pub fn read_buffer(
    context: &GraphicsContext,
    source: &wgpu::Buffer,
    offset: u64,
    size: u64,
) -> Result<Vec<u8>, ReadbackError> {
    let end = offset + size;
    if end > source.size() {
        return Err(ReadbackError::OutOfRange {
            offset,
            end,
            size: source.size(),
        });
    }
    if size == 0 {
        return Ok(Vec::new());
    }
    let aligned = size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

    let staging = context.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback_staging"),
        size: aligned,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
    let copy_size = aligned.min(source.size() - offset);
    encoder.copy_buffer_to_buffer(source, offset, &staging, 0, copy_size);
    context.queue().submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    context
        .device()
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|err| ReadbackError::PollFailed(err.to_string()))?;
    rx.recv()
        .map_err(|err| ReadbackError::MapFailed(err.to_string()))?
        .map_err(|err| ReadbackError::MapFailed(err.to_string()))?;

    let bytes = slice.get_mapped_range()[..size as usize].to_vec();
    staging.unmap();
    Ok(bytes)
}
