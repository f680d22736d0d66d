//! Frustum culling with atomic compaction.
//!
//! One invocation per live instance walks the sorted id buffer, so survivors are appended
//! in sort order. On the GPU, concurrent `atomicAdd` reservations may interleave
//! instances within the same wave; the survivor set and count are exact either way.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;

use super::instance::GpuSprite;
use super::kernel::{DispatchGrid, KernelParams};

/// Parameter block for the cull dispatch over `live` instances.
pub fn cull_params(live: u32, radius: f32) -> KernelParams {
    KernelParams {
        count: live,
        radius,
        row_span: DispatchGrid::for_threads(live).row_span,
        ..Default::default()
    }
}

/// Sphere test against six `(normal, distance)` planes. Rejects only when the centre is
/// more than `radius` behind some plane.
#[inline]
pub fn sphere_visible(planes: &[[f32; 4]], center: Vec3, radius: f32) -> bool {
    planes.iter().all(|&[x, y, z, d]| {
        let s = Vec3::new(x, y, z).dot(center) + d;
        s >= -radius
    })
}

/// Body of one `sphere_cull.wgsl` invocation at linear index `i`.
pub fn cull_invocation(
    params: &KernelParams,
    i: u32,
    sprites: &[GpuSprite],
    planes: &[[f32; 4]],
    sorted_ids: &[u32],
    counter: &AtomicU32,
    compacted: &mut [u32],
) {
    if i >= params.count {
        return;
    }
    let Some(&id) = sorted_ids.get(i as usize) else {
        return;
    };
    if id >= params.count {
        return;
    }
    let Some(sprite) = sprites.get(id as usize) else {
        return;
    };
    if !sphere_visible(planes, sprite.position(), params.radius) {
        return;
    }
    let slot = counter.fetch_add(1, Ordering::Relaxed) as usize;
    if let Some(out) = compacted.get_mut(slot) {
        *out = id;
    }
}

/// Cull `sorted_ids[..sprites.len()]` on the CPU. Returns the survivors in sort order.
pub fn cull_on_cpu(
    sprites: &[GpuSprite],
    planes: &[[f32; 4]],
    sorted_ids: &[u32],
    radius: f32,
    compacted: &mut Vec<u32>,
) -> u32 {
    let live = sprites.len() as u32;
    let params = cull_params(live, radius);
    let counter = AtomicU32::new(0);
    compacted.clear();
    compacted.resize(sprites.len(), 0);
    for i in 0..live {
        cull_invocation(&params, i, sprites, planes, sorted_ids, &counter, compacted);
    }
    let survivors = counter.into_inner();
    compacted.truncate(survivors as usize);
    survivors
}
