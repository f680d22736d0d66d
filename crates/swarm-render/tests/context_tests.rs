//! Graphics context lifecycle and Arc management tests.

use std::sync::Arc;

use swarm_render::{GpuFeatures, GraphicsContext, GraphicsContextDescriptor, GraphicsError};

#[test]
#[ignore] // Requires GPU - run with: cargo test --test context_tests -- --ignored
fn test_context_creation_sync() {
    match GraphicsContext::new_owned_sync() {
        Ok(ctx) => {
            assert_eq!(Arc::strong_count(&ctx), 1);
            assert!(ctx.max_compute_workgroups_per_dimension() > 0);
            assert!(ctx.min_uniform_buffer_offset_alignment() <= 256);
        }
        Err(e) => println!("GPU not available: {e:?}"),
    }
}

#[test]
#[ignore] // Requires GPU
fn test_context_arc_cloning() {
    if let Ok(ctx) = GraphicsContext::new_owned_sync() {
        let ctx2 = ctx.clone();
        assert_eq!(Arc::strong_count(&ctx), 2);
        assert_eq!(ctx.limits().max_bind_groups, ctx2.limits().max_bind_groups);
        drop(ctx2);
        assert_eq!(Arc::strong_count(&ctx), 1);
    }
}

#[test]
#[ignore] // Requires GPU
fn test_context_cleanup() {
    if let Ok(ctx) = GraphicsContext::new_owned_sync() {
        let weak = Arc::downgrade(&ctx);
        assert!(weak.upgrade().is_some());
        drop(ctx);
        assert!(weak.upgrade().is_none());
    }
}

#[test]
#[ignore] // Requires GPU
fn test_enabled_features_match_device() {
    let descriptor =
        GraphicsContextDescriptor::new().request_features(GpuFeatures::INDIRECT_FIRST_INSTANCE);
    if let Ok(ctx) = GraphicsContext::new_owned_sync_with_descriptor(descriptor) {
        let device_features = GpuFeatures::from_wgpu(ctx.device().features());
        assert!(device_features.contains(ctx.gpu_features()));
    }
}

#[test]
#[ignore] // Requires GPU
fn test_missing_required_feature_is_reported() {
    let descriptor = GraphicsContextDescriptor::new().require_features(GpuFeatures::all());
    match GraphicsContext::new_owned_sync_with_descriptor(descriptor) {
        Ok(ctx) => assert!(ctx.has_feature(GpuFeatures::all())),
        Err(GraphicsError::MissingFeatures { missing, .. }) => assert!(!missing.is_empty()),
        Err(e) => println!("GPU not available: {e:?}"),
    }
}
