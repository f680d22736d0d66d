//! A host object that records lifecycle calls.

use swarm_render::sprite::{SpriteComponent, SpriteLifecycle};
use swarm_render::{SpriteDesc, SpriteError, SpriteRendererSystem};

/// Scene object owning a [`SpriteComponent`] and counting the hooks it receives.
#[derive(Debug)]
pub struct CountingHost {
    pub component: SpriteComponent,
    pub activations: u32,
    pub deactivations: u32,
}

impl CountingHost {
    pub fn new(desc: SpriteDesc) -> Self {
        Self {
            component: SpriteComponent::new(desc),
            activations: 0,
            deactivations: 0,
        }
    }
}

impl SpriteLifecycle for CountingHost {
    fn on_activate(&mut self, system: &mut SpriteRendererSystem) -> Result<(), SpriteError> {
        self.activations += 1;
        self.component.on_activate(system)
    }

    fn on_deactivate(&mut self, system: &mut SpriteRendererSystem) {
        self.deactivations += 1;
        self.component.on_deactivate(system);
    }
}
