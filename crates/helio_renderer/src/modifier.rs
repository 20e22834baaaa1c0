//! Surface modifiers, applied after the geometry fills in the shading state.

use crate::shading_state::ShadingState;

/// Index of a modifier in its scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModifierId(u32);

impl ModifierId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Perturbs the surface description, typically the shading normal.
pub trait Modifier: Send + Sync {
    fn modify(&self, state: &mut ShadingState<'_>);
}

/// Turns the shading normal and the basis around.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlipNormalModifier;

impl Modifier for FlipNormalModifier {
    fn modify(&self, state: &mut ShadingState<'_>) {
        state.set_normal(-state.normal());
        let mut basis = state.basis();
        basis.flip_w();
        state.set_basis(basis);
    }
}
