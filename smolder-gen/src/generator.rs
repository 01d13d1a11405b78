//! The generator contract.
//!
//! A generator is a pure, seeded, shrinkable producer of values of one
//! type. `draw` emits a value together with the [`DrawTree`] recording every
//! decision; `replay` rebuilds a value from a (possibly edited) tree;
//! `shrink` proposes structurally-smaller trees. Generators own no mutable
//! state and may be called unbounded times from any thread.

use std::sync::Arc;

use rand::rngs::StdRng;

use smolder_core::GenValue;

use crate::error::ReplayError;
use crate::shrink;
use crate::tree::DrawTree;

/// Per-draw context: the trial RNG, a size hint bounding collection
/// lengths, and the recursion budget for `Ref` schemas.
pub struct DrawCtx<'r> {
    rng: &'r mut StdRng,
    size: usize,
    depth: usize,
    max_ref_depth: usize,
}

impl<'r> DrawCtx<'r> {
    pub fn new(rng: &'r mut StdRng, size: usize, max_ref_depth: usize) -> Self {
        Self { rng, size, depth: 0, max_ref_depth }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        self.rng
    }

    /// Upper bound on drawn collection lengths for this trial.
    pub fn size(&self) -> usize {
        self.size
    }

    /// True once `Ref` descent has used up the recursion budget; the next
    /// `Ref` must take its minimal expansion instead of recursing.
    pub fn at_ref_depth_limit(&self) -> bool {
        self.depth >= self.max_ref_depth
    }

    /// Run `f` one `Ref` level deeper.
    pub fn descend<T>(&mut self, f: impl FnOnce(&mut DrawCtx<'r>) -> T) -> T {
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }
}

/// A lazy, seeded, shrinkable producer of values of one domain type.
pub trait ValueGenerator: Send + Sync {
    /// Draw a fresh value, recording every decision in the returned tree.
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree);

    /// Rebuild the value a tree describes.
    ///
    /// Fails when the tree no longer has the shape this generator draws -
    /// the normal outcome for some shrink edits, which are then discarded.
    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError>;

    /// Ordered, structurally-smaller candidate trees.
    ///
    /// The default delegates to the generic tree shrinker; generators with
    /// domain knowledge may override.
    fn shrink(&self, tree: &DrawTree) -> Vec<DrawTree> {
        shrink::candidates(tree).collect()
    }
}

/// Shared handle to a generator; registries and combinators hold these.
pub type GeneratorHandle = Arc<dyn ValueGenerator>;
