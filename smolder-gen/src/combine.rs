//! Generator combinators for sums, products, optionals and collections.

use rand::Rng;

use smolder_core::GenValue;

use crate::error::ReplayError;
use crate::generator::{DrawCtx, GeneratorHandle, ValueGenerator};
use crate::tree::{DrawTree, NodeKind};

/// 50/50 none vs. the inner generator; shrinks toward none.
pub struct OptionalGen {
    inner: GeneratorHandle,
}

impl OptionalGen {
    pub fn new(inner: GeneratorHandle) -> Self {
        Self { inner }
    }
}

impl ValueGenerator for OptionalGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        if ctx.rng().gen_bool(0.5) {
            let (value, tree) = self.inner.draw(ctx);
            (
                value,
                DrawTree::node(
                    NodeKind::Optional,
                    vec![DrawTree::Choice { index: 1, arity: 2 }, tree],
                ),
            )
        } else {
            (
                GenValue::Null,
                DrawTree::node(NodeKind::Optional, vec![DrawTree::Choice { index: 0, arity: 2 }]),
            )
        }
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        let DrawTree::Node { kind: NodeKind::Optional, children } = tree else {
            return Err(ReplayError::Structure("expected an optional node"));
        };
        match children.as_slice() {
            [DrawTree::Choice { index: 0, .. }] => Ok(GenValue::Null),
            [DrawTree::Choice { index: 1, .. }, inner] => self.inner.replay(inner),
            _ => Err(ReplayError::Structure("malformed optional node")),
        }
    }
}

/// Sequences with length drawn in `[min, max]`.
///
/// Shrinks by removing elements and by shrinking individual elements, both
/// handled generically through the tree.
pub struct SeqGen {
    item: GeneratorHandle,
    min: usize,
    max: usize,
}

impl SeqGen {
    pub fn new(item: GeneratorHandle, min: usize, max: usize) -> Self {
        Self { item, min, max: max.max(min) }
    }
}

impl ValueGenerator for SeqGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let hi = self.max.min(ctx.size()).max(self.min);
        let len = ctx.rng().gen_range(self.min..=hi);
        let mut children = Vec::with_capacity(len + 1);
        children.push(DrawTree::Len { value: len, lo: self.min, hi });
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            let (value, tree) = self.item.draw(ctx);
            items.push(value);
            children.push(tree);
        }
        (GenValue::Seq(items), DrawTree::node(NodeKind::Seq, children))
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        let DrawTree::Node { kind: NodeKind::Seq, children } = tree else {
            return Err(ReplayError::Structure("expected a seq node"));
        };
        let Some(DrawTree::Len { value: len, .. }) = children.first() else {
            return Err(ReplayError::Structure("seq node missing length"));
        };
        if children.len() != len + 1 || *len < self.min || *len > self.max {
            return Err(ReplayError::OutOfRange);
        }
        let mut items = Vec::with_capacity(*len);
        for child in &children[1..] {
            items.push(self.item.replay(child)?);
        }
        Ok(GenValue::Seq(items))
    }
}

/// Maps drawn as a sequence of key/value entries with first-wins
/// deduplication on the rendered key.
///
/// Replay applies the same deduplication, so an edited tree materializes
/// exactly as a fresh draw of those entries would.
pub struct MapGen {
    key: GeneratorHandle,
    value: GeneratorHandle,
    min: usize,
    max: usize,
}

impl MapGen {
    pub fn new(key: GeneratorHandle, value: GeneratorHandle, min: usize, max: usize) -> Self {
        Self { key, value, min, max: max.max(min) }
    }

    fn dedup(entries: Vec<(GenValue, GenValue)>) -> GenValue {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        for (k, v) in entries {
            let rendered = k.render_scalar().unwrap_or_default();
            if seen.contains(&rendered) {
                continue;
            }
            seen.push(rendered);
            out.push((k, v));
        }
        GenValue::Map(out)
    }
}

impl ValueGenerator for MapGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let hi = self.max.min(ctx.size()).max(self.min);
        let len = ctx.rng().gen_range(self.min..=hi);
        let mut children = Vec::with_capacity(len + 1);
        children.push(DrawTree::Len { value: len, lo: self.min, hi });
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            let (k, kt) = self.key.draw(ctx);
            let (v, vt) = self.value.draw(ctx);
            entries.push((k, v));
            children.push(DrawTree::node(NodeKind::Entry, vec![kt, vt]));
        }
        (Self::dedup(entries), DrawTree::node(NodeKind::Seq, children))
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        let DrawTree::Node { kind: NodeKind::Seq, children } = tree else {
            return Err(ReplayError::Structure("expected a map node"));
        };
        let Some(DrawTree::Len { value: len, .. }) = children.first() else {
            return Err(ReplayError::Structure("map node missing length"));
        };
        if children.len() != len + 1 || *len < self.min || *len > self.max {
            return Err(ReplayError::OutOfRange);
        }
        let mut entries = Vec::with_capacity(*len);
        for child in &children[1..] {
            let DrawTree::Node { kind: NodeKind::Entry, children: pair } = child else {
                return Err(ReplayError::Structure("expected a map entry"));
            };
            let [kt, vt] = pair.as_slice() else {
                return Err(ReplayError::Structure("malformed map entry"));
            };
            entries.push((self.key.replay(kt)?, self.value.replay(vt)?));
        }
        Ok(Self::dedup(entries))
    }
}

/// One field of a [`RecordGen`].
pub struct RecordField {
    pub name: String,
    pub gen: GeneratorHandle,
    pub required: bool,
}

/// Records draw each required field independently; optional fields get an
/// include/exclude decision first. Shrinks field-wise in declaration order.
pub struct RecordGen {
    fields: Vec<RecordField>,
}

impl RecordGen {
    pub fn new(fields: Vec<RecordField>) -> Self {
        Self { fields }
    }
}

impl ValueGenerator for RecordGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let mut children = Vec::with_capacity(self.fields.len());
        let mut present = Vec::new();
        for field in &self.fields {
            if field.required {
                let (value, tree) = field.gen.draw(ctx);
                present.push((field.name.clone(), value));
                children.push(tree);
            } else if ctx.rng().gen_bool(0.5) {
                let (value, tree) = field.gen.draw(ctx);
                present.push((field.name.clone(), value));
                children.push(DrawTree::node(
                    NodeKind::Optional,
                    vec![DrawTree::Choice { index: 1, arity: 2 }, tree],
                ));
            } else {
                children.push(DrawTree::node(
                    NodeKind::Optional,
                    vec![DrawTree::Choice { index: 0, arity: 2 }],
                ));
            }
        }
        (GenValue::Record(present), DrawTree::node(NodeKind::Record, children))
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        let DrawTree::Node { kind: NodeKind::Record, children } = tree else {
            return Err(ReplayError::Structure("expected a record node"));
        };
        if children.len() != self.fields.len() {
            return Err(ReplayError::Structure("record arity mismatch"));
        }
        let mut present = Vec::new();
        for (field, child) in self.fields.iter().zip(children) {
            if field.required {
                present.push((field.name.clone(), field.gen.replay(child)?));
                continue;
            }
            let DrawTree::Node { kind: NodeKind::Optional, children: opt } = child else {
                return Err(ReplayError::Structure("expected an optional field node"));
            };
            match opt.as_slice() {
                [DrawTree::Choice { index: 0, .. }] => {}
                [DrawTree::Choice { index: 1, .. }, inner] => {
                    present.push((field.name.clone(), field.gen.replay(inner)?));
                }
                _ => return Err(ReplayError::Structure("malformed optional field node")),
            }
        }
        Ok(GenValue::Record(present))
    }
}

/// Choose one variant uniformly; shrinks toward the lowest-index variant,
/// then within it.
pub struct OneOfGen {
    variants: Vec<GeneratorHandle>,
}

impl OneOfGen {
    pub fn new(variants: Vec<GeneratorHandle>) -> Self {
        Self { variants }
    }
}

impl ValueGenerator for OneOfGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let index = ctx.rng().gen_range(0..self.variants.len());
        let (value, tree) = self.variants[index].draw(ctx);
        (
            value,
            DrawTree::node(
                NodeKind::OneOf,
                vec![DrawTree::Choice { index, arity: self.variants.len() }, tree],
            ),
        )
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        let DrawTree::Node { kind: NodeKind::OneOf, children } = tree else {
            return Err(ReplayError::Structure("expected a one-of node"));
        };
        let [DrawTree::Choice { index, .. }, inner] = children.as_slice() else {
            return Err(ReplayError::Structure("malformed one-of node"));
        };
        if *index >= self.variants.len() {
            return Err(ReplayError::OutOfRange);
        }
        self.variants[*index].replay(inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtin::{IntGen, StrGen};
    use crate::generator::DrawCtx;
    use crate::rng::rng_for;

    fn int_handle() -> GeneratorHandle {
        Arc::new(IntGen::default())
    }

    #[test]
    fn optional_draws_both_arms_and_replays() {
        let gen = OptionalGen::new(int_handle());
        let mut rng = rng_for(5);
        let mut some = 0;
        let mut none = 0;
        for _ in 0..100 {
            let mut ctx = DrawCtx::new(&mut rng, 100, 3);
            let (value, tree) = gen.draw(&mut ctx);
            match &value {
                GenValue::Null => none += 1,
                GenValue::Int(_) => some += 1,
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(gen.replay(&tree).unwrap(), value);
        }
        assert!(some > 20 && none > 20, "some={some} none={none}");
    }

    #[test]
    fn seq_length_respects_bounds() {
        let gen = SeqGen::new(int_handle(), 2, 5);
        let mut rng = rng_for(6);
        for _ in 0..50 {
            let mut ctx = DrawCtx::new(&mut rng, 100, 3);
            let (value, tree) = gen.draw(&mut ctx);
            let GenValue::Seq(items) = &value else { panic!() };
            assert!((2..=5).contains(&items.len()));
            assert_eq!(gen.replay(&tree).unwrap(), value);
        }
    }

    #[test]
    fn seq_replay_rejects_length_below_min() {
        let gen = SeqGen::new(int_handle(), 2, 5);
        let tree = DrawTree::node(
            NodeKind::Seq,
            vec![
                DrawTree::Len { value: 1, lo: 2, hi: 5 },
                DrawTree::Int { value: 0, lo: -1000, hi: 1000, origin: 0 },
            ],
        );
        assert_eq!(gen.replay(&tree), Err(ReplayError::OutOfRange));
    }

    #[test]
    fn map_dedups_on_rendered_key() {
        let gen = MapGen::new(
            Arc::new(StrGen::new(1, 1)),
            int_handle(),
            0,
            10,
        );
        let mut rng = rng_for(7);
        let mut ctx = DrawCtx::new(&mut rng, 100, 3);
        for _ in 0..20 {
            let (value, tree) = gen.draw(&mut ctx);
            let GenValue::Map(entries) = &value else { panic!() };
            let mut keys: Vec<String> =
                entries.iter().map(|(k, _)| k.render_scalar().unwrap()).collect();
            let before = keys.len();
            keys.dedup();
            assert_eq!(keys.len(), before, "duplicate keys survived");
            assert_eq!(gen.replay(&tree).unwrap(), value);
        }
    }

    #[test]
    fn record_keeps_declaration_order_and_replays() {
        let gen = RecordGen::new(vec![
            RecordField { name: "a".into(), gen: int_handle(), required: true },
            RecordField { name: "b".into(), gen: int_handle(), required: false },
            RecordField { name: "c".into(), gen: int_handle(), required: true },
        ]);
        let mut rng = rng_for(8);
        for _ in 0..30 {
            let mut ctx = DrawCtx::new(&mut rng, 100, 3);
            let (value, tree) = gen.draw(&mut ctx);
            let GenValue::Record(fields) = &value else { panic!() };
            let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
            assert!(names == ["a", "b", "c"] || names == ["a", "c"]);
            assert_eq!(gen.replay(&tree).unwrap(), value);
        }
    }

    #[test]
    fn one_of_replay_follows_recorded_variant() {
        let gen = OneOfGen::new(vec![int_handle(), Arc::new(StrGen::new(1, 3))]);
        let mut rng = rng_for(9);
        for _ in 0..30 {
            let mut ctx = DrawCtx::new(&mut rng, 100, 3);
            let (value, tree) = gen.draw(&mut ctx);
            assert_eq!(gen.replay(&tree).unwrap(), value);
            let _ = rng.gen::<u8>();
        }
    }
}
