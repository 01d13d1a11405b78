//! The type registry: a stack-of-maps binding `TypeRef` to generators.
//!
//! Mutated only during setup (`register`, `register_many`) and through
//! `scoped` overrides; a run holds an immutable [`RegistrySnapshot`] that
//! is shared read-only across tasks.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use smolder_core::{GenValue, Primitive, SchemaTable, TypeRef};

use crate::builtin::{
    BoolGen, BytesGen, DateGen, DateTimeGen, EnumGen, FloatGen, IntGen, StrGen, UuidGen,
};
use crate::combine::{MapGen, OneOfGen, OptionalGen, RecordField, RecordGen, SeqGen};
use crate::error::{GenError, ReplayError};
use crate::generator::{DrawCtx, GeneratorHandle, ValueGenerator};
use crate::tree::{DrawTree, NodeKind};

/// Default `Ref` recursion budget before minimal expansion kicks in.
const DEFAULT_REF_DEPTH: usize = 3;

struct RegistryInner {
    entries: HashMap<TypeRef, GeneratorHandle>,
    schemas: SchemaTable,
    max_ref_depth: usize,
    next_scope_id: u64,
    scope_stack: Vec<u64>,
}

/// Registry of generators keyed by `TypeRef`.
///
/// Built-in primitive generators are installed at construction. Cloning the
/// registry clones the handle; all clones see the same bindings.
#[derive(Clone)]
pub struct TypeRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut entries: HashMap<TypeRef, GeneratorHandle> = HashMap::new();
        entries.insert(TypeRef::STR, Arc::new(StrGen::default()));
        entries.insert(TypeRef::INT, Arc::new(IntGen::default()));
        entries.insert(TypeRef::FLOAT, Arc::new(FloatGen::default()));
        entries.insert(TypeRef::BOOL, Arc::new(BoolGen));
        entries.insert(TypeRef::BYTES, Arc::new(BytesGen::default()));
        entries.insert(TypeRef::UUID, Arc::new(UuidGen));
        entries.insert(TypeRef::DATETIME, Arc::new(DateTimeGen));
        entries.insert(TypeRef::DATE, Arc::new(DateGen));
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                entries,
                schemas: SchemaTable::new(),
                max_ref_depth: DEFAULT_REF_DEPTH,
                next_scope_id: 0,
                scope_stack: Vec::new(),
            })),
        }
    }

    /// Survive lock poisoning: a panic inside a scope guard's critical
    /// section must not wedge every later `resolve`.
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach the schema table used to resolve `Ref` nodes.
    pub fn set_schemas(&self, schemas: SchemaTable) {
        self.lock().schemas = schemas;
    }

    /// Register one named schema.
    pub fn register_schema(&self, name: impl Into<String>, ty: TypeRef) {
        self.lock().schemas.insert(name, ty);
    }

    /// Change the `Ref` recursion budget (default 3).
    pub fn set_ref_depth(&self, depth: usize) {
        self.lock().max_ref_depth = depth;
    }

    /// Insert a generator for a type.
    ///
    /// Fails with `AlreadyRegistered` when a binding exists and `override_`
    /// is false.
    pub fn register(
        &self,
        ty: TypeRef,
        gen: GeneratorHandle,
        override_: bool,
    ) -> Result<(), GenError> {
        let mut inner = self.lock();
        if !override_ && inner.entries.contains_key(&ty) {
            return Err(GenError::AlreadyRegistered(ty));
        }
        inner.entries.insert(ty, gen);
        Ok(())
    }

    /// Remove a binding, returning it if present.
    pub fn unregister(&self, ty: &TypeRef) -> Option<GeneratorHandle> {
        self.lock().entries.remove(ty)
    }

    /// Register a batch atomically: if any key is already bound, nothing is
    /// inserted.
    pub fn register_many(
        &self,
        mapping: Vec<(TypeRef, GeneratorHandle)>,
    ) -> Result<(), GenError> {
        let mut inner = self.lock();
        for (ty, _) in &mapping {
            if inner.entries.contains_key(ty) {
                return Err(GenError::AlreadyRegistered(ty.clone()));
            }
        }
        for (ty, gen) in mapping {
            inner.entries.insert(ty, gen);
        }
        Ok(())
    }

    /// Push-down override, restored when the returned guard is released.
    ///
    /// Scopes nest; releases are LIFO and idempotent, and run on every exit
    /// path including unwinding.
    pub fn scoped(&self, ty: TypeRef, gen: GeneratorHandle) -> ScopeGuard {
        let mut inner = self.lock();
        let id = inner.next_scope_id;
        inner.next_scope_id += 1;
        inner.scope_stack.push(id);
        let prev = inner.entries.insert(ty.clone(), gen);
        ScopeGuard { registry: self.clone(), ty: Some(ty), prev, id }
    }

    fn restore(&self, id: u64, ty: TypeRef, prev: Option<GeneratorHandle>) {
        let mut inner = self.lock();
        debug_assert_eq!(
            inner.scope_stack.last(),
            Some(&id),
            "scope guards must be released in LIFO order"
        );
        inner.scope_stack.retain(|s| *s != id);
        match prev {
            Some(gen) => inner.entries.insert(ty, gen),
            None => inner.entries.remove(&ty),
        };
    }

    /// Freeze the current bindings for a run.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.lock();
        RegistrySnapshot {
            inner: Arc::new(SnapshotInner {
                entries: inner.entries.clone(),
                schemas: inner.schemas.clone(),
                max_ref_depth: inner.max_ref_depth,
            }),
        }
    }

    /// Resolve against the current bindings. Equivalent to
    /// `self.snapshot().resolve(ty)`.
    pub fn resolve(&self, ty: &TypeRef) -> Result<GeneratorHandle, GenError> {
        self.snapshot().resolve(ty)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a `scoped` override.
///
/// Dropping releases; `release` may also be called explicitly and is
/// idempotent.
pub struct ScopeGuard {
    registry: TypeRegistry,
    ty: Option<TypeRef>,
    prev: Option<GeneratorHandle>,
    id: u64,
}

impl ScopeGuard {
    /// Restore the binding this scope replaced. Safe to call twice.
    pub fn release(&mut self) {
        if let Some(ty) = self.ty.take() {
            self.registry.restore(self.id, ty, self.prev.take());
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.release();
    }
}

struct SnapshotInner {
    entries: HashMap<TypeRef, GeneratorHandle>,
    schemas: SchemaTable,
    max_ref_depth: usize,
}

/// An immutable view of the registry taken for one run.
#[derive(Clone)]
pub struct RegistrySnapshot {
    inner: Arc<SnapshotInner>,
}

impl RegistrySnapshot {
    pub fn schemas(&self) -> &SchemaTable {
        &self.inner.schemas
    }

    pub fn max_ref_depth(&self) -> usize {
        self.inner.max_ref_depth
    }

    /// Resolve a type to a generator.
    ///
    /// Deterministic resolution order: registered exact match, then (for
    /// `Ref`) a structural match on the referenced schema body, then
    /// fallback synthesis from the built-ins and combinators. Fails with
    /// `UnsupportedType` only when synthesis reaches a leaf nothing is
    /// registered for.
    pub fn resolve(&self, ty: &TypeRef) -> Result<GeneratorHandle, GenError> {
        self.check_resolvable(ty, &mut HashSet::new())?;
        self.resolve_unchecked(ty)
    }

    fn resolve_unchecked(&self, ty: &TypeRef) -> Result<GeneratorHandle, GenError> {
        if let Some(gen) = self.inner.entries.get(ty) {
            return Ok(gen.clone());
        }
        match ty {
            TypeRef::Primitive(_) => Err(GenError::UnsupportedType(ty.clone())),
            TypeRef::Optional(inner) => {
                Ok(Arc::new(OptionalGen::new(self.resolve_unchecked(inner)?)))
            }
            TypeRef::Seq { item, min, max } => {
                Ok(Arc::new(SeqGen::new(self.resolve_unchecked(item)?, *min, *max)))
            }
            TypeRef::Map { key, value, min, max } => Ok(Arc::new(MapGen::new(
                self.resolve_unchecked(key)?,
                self.resolve_unchecked(value)?,
                *min,
                *max,
            ))),
            TypeRef::Enum(values) => {
                if values.is_empty() {
                    return Err(GenError::UnsupportedType(ty.clone()));
                }
                Ok(Arc::new(EnumGen::new(values.clone())))
            }
            TypeRef::Record { fields } => {
                let mut lowered = Vec::with_capacity(fields.len());
                for field in fields {
                    lowered.push(RecordField {
                        name: field.name.clone(),
                        gen: self.resolve_unchecked(&field.ty)?,
                        required: field.required,
                    });
                }
                Ok(Arc::new(RecordGen::new(lowered)))
            }
            TypeRef::OneOf(variants) => {
                if variants.is_empty() {
                    return Err(GenError::UnsupportedType(ty.clone()));
                }
                let lowered = variants
                    .iter()
                    .map(|v| self.resolve_unchecked(v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(OneOfGen::new(lowered)))
            }
            TypeRef::Ref(name) => {
                let target = self
                    .inner
                    .schemas
                    .get(name)
                    .ok_or_else(|| GenError::UnresolvedRef(name.clone()))?;
                if let Some(gen) = self.inner.entries.get(target) {
                    return Ok(gen.clone());
                }
                // Recursive expansion must bottom out somewhere.
                self.minimal(&TypeRef::Ref(name.clone()), &mut Vec::new())
                    .map_err(|_| GenError::NoFiniteExpansion(name.clone()))?;
                Ok(Arc::new(RefGen { name: name.clone(), snapshot: self.clone() }))
            }
        }
    }

    /// Verify every leaf reachable from `ty` resolves, following refs at
    /// most once each. Keeps the lazy `Ref` path from failing mid-draw.
    fn check_resolvable(&self, ty: &TypeRef, visited: &mut HashSet<String>) -> Result<(), GenError> {
        if self.inner.entries.contains_key(ty) {
            return Ok(());
        }
        match ty {
            TypeRef::Primitive(_) => Err(GenError::UnsupportedType(ty.clone())),
            TypeRef::Optional(inner) => self.check_resolvable(inner, visited),
            TypeRef::Seq { item, .. } => self.check_resolvable(item, visited),
            TypeRef::Map { key, value, .. } => {
                self.check_resolvable(key, visited)?;
                self.check_resolvable(value, visited)
            }
            TypeRef::Enum(values) => {
                if values.is_empty() {
                    Err(GenError::UnsupportedType(ty.clone()))
                } else {
                    Ok(())
                }
            }
            TypeRef::Record { fields } => {
                for field in fields {
                    self.check_resolvable(&field.ty, visited)?;
                }
                Ok(())
            }
            TypeRef::OneOf(variants) => {
                if variants.is_empty() {
                    return Err(GenError::UnsupportedType(ty.clone()));
                }
                for v in variants {
                    self.check_resolvable(v, visited)?;
                }
                Ok(())
            }
            TypeRef::Ref(name) => {
                if !visited.insert(name.clone()) {
                    return Ok(());
                }
                let target = self
                    .inner
                    .schemas
                    .get(name)
                    .ok_or_else(|| GenError::UnresolvedRef(name.clone()))?;
                self.check_resolvable(target, visited)
            }
        }
    }

    /// The canonical minimal expansion of a type: optionals become none,
    /// sums take their most-default (lowest viable) variant, collections
    /// take their minimum length. Used when a `Ref` hits the recursion
    /// budget; the returned tree replays through the same generators a
    /// fresh draw would use.
    fn minimal(
        &self,
        ty: &TypeRef,
        stack: &mut Vec<String>,
    ) -> Result<(GenValue, DrawTree), GenError> {
        match ty {
            TypeRef::Primitive(p) => Ok(minimal_primitive(*p)),
            TypeRef::Optional(_) => Ok((
                GenValue::Null,
                DrawTree::node(NodeKind::Optional, vec![DrawTree::Choice { index: 0, arity: 2 }]),
            )),
            TypeRef::Seq { item, min, max } => {
                let mut children =
                    vec![DrawTree::Len { value: *min, lo: *min, hi: (*max).max(*min) }];
                let mut items = Vec::with_capacity(*min);
                for _ in 0..*min {
                    let (v, t) = self.minimal(item, stack)?;
                    items.push(v);
                    children.push(t);
                }
                Ok((GenValue::Seq(items), DrawTree::node(NodeKind::Seq, children)))
            }
            TypeRef::Map { key, value, min, max } => {
                let mut children =
                    vec![DrawTree::Len { value: *min, lo: *min, hi: (*max).max(*min) }];
                let mut entries = Vec::with_capacity(*min);
                for _ in 0..*min {
                    let (k, kt) = self.minimal(key, stack)?;
                    let (v, vt) = self.minimal(value, stack)?;
                    entries.push((k, v));
                    children.push(DrawTree::node(NodeKind::Entry, vec![kt, vt]));
                }
                Ok((GenValue::Map(entries), DrawTree::node(NodeKind::Seq, children)))
            }
            TypeRef::Enum(values) => {
                let first = values
                    .first()
                    .ok_or_else(|| GenError::UnsupportedType(ty.clone()))?;
                Ok((
                    GenValue::Str(first.clone()),
                    DrawTree::Choice { index: 0, arity: values.len() },
                ))
            }
            TypeRef::Record { fields } => {
                let mut children = Vec::with_capacity(fields.len());
                let mut present = Vec::new();
                for field in fields {
                    if field.required {
                        let (v, t) = self.minimal(&field.ty, stack)?;
                        present.push((field.name.clone(), v));
                        children.push(t);
                    } else {
                        children.push(DrawTree::node(
                            NodeKind::Optional,
                            vec![DrawTree::Choice { index: 0, arity: 2 }],
                        ));
                    }
                }
                Ok((GenValue::Record(present), DrawTree::node(NodeKind::Record, children)))
            }
            TypeRef::OneOf(variants) => {
                for (index, variant) in variants.iter().enumerate() {
                    if let Ok((v, t)) = self.minimal(variant, stack) {
                        return Ok((
                            v,
                            DrawTree::node(
                                NodeKind::OneOf,
                                vec![
                                    DrawTree::Choice { index, arity: variants.len() },
                                    t,
                                ],
                            ),
                        ));
                    }
                }
                Err(GenError::UnsupportedType(ty.clone()))
            }
            TypeRef::Ref(name) => {
                if stack.contains(name) {
                    return Err(GenError::NoFiniteExpansion(name.clone()));
                }
                let target = self
                    .inner
                    .schemas
                    .get(name)
                    .ok_or_else(|| GenError::UnresolvedRef(name.clone()))?
                    .clone();
                stack.push(name.clone());
                let out = self.minimal(&target, stack);
                stack.pop();
                out
            }
        }
    }
}

/// Canonical minimal draws for primitives, shaped exactly like the
/// corresponding built-in generator's trees so replay works.
fn minimal_primitive(p: Primitive) -> (GenValue, DrawTree) {
    match p {
        Primitive::Str => (
            GenValue::Str("0".into()),
            DrawTree::node(
                NodeKind::Text,
                vec![
                    DrawTree::Len { value: 1, lo: 1, hi: 100 },
                    DrawTree::Choice { index: 0, arity: 62 },
                ],
            ),
        ),
        Primitive::Int => (
            GenValue::Int(0),
            DrawTree::Int { value: 0, lo: -1000, hi: 1000, origin: 0 },
        ),
        Primitive::Float => (GenValue::Float(0.0), DrawTree::Float { value: 0.0, origin: 0.0 }),
        Primitive::Bool => (GenValue::Bool(false), DrawTree::Choice { index: 0, arity: 2 }),
        Primitive::Bytes => (
            GenValue::Bytes(vec![0]),
            DrawTree::node(
                NodeKind::Blob,
                vec![
                    DrawTree::Len { value: 1, lo: 1, hi: 100 },
                    DrawTree::Int { value: 0, lo: 0, hi: 255, origin: 0 },
                ],
            ),
        ),
        Primitive::Uuid => (
            GenValue::Uuid(uuid::Uuid::nil()),
            DrawTree::node(
                NodeKind::Uuid,
                vec![
                    DrawTree::Int { value: 0, lo: i64::MIN, hi: i64::MAX, origin: 0 },
                    DrawTree::Int { value: 0, lo: i64::MIN, hi: i64::MAX, origin: 0 },
                ],
            ),
        ),
        Primitive::DateTime => (
            GenValue::DateTime(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH),
            DrawTree::Int { value: 0, lo: -2_208_988_800, hi: 4_102_444_800, origin: 0 },
        ),
        Primitive::Date => (
            GenValue::Date(chrono::NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date")),
            DrawTree::Int { value: 0, lo: -25_567, hi: 47_482, origin: 0 },
        ),
    }
}

/// Lazy indirection through the schema table for recursive schemas.
///
/// Draws descend with the context's recursion budget; at the limit the
/// target's minimal expansion is taken instead, so expansion always
/// terminates.
struct RefGen {
    name: String,
    snapshot: RegistrySnapshot,
}

impl RefGen {
    fn target(&self) -> GeneratorHandle {
        let target_ty = self
            .snapshot
            .inner
            .schemas
            .get(&self.name)
            .expect("ref target checked at resolve time")
            .clone();
        self.snapshot
            .resolve_unchecked(&target_ty)
            .expect("ref target checked at resolve time")
    }
}

impl ValueGenerator for RefGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        if ctx.at_ref_depth_limit() {
            return self
                .snapshot
                .minimal(&TypeRef::Ref(self.name.clone()), &mut Vec::new())
                .expect("finite expansion checked at resolve time");
        }
        let target = self.target();
        ctx.descend(|ctx| target.draw(ctx))
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        self.target().replay(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::ConstGen;
    use crate::rng::rng_for;
    use smolder_core::Field;

    fn const_int(n: i64) -> GeneratorHandle {
        Arc::new(ConstGen::new(GenValue::Int(n)))
    }

    #[test]
    fn register_rejects_duplicates_without_override() {
        let registry = TypeRegistry::new();
        let err = registry.register(TypeRef::INT, const_int(1), false).unwrap_err();
        assert!(matches!(err, GenError::AlreadyRegistered(_)));
        registry.register(TypeRef::INT, const_int(1), true).unwrap();
    }

    #[test]
    fn register_many_is_atomic() {
        let registry = TypeRegistry::new();
        let custom = TypeRef::reference("Widget");
        let err = registry
            .register_many(vec![(custom.clone(), const_int(1)), (TypeRef::INT, const_int(2))])
            .unwrap_err();
        assert!(matches!(err, GenError::AlreadyRegistered(_)));
        // The non-conflicting entry must not have been inserted.
        let registry_inner = registry.lock();
        assert!(!registry_inner.entries.contains_key(&custom));
    }

    #[test]
    fn scoped_override_restores_on_release() {
        let registry = TypeRegistry::new();
        let snapshot_before = registry.snapshot();
        {
            let _guard = registry.scoped(TypeRef::INT, const_int(7));
            let gen = registry.resolve(&TypeRef::INT).unwrap();
            let mut rng = rng_for(0);
            let mut ctx = DrawCtx::new(&mut rng, 100, 3);
            assert_eq!(gen.draw(&mut ctx).0, GenValue::Int(7));
        }
        // Prior binding restored: draws are range-limited again.
        let gen = registry.resolve(&TypeRef::INT).unwrap();
        let mut rng = rng_for(0);
        let mut ctx = DrawCtx::new(&mut rng, 100, 3);
        let GenValue::Int(v) = gen.draw(&mut ctx).0 else { panic!() };
        assert!((-1000..=1000).contains(&v));
        drop(snapshot_before);
    }

    #[test]
    fn scoped_release_is_idempotent() {
        let registry = TypeRegistry::new();
        let mut guard = registry.scoped(TypeRef::INT, const_int(7));
        guard.release();
        guard.release();
        drop(guard);
        let gen = registry.resolve(&TypeRef::INT).unwrap();
        let mut rng = rng_for(0);
        let mut ctx = DrawCtx::new(&mut rng, 100, 3);
        let GenValue::Int(v) = gen.draw(&mut ctx).0 else { panic!() };
        assert!((-1000..=1000).contains(&v));
    }

    #[test]
    fn snapshot_is_isolated_from_later_registration() {
        let registry = TypeRegistry::new();
        let snapshot = registry.snapshot();
        registry.register(TypeRef::INT, const_int(9), true).unwrap();
        let gen = snapshot.resolve(&TypeRef::INT).unwrap();
        let mut rng = rng_for(0);
        let mut ctx = DrawCtx::new(&mut rng, 100, 3);
        let GenValue::Int(v) = gen.draw(&mut ctx).0 else { panic!() };
        assert!((-1000..=1000).contains(&v), "snapshot saw the later override");
    }

    #[test]
    fn synthesizes_composites() {
        let registry = TypeRegistry::new();
        let ty = TypeRef::record(vec![
            Field::required("id", TypeRef::INT),
            Field::optional("tags", TypeRef::seq(TypeRef::STR, 0, 3)),
        ]);
        let gen = registry.resolve(&ty).unwrap();
        let mut rng = rng_for(1);
        let mut ctx = DrawCtx::new(&mut rng, 100, 3);
        let (value, tree) = gen.draw(&mut ctx);
        assert_eq!(gen.replay(&tree).unwrap(), value);
    }

    #[test]
    fn unresolved_ref_is_an_error() {
        let registry = TypeRegistry::new();
        let err = registry.resolve(&TypeRef::reference("Ghost")).err().unwrap();
        assert!(matches!(err, GenError::UnresolvedRef(_)));
    }

    #[test]
    fn recursive_schema_bottoms_out() {
        let registry = TypeRegistry::new();
        registry.register_schema(
            "Node",
            TypeRef::record(vec![
                Field::required("label", TypeRef::STR),
                Field::optional("next", TypeRef::reference("Node")),
            ]),
        );
        let gen = registry.resolve(&TypeRef::reference("Node")).unwrap();
        let mut rng = rng_for(3);
        for _ in 0..50 {
            let mut ctx = DrawCtx::new(&mut rng, 100, 3);
            let (value, tree) = gen.draw(&mut ctx);
            assert_eq!(gen.replay(&tree).unwrap(), value);
        }
    }

    #[test]
    fn infinite_schema_is_rejected() {
        let registry = TypeRegistry::new();
        registry.register_schema(
            "Loop",
            TypeRef::record(vec![Field::required("next", TypeRef::reference("Loop"))]),
        );
        let err = registry.resolve(&TypeRef::reference("Loop")).err().unwrap();
        assert!(matches!(err, GenError::NoFiniteExpansion(_)));
    }
}
