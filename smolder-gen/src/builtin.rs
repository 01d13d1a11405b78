//! Built-in primitive generators.
//!
//! These are registered for every `Primitive` tag when a registry is
//! constructed. Ranges are the engine defaults; register your own generator
//! to change them for a run, or use `scoped` for one route.

use chrono::{NaiveDate, TimeZone, Utc};
use rand::Rng;
use uuid::Uuid;

use smolder_core::GenValue;

use crate::error::ReplayError;
use crate::generator::{DrawCtx, ValueGenerator};
use crate::tree::{DrawTree, NodeKind};

/// Code points sampled by [`StrGen`]: digits, then upper, then lower, in
/// code-point order so index 0 is the alphabetically least character.
pub const DEFAULT_ALPHABET: &[u8] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Timestamps are drawn from 1900-01-01 to 2100-01-01 UTC.
const MIN_TIMESTAMP: i64 = -2_208_988_800;
const MAX_TIMESTAMP: i64 = 4_102_444_800;

/// Dates cover the same window, counted in days from the Unix epoch.
const MIN_EPOCH_DAY: i64 = -25_567;
const MAX_EPOCH_DAY: i64 = 47_482;

/// Uniform integers in `[lo, hi]`, shrinking toward 0 (clamped into range).
#[derive(Debug, Clone)]
pub struct IntGen {
    lo: i64,
    hi: i64,
    origin: i64,
}

impl IntGen {
    pub fn new(lo: i64, hi: i64) -> Self {
        Self { lo, hi, origin: 0i64.clamp(lo, hi) }
    }
}

impl Default for IntGen {
    fn default() -> Self {
        Self::new(-1000, 1000)
    }
}

impl ValueGenerator for IntGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let value = ctx.rng().gen_range(self.lo..=self.hi);
        (
            GenValue::Int(value),
            DrawTree::Int { value, lo: self.lo, hi: self.hi, origin: self.origin },
        )
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        match tree {
            DrawTree::Int { value, .. } if (self.lo..=self.hi).contains(value) => {
                Ok(GenValue::Int(*value))
            }
            DrawTree::Int { .. } => Err(ReplayError::OutOfRange),
            _ => Err(ReplayError::Structure("expected an int leaf")),
        }
    }
}

/// Finite floats in `[lo, hi]`; never NaN, never infinite. Shrinks toward
/// 0.0.
#[derive(Debug, Clone)]
pub struct FloatGen {
    lo: f64,
    hi: f64,
    origin: f64,
}

impl FloatGen {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi, origin: 0.0f64.clamp(lo, hi) }
    }
}

impl Default for FloatGen {
    fn default() -> Self {
        Self::new(-1000.0, 1000.0)
    }
}

impl ValueGenerator for FloatGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let value = ctx.rng().gen_range(self.lo..=self.hi);
        (GenValue::Float(value), DrawTree::Float { value, origin: self.origin })
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        match tree {
            DrawTree::Float { value, .. } if value.is_finite() => Ok(GenValue::Float(*value)),
            DrawTree::Float { .. } => Err(ReplayError::OutOfRange),
            _ => Err(ReplayError::Structure("expected a float leaf")),
        }
    }
}

/// Uniform booleans, shrinking to `false`.
#[derive(Debug, Clone, Default)]
pub struct BoolGen;

impl ValueGenerator for BoolGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let index = usize::from(ctx.rng().gen_bool(0.5));
        (GenValue::Bool(index == 1), DrawTree::Choice { index, arity: 2 })
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        match tree {
            DrawTree::Choice { index, arity: 2 } if *index < 2 => Ok(GenValue::Bool(*index == 1)),
            DrawTree::Choice { .. } => Err(ReplayError::OutOfRange),
            _ => Err(ReplayError::Structure("expected a bool choice")),
        }
    }
}

/// Strings of `[min, max]` code points sampled from an alphabet.
///
/// The default alphabet is alphanumeric, which is also URL-safe, so the
/// same generator backs both body strings and path parameters; path usage
/// keeps `min >= 1` so a drawn value can never collapse a segment.
#[derive(Debug, Clone)]
pub struct StrGen {
    min: usize,
    max: usize,
    alphabet: Vec<char>,
}

impl StrGen {
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            min,
            max: max.max(min),
            alphabet: DEFAULT_ALPHABET.iter().map(|b| *b as char).collect(),
        }
    }

    pub fn with_alphabet(mut self, alphabet: impl IntoIterator<Item = char>) -> Self {
        self.alphabet = alphabet.into_iter().collect();
        self
    }

    fn effective_max(&self, ctx: &DrawCtx<'_>) -> usize {
        self.max.min(ctx.size()).max(self.min)
    }
}

impl Default for StrGen {
    fn default() -> Self {
        Self::new(1, 100)
    }
}

impl ValueGenerator for StrGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let hi = self.effective_max(ctx);
        let len = ctx.rng().gen_range(self.min..=hi);
        let mut children = Vec::with_capacity(len + 1);
        children.push(DrawTree::Len { value: len, lo: self.min, hi });
        let mut out = String::with_capacity(len);
        for _ in 0..len {
            let index = ctx.rng().gen_range(0..self.alphabet.len());
            out.push(self.alphabet[index]);
            children.push(DrawTree::Choice { index, arity: self.alphabet.len() });
        }
        (GenValue::Str(out), DrawTree::node(NodeKind::Text, children))
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        let DrawTree::Node { kind: NodeKind::Text, children } = tree else {
            return Err(ReplayError::Structure("expected a text node"));
        };
        let Some(DrawTree::Len { value: len, .. }) = children.first() else {
            return Err(ReplayError::Structure("text node missing length"));
        };
        if children.len() != len + 1 || *len < self.min || *len > self.max {
            return Err(ReplayError::OutOfRange);
        }
        let mut out = String::with_capacity(*len);
        for child in &children[1..] {
            match child {
                DrawTree::Choice { index, .. } if *index < self.alphabet.len() => {
                    out.push(self.alphabet[*index]);
                }
                DrawTree::Choice { .. } => return Err(ReplayError::OutOfRange),
                _ => return Err(ReplayError::Structure("expected a code-point choice")),
            }
        }
        Ok(GenValue::Str(out))
    }
}

/// Byte strings of `[min, max]` bytes, shrinking toward empty.
#[derive(Debug, Clone)]
pub struct BytesGen {
    min: usize,
    max: usize,
}

impl BytesGen {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max: max.max(min) }
    }
}

impl Default for BytesGen {
    fn default() -> Self {
        Self::new(1, 100)
    }
}

impl ValueGenerator for BytesGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let hi = self.max.min(ctx.size()).max(self.min);
        let len = ctx.rng().gen_range(self.min..=hi);
        let mut children = Vec::with_capacity(len + 1);
        children.push(DrawTree::Len { value: len, lo: self.min, hi });
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            let byte = ctx.rng().gen_range(0..=255i64);
            out.push(byte as u8);
            children.push(DrawTree::Int { value: byte, lo: 0, hi: 255, origin: 0 });
        }
        (GenValue::Bytes(out), DrawTree::node(NodeKind::Blob, children))
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        let DrawTree::Node { kind: NodeKind::Blob, children } = tree else {
            return Err(ReplayError::Structure("expected a blob node"));
        };
        let Some(DrawTree::Len { value: len, .. }) = children.first() else {
            return Err(ReplayError::Structure("blob node missing length"));
        };
        if children.len() != len + 1 || *len < self.min || *len > self.max {
            return Err(ReplayError::OutOfRange);
        }
        let mut out = Vec::with_capacity(*len);
        for child in &children[1..] {
            match child {
                DrawTree::Int { value, .. } if (0..=255).contains(value) => {
                    out.push(*value as u8);
                }
                DrawTree::Int { .. } => return Err(ReplayError::OutOfRange),
                _ => return Err(ReplayError::Structure("expected a byte leaf")),
            }
        }
        Ok(GenValue::Bytes(out))
    }
}

/// Uniform v4 UUIDs, shrinking to the nil UUID.
///
/// Drawn as two full-range integer leaves; when both shrink to zero the
/// materialized value is `Uuid::nil()` rather than a versioned UUID, which
/// is the canonical smallest reproducer.
#[derive(Debug, Clone, Default)]
pub struct UuidGen;

fn uuid_from_halves(hi: i64, lo: i64) -> Uuid {
    if hi == 0 && lo == 0 {
        return Uuid::nil();
    }
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&hi.to_be_bytes());
    bytes[8..].copy_from_slice(&lo.to_be_bytes());
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

impl ValueGenerator for UuidGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let hi = ctx.rng().gen::<i64>();
        let lo = ctx.rng().gen::<i64>();
        let children = vec![
            DrawTree::Int { value: hi, lo: i64::MIN, hi: i64::MAX, origin: 0 },
            DrawTree::Int { value: lo, lo: i64::MIN, hi: i64::MAX, origin: 0 },
        ];
        (
            GenValue::Uuid(uuid_from_halves(hi, lo)),
            DrawTree::node(NodeKind::Uuid, children),
        )
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        let DrawTree::Node { kind: NodeKind::Uuid, children } = tree else {
            return Err(ReplayError::Structure("expected a uuid node"));
        };
        match children.as_slice() {
            [DrawTree::Int { value: hi, .. }, DrawTree::Int { value: lo, .. }] => {
                Ok(GenValue::Uuid(uuid_from_halves(*hi, *lo)))
            }
            _ => Err(ReplayError::Structure("uuid node needs two int leaves")),
        }
    }
}

/// UTC timestamps between 1900 and 2100, shrinking toward the Unix epoch.
#[derive(Debug, Clone, Default)]
pub struct DateTimeGen;

impl ValueGenerator for DateTimeGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let secs = ctx.rng().gen_range(MIN_TIMESTAMP..=MAX_TIMESTAMP);
        let value = Utc
            .timestamp_opt(secs, 0)
            .single()
            .expect("timestamp range is representable");
        (
            GenValue::DateTime(value),
            DrawTree::Int { value: secs, lo: MIN_TIMESTAMP, hi: MAX_TIMESTAMP, origin: 0 },
        )
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        match tree {
            DrawTree::Int { value, .. }
                if (MIN_TIMESTAMP..=MAX_TIMESTAMP).contains(value) =>
            {
                Ok(GenValue::DateTime(
                    Utc.timestamp_opt(*value, 0)
                        .single()
                        .expect("timestamp range is representable"),
                ))
            }
            DrawTree::Int { .. } => Err(ReplayError::OutOfRange),
            _ => Err(ReplayError::Structure("expected a timestamp leaf")),
        }
    }
}

/// Calendar dates between 1900 and 2100, shrinking toward 1970-01-01.
#[derive(Debug, Clone, Default)]
pub struct DateGen;

fn date_from_epoch_day(day: i64) -> NaiveDate {
    NaiveDate::from_num_days_from_ce_opt(day as i32 + 719_163)
        .expect("epoch-day range is representable")
}

impl ValueGenerator for DateGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let day = ctx.rng().gen_range(MIN_EPOCH_DAY..=MAX_EPOCH_DAY);
        (
            GenValue::Date(date_from_epoch_day(day)),
            DrawTree::Int { value: day, lo: MIN_EPOCH_DAY, hi: MAX_EPOCH_DAY, origin: 0 },
        )
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        match tree {
            DrawTree::Int { value, .. }
                if (MIN_EPOCH_DAY..=MAX_EPOCH_DAY).contains(value) =>
            {
                Ok(GenValue::Date(date_from_epoch_day(*value)))
            }
            DrawTree::Int { .. } => Err(ReplayError::OutOfRange),
            _ => Err(ReplayError::Structure("expected an epoch-day leaf")),
        }
    }
}

/// One of a fixed set of string values, shrinking toward the first.
#[derive(Debug, Clone)]
pub struct EnumGen {
    values: Vec<String>,
}

impl EnumGen {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }
}

impl ValueGenerator for EnumGen {
    fn draw(&self, ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        let index = ctx.rng().gen_range(0..self.values.len());
        (
            GenValue::Str(self.values[index].clone()),
            DrawTree::Choice { index, arity: self.values.len() },
        )
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        match tree {
            DrawTree::Choice { index, .. } if *index < self.values.len() => {
                Ok(GenValue::Str(self.values[*index].clone()))
            }
            DrawTree::Choice { .. } => Err(ReplayError::OutOfRange),
            _ => Err(ReplayError::Structure("expected an enum choice")),
        }
    }
}

/// Always the same value; handy for pinning a parameter in tests or
/// overriding a type for one route.
#[derive(Debug, Clone)]
pub struct ConstGen {
    value: GenValue,
}

impl ConstGen {
    pub fn new(value: GenValue) -> Self {
        Self { value }
    }
}

impl ValueGenerator for ConstGen {
    fn draw(&self, _ctx: &mut DrawCtx<'_>) -> (GenValue, DrawTree) {
        (self.value.clone(), DrawTree::Choice { index: 0, arity: 1 })
    }

    fn replay(&self, tree: &DrawTree) -> Result<GenValue, ReplayError> {
        match tree {
            DrawTree::Choice { arity: 1, .. } => Ok(self.value.clone()),
            _ => Err(ReplayError::Structure("expected a const marker")),
        }
    }
}
