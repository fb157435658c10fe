//! Switch lowering.
//!
//! The key sits on top of the stack. Dense key sets become a jump table,
//! sparse ones a sorted lookup table; [`SwitchStrategy::Binary`] lowers to a
//! compare tree over a temporary local instead. All strategies dispatch the
//! same way, which the runtime tests check against each other.

use kiln_ir::Type;

use crate::code::CmpMode;
use crate::{CodeEmitter, EmitError, Label, Local};

/// Above this key-to-range ratio a jump table is used.
const TABLE_DENSITY: f64 = 0.5;

/// Widest range an explicitly requested table may span.
const MAX_TABLE_RANGE: i64 = 1 << 16;

/// How a switch is lowered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SwitchStrategy {
    /// Jump table indexed by `key - min`.
    Table,
    /// Sorted `(key, target)` pairs.
    Lookup,
    /// Compare tree over the sorted keys.
    Binary,
}

impl SwitchStrategy {
    /// Pick table or lookup by density `n / (max - min + 1)`.
    pub fn choose(keys: &[i32]) -> Self {
        match (keys.first(), keys.last()) {
            (Some(&min), Some(&max)) => {
                let range = (i64::from(max) - i64::from(min) + 1) as f64;
                if keys.len() as f64 / range > TABLE_DENSITY {
                    SwitchStrategy::Table
                } else {
                    SwitchStrategy::Lookup
                }
            }
            _ => SwitchStrategy::Lookup,
        }
    }
}

/// Case and default bodies of a switch.
///
/// `process_case` runs once per key in ascending order, then
/// `process_default` once. A case body should leave through `end` (or
/// return/throw); otherwise it falls through into the next case.
pub trait SwitchCallback {
    fn process_case(
        &mut self,
        e: &mut CodeEmitter<'_>,
        key: i32,
        end: Label,
    ) -> Result<(), EmitError>;

    fn process_default(&mut self, e: &mut CodeEmitter<'_>) -> Result<(), EmitError>;
}

fn check_ascending(keys: &[i32]) -> Result<(), EmitError> {
    match keys.windows(2).position(|w| w[0] >= w[1]) {
        Some(i) => Err(EmitError::UnsortedSwitchKeys { index: i + 1 }),
        None => Ok(()),
    }
}

impl CodeEmitter<'_> {
    /// Switch on the int on top of the stack, choosing the lowering by key
    /// density. `keys` must be strictly ascending.
    pub fn process_switch(
        &mut self,
        keys: &[i32],
        callback: &mut dyn SwitchCallback,
    ) -> Result<(), EmitError> {
        self.process_switch_with(keys, SwitchStrategy::choose(keys), callback)
    }

    /// Switch with an explicit lowering.
    pub fn process_switch_with(
        &mut self,
        keys: &[i32],
        strategy: SwitchStrategy,
        callback: &mut dyn SwitchCallback,
    ) -> Result<(), EmitError> {
        check_ascending(keys)?;
        let def = self.make_label();
        let end = self.make_label();

        let (Some(&low), Some(&high)) = (keys.first(), keys.last()) else {
            self.pop();
            callback.process_default(self)?;
            self.mark(end);
            return Ok(());
        };

        let labels: Vec<Label> = keys.iter().map(|_| self.make_label()).collect();
        let range = i64::from(high) - i64::from(low) + 1;
        let strategy = match strategy {
            SwitchStrategy::Table if range > MAX_TABLE_RANGE => SwitchStrategy::Lookup,
            other => other,
        };
        tracing::trace!(?strategy, keys = keys.len(), range, "lowering switch");

        match strategy {
            SwitchStrategy::Table => {
                let mut targets = vec![def; usize::try_from(range).unwrap_or(0)];
                for (&key, &label) in keys.iter().zip(&labels) {
                    let slot = i64::from(key) - i64::from(low);
                    let slot = usize::try_from(slot).ok();
                    if let Some(target) = slot.and_then(|i| targets.get_mut(i)) {
                        *target = label;
                    }
                }
                self.emit_table_switch(def, low, &targets);
            }
            SwitchStrategy::Lookup => {
                let pairs: Vec<(i32, Label)> =
                    keys.iter().copied().zip(labels.iter().copied()).collect();
                self.emit_lookup_switch(def, &pairs);
            }
            SwitchStrategy::Binary => {
                let key = self.make_local(Type::Int);
                self.store_local(&key);
                self.binary_dispatch(&key, keys, &labels, def);
            }
        }

        for (&key, &label) in keys.iter().zip(&labels) {
            self.mark(label);
            callback.process_case(self, key, end)?;
        }
        self.mark(def);
        callback.process_default(self)?;
        self.mark(end);
        Ok(())
    }

    fn binary_dispatch(&mut self, key: &Local, keys: &[i32], labels: &[Label], def: Label) {
        match keys.len() {
            0 => self.goto(def),
            1 => {
                self.load_local(key);
                self.push_int(keys[0]);
                self.if_icmp(CmpMode::Eq, labels[0]);
                self.goto(def);
            }
            n => {
                let mid = n / 2;
                let upper = self.make_label();
                self.load_local(key);
                self.push_int(keys[mid]);
                self.if_icmp(CmpMode::Ge, upper);
                self.binary_dispatch(key, &keys[..mid], &labels[..mid], def);
                self.mark(upper);
                self.binary_dispatch(key, &keys[mid..], &labels[mid..], def);
            }
        }
    }
}
