// SPDX-FileCopyrightText: 2024 Rot127 <unisono@quyllur.org>
// SPDX-License-Identifier: LGPL-3.0-only

use std::collections::HashMap;
use std::fmt::Display;

use crate::error::{Result, SseError};
use crate::ir::{ObjectKind, VarId};
use crate::term::{ArrayKind, ArrayTerm, Term};

/// Tag bits every virtual address carries.
pub const ADDRESS_MASK: u32 = 0x7f00_0000;
/// Number of addresses below the tag.
pub const ADDRESS_RANGE: u32 = 0x0100_0000;
/// Default number of addresses reserved per object (its maximum field count).
pub const DEFAULT_FIELD_STRIDE: u32 = 0x100;
/// Name of the array modelling memory.
pub const MEMORY_ARRAY: &str = "loc2ValMap";

/// True if `v` lies in the virtual address range.
pub fn is_virtual_address(v: i64) -> bool {
    v > 0 && v <= i32::MAX as i64 && (v as u32 & ADDRESS_MASK) == ADDRESS_MASK
}

/// A concrete value as seen by the memory model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Address(u32),
    Scalar(i64),
}

impl Value {
    /// Classifies a flat integer from the solver.
    pub fn from_raw(v: i64) -> Value {
        if is_virtual_address(v) {
            Value::Address(v as u32)
        } else {
            Value::Scalar(v)
        }
    }

    pub fn raw(&self) -> i64 {
        match self {
            Value::Address(a) => *a as i64,
            Value::Scalar(v) => *v,
        }
    }

    pub fn is_address(&self) -> bool {
        matches!(self, Value::Address(_))
    }

    pub fn to_term(&self) -> Term {
        Term::int(self.raw())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Address(a) => write!(f, "{:#x}", a),
            Value::Scalar(v) => write!(f, "{}", v),
        }
    }
}

/// Virtual addresses of memory objects and the memory array.
///
/// Each object gets a slot of `field_stride` consecutive addresses.
/// Slots are assigned in order of first use and stay the same until [MemoryModel::reset].
pub struct MemoryModel {
    slots: HashMap<VarId, u32>,
    /// Slot -> object
    owners: Vec<VarId>,
    field_stride: u32,
    map: ArrayTerm,
}

impl MemoryModel {
    pub fn new(field_stride: u32) -> MemoryModel {
        assert!(
            field_stride > 0 && field_stride <= ADDRESS_RANGE,
            "Field stride {} out of range",
            field_stride
        );
        MemoryModel {
            slots: HashMap::new(),
            owners: Vec::new(),
            field_stride,
            map: ArrayTerm::symbol(MEMORY_ARRAY),
        }
    }

    /// Maximum number of objects which can get an address.
    pub fn capacity(&self) -> u32 {
        ADDRESS_RANGE / self.field_stride
    }

    pub fn get_field_stride(&self) -> u32 {
        self.field_stride
    }

    /// The base address of `obj`. Assigns the next free slot on first use.
    pub fn object_address(&mut self, obj: VarId) -> Result<u32> {
        if let Some(slot) = self.slots.get(&obj) {
            return Ok(ADDRESS_MASK + slot * self.field_stride);
        }
        let slot = self.owners.len() as u32;
        if slot >= self.capacity() {
            return Err(SseError::AddressSpaceExhausted(self.capacity()));
        }
        self.slots.insert(obj, slot);
        self.owners.push(obj);
        Ok(ADDRESS_MASK + slot * self.field_stride)
    }

    /// The value `&obj` evaluates to.
    pub fn address_of(&mut self, obj: VarId, kind: ObjectKind) -> Result<Value> {
        match kind {
            ObjectKind::ConstInt(c) => Ok(Value::Scalar(c)),
            ObjectKind::NullPtr => Ok(Value::Scalar(0)),
            _ => Ok(Value::Address(self.object_address(obj)?)),
        }
    }

    /// Address of the field `offset` addresses after `base`.
    /// The field must stay inside the object `base` points into.
    pub fn field_address(&self, base: Value, offset: i64) -> Result<Value> {
        let Value::Address(b) = base else {
            return Err(SseError::NotAnAddress(base.raw()));
        };
        let in_object = ((b - ADDRESS_MASK) % self.field_stride) as i64;
        let field = in_object + offset;
        if field < 0 || field >= self.field_stride as i64 {
            return Err(SseError::FieldOutOfBounds {
                base: b,
                offset,
                stride: self.field_stride,
            });
        }
        Ok(Value::Address((b as i64 + offset) as u32))
    }

    /// The object and field offset an address belongs to.
    pub fn object_at(&self, addr: u32) -> Option<(VarId, u32)> {
        if !is_virtual_address(addr as i64) {
            return None;
        }
        let rel = addr - ADDRESS_MASK;
        let obj = self.owners.get((rel / self.field_stride) as usize)?;
        Some((*obj, rel % self.field_stride))
    }

    /// Objects with an address, in order of assignment.
    pub fn allocated(&self) -> impl Iterator<Item = (VarId, u32)> + '_ {
        self.owners
            .iter()
            .enumerate()
            .map(|(slot, obj)| (*obj, ADDRESS_MASK + slot as u32 * self.field_stride))
    }

    /// The value stored at `addr` in the current memory version.
    pub fn load(&self, addr: Value) -> Result<Term> {
        let Value::Address(a) = addr else {
            return Err(SseError::NotAnAddress(addr.raw()));
        };
        Ok(self.map.select(&Term::int(a as i64)))
    }

    /// Stores `value` at `addr` and returns the new memory version.
    pub fn store(&mut self, addr: Value, value: &Term) -> Result<&ArrayTerm> {
        let Value::Address(a) = addr else {
            return Err(SseError::NotAnAddress(addr.raw()));
        };
        self.map = self.map.store(&Term::int(a as i64), value);
        Ok(&self.map)
    }

    /// True if the current memory version has a store to `addr`.
    pub fn is_stored(&self, addr: u32) -> bool {
        let mut cur = &self.map;
        while let ArrayKind::Store(inner, k, _) = cur.kind() {
            if k.as_int() == Some(addr as i64) {
                return true;
            }
            cur = inner;
        }
        false
    }

    pub fn get_map(&self) -> &ArrayTerm {
        &self.map
    }

    /// Drops all stores. Object addresses stay assigned.
    pub fn reset_map(&mut self) {
        self.map = ArrayTerm::symbol(MEMORY_ARRAY);
    }

    /// Drops all stores and object addresses.
    pub fn reset(&mut self) {
        self.reset_map();
        self.slots.clear();
        self.owners.clear();
    }
}
