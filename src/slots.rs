//! Storage slot allocation for fields and function registers
//!
//! Follows the classic `nextreg` scheme: every allocation takes the next
//! free index and advances it by the width of the type code. A slot bound to
//! a variable belongs to it for good; an unbound slot is a raw register that
//! can be borrowed as scratch space and handed back. Locked slots keep their
//! index through every later relayout.

use crate::program::{ClassId, FieldId, ParamId, ResolvedType};

/// Storage type of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Bool,
    Byte,
    Char,
    Int,
    Long,
    Float,
    Double,
    Object,
    Void,
}

impl TypeCode {
    /// Number of consecutive indices the slot occupies
    pub fn width(self) -> u32 {
        match self {
            TypeCode::Long | TypeCode::Double => 2,
            TypeCode::Void => 0,
            _ => 1,
        }
    }

    pub fn of(ty: &ResolvedType) -> Self {
        match ty {
            ResolvedType::Void => TypeCode::Void,
            ResolvedType::Primitive(name) => match name.as_str() {
                "bool" => TypeCode::Bool,
                "byte" => TypeCode::Byte,
                "char" => TypeCode::Char,
                "int" => TypeCode::Int,
                "long" => TypeCode::Long,
                "float" => TypeCode::Float,
                "double" => TypeCode::Double,
                _ => TypeCode::Object,
            },
            _ => TypeCode::Object,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// What a slot stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    This,
    Field(FieldId),
    Param(ParamId),
    Local(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDef {
    pub type_code: TypeCode,
    pub index: u32,
    pub name: Option<String>,
    pub variable: Option<Variable>,
    pub owner: Option<ClassId>,
    pub locked: bool,
    in_use: bool,
}

impl SlotDef {
    /// Unbound slots are raw registers
    pub fn is_register(&self) -> bool {
        self.variable.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlotAllocator {
    slots: Vec<SlotDef>,
    next_index: u32,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh slot at the next free index
    pub fn allocate(&mut self, type_code: TypeCode, name: Option<&str>, owner: Option<ClassId>) -> SlotId {
        let index = self.next_index;
        self.next_index += type_code.width().max(1);
        self.slots.push(SlotDef {
            type_code,
            index,
            name: name.map(|n| n.to_string()),
            variable: None,
            owner,
            locked: false,
            in_use: true,
        });
        SlotId(self.slots.len() - 1)
    }

    /// Allocate a slot at a fixed index that later passes must not move,
    /// e.g. a field slot inherited from the superclass
    pub fn reserve_locked(&mut self, index: u32, type_code: TypeCode, name: Option<&str>, owner: Option<ClassId>) -> SlotId {
        assert!(
            !self.slots.iter().any(|s| s.locked && s.index == index),
            "locked slot index {} reserved twice",
            index
        );
        self.next_index = self.next_index.max(index + type_code.width().max(1));
        self.slots.push(SlotDef {
            type_code,
            index,
            name: name.map(|n| n.to_string()),
            variable: None,
            owner,
            locked: true,
            in_use: true,
        });
        SlotId(self.slots.len() - 1)
    }

    /// Bind a variable to a slot. Rebinding to a different variable is a bug
    /// in an earlier pass.
    pub fn bind(&mut self, slot: SlotId, variable: Variable) {
        let def = &mut self.slots[slot.0];
        assert!(
            def.variable.is_none() || def.variable == Some(variable),
            "slot {} already bound to {:?}, cannot rebind to {:?}",
            def.index,
            def.variable,
            variable
        );
        def.variable = Some(variable);
    }

    /// Allocate and bind in one step
    pub fn allocate_for(&mut self, variable: Variable, type_code: TypeCode, name: Option<&str>, owner: Option<ClassId>) -> SlotId {
        let slot = self.allocate(type_code, name, owner);
        self.bind(slot, variable);
        slot
    }

    pub fn lock(&mut self, slot: SlotId) {
        self.slots[slot.0].locked = true;
    }

    /// Borrow a raw register, reusing a released one of the same type code
    pub fn scratch(&mut self, type_code: TypeCode) -> SlotId {
        if let Some(pos) = self
            .slots
            .iter()
            .position(|s| s.is_register() && !s.in_use && !s.locked && s.type_code == type_code)
        {
            self.slots[pos].in_use = true;
            return SlotId(pos);
        }
        self.allocate(type_code, None, None)
    }

    /// Hand a scratch register back for reuse
    pub fn release(&mut self, slot: SlotId) {
        let def = &mut self.slots[slot.0];
        assert!(def.is_register(), "cannot release bound slot {}", def.index);
        def.in_use = false;
    }

    /// Move an unlocked slot to another index
    pub fn set_index(&mut self, slot: SlotId, index: u32) {
        let def = &mut self.slots[slot.0];
        assert!(!def.locked, "locked slot {} cannot be reassigned", def.index);
        def.index = index;
        self.next_index = self.next_index.max(index + def.type_code.width().max(1));
    }

    /// Reassign unlocked slots densely around the locked ones, preserving
    /// allocation order. Returns the number of indices in use.
    pub fn compact(&mut self) -> u32 {
        let locked: Vec<(u32, u32)> = self
            .slots
            .iter()
            .filter(|s| s.locked)
            .map(|s| (s.index, s.index + s.type_code.width().max(1)))
            .collect();
        let overlaps = |start: u32, width: u32| locked.iter().any(|(lo, hi)| start < *hi && *lo < start + width);

        let mut next = 0u32;
        let mut end = locked.iter().map(|(_, hi)| *hi).max().unwrap_or(0);
        for slot in self.slots.iter_mut().filter(|s| !s.locked) {
            let width = slot.type_code.width().max(1);
            while overlaps(next, width) {
                next += 1;
            }
            slot.index = next;
            next += width;
            end = end.max(next);
        }
        self.next_index = end;
        end
    }

    pub fn get(&self, slot: SlotId) -> &SlotDef {
        &self.slots[slot.0]
    }

    pub fn slot_of(&self, variable: Variable) -> Option<&SlotDef> {
        self.slots.iter().find(|s| s.variable == Some(variable))
    }

    pub fn slots(&self) -> &[SlotDef] {
        &self.slots
    }

    /// Total indices spanned so far
    pub fn size(&self) -> u32 {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_allocation_with_width() {
        let mut slots = SlotAllocator::new();
        let a = slots.allocate(TypeCode::Int, Some("a"), None);
        let b = slots.allocate(TypeCode::Long, Some("b"), None);
        let c = slots.allocate(TypeCode::Object, Some("c"), None);
        assert_eq!(slots.get(a).index, 0);
        assert_eq!(slots.get(b).index, 1);
        assert_eq!(slots.get(c).index, 3);
        assert_eq!(slots.size(), 4);
    }

    #[test]
    fn test_bind_same_variable_is_idempotent() {
        let mut slots = SlotAllocator::new();
        let s = slots.allocate(TypeCode::Int, None, None);
        slots.bind(s, Variable::Local(1));
        slots.bind(s, Variable::Local(1));
        assert_eq!(slots.slot_of(Variable::Local(1)).map(|d| d.index), Some(0));
    }

    #[test]
    #[should_panic(expected = "cannot rebind")]
    fn test_rebind_panics() {
        let mut slots = SlotAllocator::new();
        let s = slots.allocate(TypeCode::Int, None, None);
        slots.bind(s, Variable::Local(1));
        slots.bind(s, Variable::Local(2));
    }

    #[test]
    fn test_scratch_reuse() {
        let mut slots = SlotAllocator::new();
        let t1 = slots.scratch(TypeCode::Int);
        slots.release(t1);
        let t2 = slots.scratch(TypeCode::Int);
        assert_eq!(t1, t2);
        let t3 = slots.scratch(TypeCode::Int);
        assert_ne!(t2, t3);
        let d = slots.scratch(TypeCode::Double);
        assert_ne!(d, t1);
    }

    #[test]
    #[should_panic(expected = "cannot be reassigned")]
    fn test_locked_index_cannot_move() {
        let mut slots = SlotAllocator::new();
        let s = slots.reserve_locked(0, TypeCode::Int, Some("inherited"), None);
        slots.set_index(s, 4);
    }

    #[test]
    fn test_compact_keeps_locked_indices() {
        let mut slots = SlotAllocator::new();
        let inherited = slots.reserve_locked(1, TypeCode::Int, Some("base"), None);
        let a = slots.allocate(TypeCode::Int, Some("a"), None);
        let b = slots.allocate(TypeCode::Long, Some("b"), None);
        slots.set_index(a, 9);
        let size = slots.compact();
        assert_eq!(slots.get(inherited).index, 1);
        assert_eq!(slots.get(a).index, 0);
        assert_eq!(slots.get(b).index, 2);
        assert_eq!(size, 4);
    }
}
