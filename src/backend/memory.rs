use std::collections::HashMap;

use crate::analysis::symbols::{BaseKind, FunctionId, ObjectId, ScopeId, ScopeRef, SymbolTable, WORD};
use crate::analysis::types::Type;
use crate::backend::CodegenError;

/// Start of the static area, addressed through `$gp`.
pub const STATIC_BASE: u32 = 0x1001_0000;

/// Bytes of a boxed number: tag word, then the payload word.
pub const CELL_SIZE: usize = 2 * WORD;

/// Frame slots between `$fp` and the first argument: saved `$fp`, level, `$ra`.
pub const FRAME_HEADER: usize = 3 * WORD;

pub const ALLOC_HELPER: &str = "auto_number_memory_alloc";

/// First byte of every heap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Int = 1,
    Float = 2,
    Str = 3,
    Instance = 4,
}

/// How a value of a static type lives in a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr {
    // payload in an integer register: int, bool, nil
    Int,
    Float,
    // string, instance or array pointer
    Pointer,
    // pointer to a tagged cell whose kind is only known at runtime
    Boxed,
    // functions and classes carry no runtime value
    Void,
}

impl Repr {
    pub fn of(ty: &Type) -> Repr {
        match ty {
            Type::Int | Type::Bool | Type::Nil => Repr::Int,
            Type::Float => Repr::Float,
            Type::Str | Type::Array | Type::Instance { .. } | Type::SelfRef(_) => Repr::Pointer,
            Type::Any | Type::Union(_) | Type::Error => Repr::Boxed,
            Type::Function(_) | Type::Overload(_) | Type::SuperMethod(_) | Type::Class(_) => Repr::Void,
        }
    }

    pub fn is_float(self) -> bool {
        self == Repr::Float
    }
}

/// Where an object's slot lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    // byte offset from $gp
    Static(usize),
    // local slot at -(WORD + offset) from the frame of the function at `level`
    Frame { offset: usize, level: usize },
}

/// Frame-relative placement of every scope, computed once the IR generator
/// has placed all objects. A scope starts where the previous sibling subtree
/// ended, so sibling blocks never overlap.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    scope_base: HashMap<ScopeId, usize>,
    frame_size: HashMap<FunctionId, usize>,
    static_size: usize,
}

impl Layout {
    pub fn new(table: &SymbolTable) -> Self {
        let mut layout = Layout::default();
        layout.static_size = layout.place(table, table.global(), 0);

        for scope in table.scopes() {
            if !scope.kind.is_function_body() {
                continue;
            }
            if let Some(ScopeRef::Function(function)) = scope.reference {
                let size = layout.place(table, scope.id, 0);
                layout.frame_size.insert(function, size);
            }
        }

        log::debug!(
            "static area of {} byte(s), {} frame(s)",
            layout.static_size,
            layout.frame_size.len()
        );
        layout
    }

    // Function bodies start their own frame and are placed separately
    fn place(&mut self, table: &SymbolTable, scope: ScopeId, base: usize) -> usize {
        self.scope_base.insert(scope, base);
        let s = table.scope(scope);
        let mut extent = s.offset;
        for &child in &s.children {
            if table.scope(child).kind.is_function_body() {
                continue;
            }
            extent += self.place(table, child, base + extent);
        }
        extent
    }

    pub fn static_size(&self) -> usize {
        self.static_size
    }

    /// Static slot holding the cached "." string used when printing floats.
    pub fn dot_slot(&self) -> usize {
        self.static_size
    }

    pub fn frame_size(&self, function: FunctionId) -> usize {
        self.frame_size.get(&function).copied().unwrap_or(0)
    }

    pub fn address(&self, table: &SymbolTable, object: ObjectId) -> Result<Address, CodegenError> {
        let o = table.object(object);
        let offset = o.offset.ok_or(CodegenError::Unplaced(o.name.clone()))?;
        let base = self
            .scope_base
            .get(&o.scope)
            .copied()
            .ok_or(CodegenError::Unplaced(o.name.clone()))?;

        Ok(match o.base {
            BaseKind::Static => Address::Static(base + offset),
            BaseKind::Stack => Address::Frame {
                offset: base + offset,
                level: table.function_level(o.scope),
            },
        })
    }
}

/// Displacement of a local slot from its frame pointer.
pub fn local_displacement(offset: usize) -> i64 {
    -((WORD + offset) as i64)
}

/// Displacement of argument `index` from the callee's frame pointer.
pub fn argument_displacement(index: usize) -> usize {
    FRAME_HEADER + index * WORD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::symbols::ScopeKind;

    #[test]
    fn test_repr_of_types() {
        assert_eq!(Repr::of(&Type::Bool), Repr::Int);
        assert_eq!(Repr::of(&Type::Float), Repr::Float);
        assert_eq!(Repr::of(&Type::Str), Repr::Pointer);
        assert_eq!(Repr::of(&Type::Int.merge(&Type::Str)), Repr::Boxed);
        assert_eq!(Tag::Instance as u8, 4);
    }

    #[test]
    fn test_sibling_scopes_do_not_overlap() {
        let mut table = SymbolTable::new();
        let g = table.declare_object("g", Type::Int).unwrap();
        table.assign_offset(g);

        let first = table.push_scope(ScopeKind::Block, None);
        let a = table.declare_object("a", Type::Int).unwrap();
        let b = table.declare_object("b", Type::Int).unwrap();
        table.assign_offset(a);
        table.assign_offset(b);
        table.pop_scope();

        let second = table.push_scope(ScopeKind::Block, None);
        let c = table.declare_object("c", Type::Int).unwrap();
        table.assign_offset(c);
        table.pop_scope();

        let layout = Layout::new(&table);
        assert_eq!(layout.address(&table, g).unwrap(), Address::Static(0));
        assert_eq!(layout.address(&table, b).unwrap(), Address::Static(2 * WORD));
        assert_eq!(layout.address(&table, c).unwrap(), Address::Static(3 * WORD));
        assert_eq!(layout.static_size(), 4 * WORD);
        assert_ne!(first, second);
    }

    #[test]
    fn test_function_frames() {
        let mut table = SymbolTable::new();
        let f = table.declare_function("f", &["x".into()], None).unwrap();
        let body = table.push_scope(ScopeKind::Function, Some(ScopeRef::Function(f)));
        table.function_mut(f).body = Some(body);
        let x = table.declare_object("x", Type::Any).unwrap();
        let y = table.declare_object("y", Type::Int).unwrap();
        table.assign_offset(x);
        table.assign_offset(y);
        table.pop_scope();

        let layout = Layout::new(&table);
        assert_eq!(layout.frame_size(f), 2 * WORD);
        assert_eq!(
            layout.address(&table, y).unwrap(),
            Address::Frame { offset: WORD, level: 1 }
        );
        assert_eq!(local_displacement(WORD), -8);
        assert_eq!(argument_displacement(1), 16);
        // the function body takes no room in the static area
        assert_eq!(layout.static_size(), 0);
    }

    #[test]
    fn test_unplaced_object_is_an_error() {
        let mut table = SymbolTable::new();
        let x = table.declare_object("x", Type::Int).unwrap();
        let layout = Layout::new(&table);
        assert!(layout.address(&table, x).is_err());
    }
}
