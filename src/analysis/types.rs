use std::fmt;

use crate::analysis::symbols::{ClassId, FunctionId, InstanceId};

/// Static types. Compound types refer into the symbol arena by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int,
    Float,
    Bool,
    Nil,
    Str,
    Any,
    Array,
    Function(FunctionId),
    Overload(FunctionOverload),
    Class(ClassId),
    SelfRef(ClassId),
    Instance { class: ClassId, instance: InstanceId },
    SuperMethod(FunctionOverload),
    Union(Vec<Type>),
    // Produced by a subtree that already reported an error
    Error,
}

impl Type {
    /// Permissive comparison: `any` matches everything but `nil`, a union
    /// matches when one of its members does, an error matches everything.
    pub fn equals(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Error, _) | (_, Type::Error) => true,
            (Type::Any, Type::Nil) | (Type::Nil, Type::Any) => false,
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Union(members), t) | (t, Type::Union(members)) => {
                members.iter().any(|member| member.equals(t))
            }
            (Type::SelfRef(a), Type::Instance { class: b, .. })
            | (Type::Instance { class: b, .. }, Type::SelfRef(a)) => a == b,
            _ => self.strict_equals(other),
        }
    }

    /// Nominal comparison. An error never matches.
    pub fn strict_equals(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Error, _) | (_, Type::Error) => false,
            (Type::Int, Type::Int)
            | (Type::Float, Type::Float)
            | (Type::Bool, Type::Bool)
            | (Type::Nil, Type::Nil)
            | (Type::Str, Type::Str)
            | (Type::Any, Type::Any)
            | (Type::Array, Type::Array) => true,
            (Type::Function(a), Type::Function(b)) => a == b,
            (Type::Overload(a), Type::Overload(b)) => a == b,
            (Type::SuperMethod(a), Type::SuperMethod(b)) => a == b,
            (Type::Class(a), Type::Class(b)) => a == b,
            (Type::SelfRef(a), Type::SelfRef(b)) => a == b,
            (Type::Instance { class: a, .. }, Type::Instance { class: b, .. }) => a == b,
            (Type::Union(a), Type::Union(b)) => {
                a.len() == b.len() && a.iter().all(|t| b.iter().any(|u| t.strict_equals(u)))
            }
            _ => false,
        }
    }

    /// Meet of two attribute types: the same type when they agree, a union otherwise.
    pub fn merge(&self, other: &Type) -> Type {
        if self.strict_equals(other) {
            return self.clone();
        }
        if matches!(self, Type::Error) {
            return other.clone();
        }

        let mut members = match self {
            Type::Union(members) => members.clone(),
            t => vec![t.clone()],
        };
        let incoming = match other {
            Type::Union(others) => others.clone(),
            t => vec![t.clone()],
        };
        for t in incoming {
            if !members.iter().any(|m| m.strict_equals(&t)) {
                members.push(t);
            }
        }
        Type::Union(members)
    }

    /// Storage type after a later assignment: kept while assignments agree,
    /// `any` as soon as they differ.
    pub fn widen(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Error, t) | (t, Type::Error) => t.clone(),
            (a, b) if a.strict_equals(b) => a.clone(),
            _ => Type::Any,
        }
    }

    /// Result of `+ - * %` on non-string operands.
    pub fn arithmetic(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Int, Type::Int) => Type::Int,
            (a, b) if a.is_dynamic() || b.is_dynamic() => Type::Any,
            _ => Type::Float,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Bool)
    }

    /// Values whose representation is only known at runtime through the tag byte.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Any | Type::Union(_) | Type::Error)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Type::Function(_) | Type::Overload(_) | Type::SuperMethod(_) | Type::Class(_)
        )
    }

    pub fn is_condition(&self) -> bool {
        matches!(self, Type::Bool | Type::Any | Type::Error)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::Nil => write!(f, "nil"),
            Type::Str => write!(f, "string"),
            Type::Any => write!(f, "any"),
            Type::Array => write!(f, "array"),
            Type::Function(_) => write!(f, "function"),
            Type::Overload(_) => write!(f, "function-overload"),
            Type::Class(_) => write!(f, "class"),
            Type::SelfRef(_) => write!(f, "class-self-reference"),
            Type::Instance { .. } => write!(f, "instance"),
            Type::SuperMethod(_) => write!(f, "super-method"),
            Type::Union(members) => {
                let names: Vec<String> = members.iter().map(|t| t.to_string()).collect();
                write!(f, "{}", names.join(" | "))
            }
            Type::Error => write!(f, "error"),
        }
    }
}

/// Functions sharing one name in a scope or class, most recent first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionOverload {
    pub name: String,
    functions: Vec<(FunctionId, usize)>,
}

impl FunctionOverload {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: Vec::new(),
        }
    }

    /// Adds a function, replacing an older one with the same arity.
    pub fn push(&mut self, function: FunctionId, arity: usize) {
        self.functions.retain(|&(_, a)| a != arity);
        self.functions.insert(0, (function, arity));
    }

    pub fn has_arity(&self, arity: usize) -> bool {
        self.functions.iter().any(|&(_, a)| a == arity)
    }

    /// Most recent function taking `arity` parameters, falling back to the
    /// most recent one overall.
    pub fn get_by_arity(&self, arity: usize) -> Option<FunctionId> {
        self.functions
            .iter()
            .find(|&&(_, a)| a == arity)
            .or_else(|| self.functions.first())
            .map(|&(id, _)| id)
    }

    pub fn arity_of(&self, function: FunctionId) -> Option<usize> {
        self.functions
            .iter()
            .find(|&&(id, _)| id == function)
            .map(|&(_, a)| a)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.functions.iter().map(|&(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_matches_all_but_nil() {
        assert!(Type::Any.equals(&Type::Int));
        assert!(Type::Str.equals(&Type::Any));
        assert!(!Type::Any.equals(&Type::Nil));
        assert!(!Type::Any.strict_equals(&Type::Int));
    }

    #[test]
    fn test_error_type() {
        assert!(Type::Error.equals(&Type::Str));
        assert!(Type::Int.equals(&Type::Error));
        assert!(!Type::Error.strict_equals(&Type::Error));
    }

    #[test]
    fn test_union_merge_preserves_both() {
        let merged = Type::Int.merge(&Type::Str);
        assert!(merged.equals(&Type::Int));
        assert!(merged.equals(&Type::Str));
        assert!(!merged.equals(&Type::Float));

        // merging again with a member does not grow the union
        let again = merged.merge(&Type::Int);
        assert!(again.strict_equals(&merged));
        assert_eq!(again.to_string(), "int | string");
    }

    #[test]
    fn test_instances_compare_by_class() {
        let a = Type::Instance { class: ClassId(0), instance: InstanceId(0) };
        let b = Type::Instance { class: ClassId(0), instance: InstanceId(1) };
        let c = Type::Instance { class: ClassId(1), instance: InstanceId(2) };
        assert!(a.strict_equals(&b));
        assert!(!a.strict_equals(&c));
        assert!(Type::SelfRef(ClassId(0)).equals(&a));
    }

    #[test]
    fn test_widen() {
        assert_eq!(Type::Int.widen(&Type::Int), Type::Int);
        assert_eq!(Type::Nil.widen(&Type::Int), Type::Any);
        assert_eq!(Type::Int.widen(&Type::Float), Type::Any);
    }

    #[test]
    fn test_overload_lookup_by_arity() {
        let mut overload = FunctionOverload::new("f");
        overload.push(FunctionId(0), 1);
        overload.push(FunctionId(1), 2);
        assert_eq!(overload.get_by_arity(1), Some(FunctionId(0)));
        assert_eq!(overload.get_by_arity(2), Some(FunctionId(1)));
        // unknown arity falls back to the most recent
        assert_eq!(overload.get_by_arity(5), Some(FunctionId(1)));

        // redefinition with an existing arity replaces it
        overload.push(FunctionId(2), 1);
        assert_eq!(overload.len(), 2);
        assert_eq!(overload.get_by_arity(1), Some(FunctionId(2)));
    }
}
