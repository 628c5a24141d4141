use std::collections::HashMap;

use crate::analysis::semantic::SemanticError;
use crate::analysis::types::{FunctionOverload, Type};

pub const WORD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Class,
    Function,
    Constructor,
    Conditional,
    ForLoop,
    WhileLoop,
    Block,
}

impl ScopeKind {
    pub fn is_function_body(self) -> bool {
        matches!(self, ScopeKind::Function | ScopeKind::Constructor)
    }

    pub fn is_loop(self) -> bool {
        matches!(self, ScopeKind::ForLoop | ScopeKind::WhileLoop)
    }
}

/// What a class or function body scope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRef {
    Class(ClassId),
    Function(FunctionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Object(ObjectId),
    Class(ClassId),
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub level: usize,
    pub kind: ScopeKind,
    pub reference: Option<ScopeRef>,
    pub children: Vec<ScopeId>,
    // Declared variables and inner classes, in declaration order
    pub declared: Vec<String>,
    pub elements: HashMap<String, Element>,
    pub overloads: HashMap<String, FunctionOverload>,
    pub temporaries: Vec<ObjectId>,
    // Types given in this scope to variables declared further up
    pub shadows: HashMap<ObjectId, Type>,
    // Byte cursor, advanced as the IR generator places objects
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    Static,
    Stack,
}

/// A variable, parameter or temporary. Identity is (name, scope).
#[derive(Debug, Clone)]
pub struct Object {
    pub id: ObjectId,
    pub name: String,
    pub ty: Type,
    pub storage: Type,
    pub scope: ScopeId,
    pub offset: Option<usize>,
    pub size: usize,
    pub base: BaseKind,
    pub is_temporary: bool,
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.scope == other.scope
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<String>,
    pub param_objects: Vec<ObjectId>,
    pub this_object: Option<ObjectId>,
    pub scope: ScopeId,
    pub body: Option<ScopeId>,
    pub return_type: Type,
    pub has_returned_value: bool,
    pub is_method: bool,
    pub class: Option<ClassId>,
    pub level: usize,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn label(&self) -> String {
        format!("fn_{}_{}", self.id.0, self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub ty: Type,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub parent: Option<ClassId>,
    pub body: ScopeId,
    pub constructor: Option<FunctionId>,
    pub properties: Vec<Property>,
    pub methods: HashMap<String, FunctionOverload>,
}

impl Class {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// An instance keeps only what diverged from its class.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    pub class: ClassId,
    pub local_properties: Vec<Property>,
    pub local_methods: HashMap<String, FunctionOverload>,
}

/// Anything a bare identifier can resolve to.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Object(ObjectId),
    Overload(FunctionOverload),
    Class(ClassId),
}

/// Arena of every scope, object, function, class and instance of one
/// compilation. Scopes persist after they are popped so that later passes can
/// re-enter them.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    objects: Vec<Object>,
    functions: Vec<Function>,
    classes: Vec<Class>,
    instances: Vec<Instance>,
    current: ScopeId,
    next_temporary: usize,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let global = Scope {
            id: ScopeId(0),
            parent: None,
            level: 0,
            kind: ScopeKind::Global,
            reference: None,
            children: Vec::new(),
            declared: Vec::new(),
            elements: HashMap::new(),
            overloads: HashMap::new(),
            temporaries: Vec::new(),
            shadows: HashMap::new(),
            offset: 0,
        };

        Self {
            scopes: vec![global],
            objects: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
            instances: Vec::new(),
            current: ScopeId(0),
            next_temporary: 0,
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0]
    }

    pub fn object_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.0]
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.0]
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.0]
    }

    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.0]
    }

    /// Creates a child of the current scope and makes it current.
    pub fn push_scope(&mut self, kind: ScopeKind, reference: Option<ScopeRef>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        let parent = self.current;
        let level = self.scope(parent).level + 1;
        self.scopes.push(Scope {
            id,
            parent: Some(parent),
            level,
            kind,
            reference,
            children: Vec::new(),
            declared: Vec::new(),
            elements: HashMap::new(),
            overloads: HashMap::new(),
            temporaries: Vec::new(),
            shadows: HashMap::new(),
            offset: 0,
        });
        self.scope_mut(parent).children.push(id);
        self.current = id;
        log::trace!("push scope {:?} ({:?}) under {:?}", id, kind, parent);
        id
    }

    /// Makes an existing scope current again.
    pub fn enter(&mut self, id: ScopeId) {
        self.current = id;
    }

    pub fn pop_scope(&mut self) {
        if let Some(parent) = self.scope(self.current).parent {
            self.current = parent;
        }
    }

    pub fn declare_object(&mut self, name: &str, ty: Type) -> Result<ObjectId, SemanticError> {
        let scope = self.current;
        if self.scope(scope).elements.contains_key(name) {
            return Err(SemanticError::Redeclared { name: name.to_string() });
        }

        let id = self.new_object(name, ty, scope, false);
        let s = self.scope_mut(scope);
        s.declared.push(name.to_string());
        s.elements.insert(name.to_string(), Element::Object(id));
        Ok(id)
    }

    /// Temporaries behave as scope-local variables but are never found by name.
    pub fn declare_temporary(&mut self, ty: Type) -> ObjectId {
        let scope = self.current;
        let name = format!("t{}", self.next_temporary);
        self.next_temporary += 1;
        let id = self.new_object(&name, ty, scope, true);
        self.scope_mut(scope).temporaries.push(id);
        id
    }

    fn new_object(&mut self, name: &str, ty: Type, scope: ScopeId, is_temporary: bool) -> ObjectId {
        let id = ObjectId(self.objects.len());
        let base = if self.function_level(scope) == 0 {
            BaseKind::Static
        } else {
            BaseKind::Stack
        };
        self.objects.push(Object {
            id,
            name: name.to_string(),
            storage: ty.clone(),
            ty,
            scope,
            offset: None,
            size: WORD,
            base,
            is_temporary,
        });
        id
    }

    /// Registers a function in the current scope's overload map.
    pub fn declare_function(
        &mut self,
        name: &str,
        params: &[String],
        class: Option<ClassId>,
    ) -> Result<FunctionId, SemanticError> {
        let scope = self.current;
        let arity = params.len();
        if let Some(existing) = self.scope(scope).overloads.get(name) {
            if existing.has_arity(arity) {
                return Err(SemanticError::RedeclaredFunction {
                    name: name.to_string(),
                    arity,
                });
            }
        }

        let id = self.new_function(name, params, scope, class);
        self.scope_mut(scope)
            .overloads
            .entry(name.to_string())
            .or_insert_with(|| FunctionOverload::new(name))
            .push(id, arity);
        Ok(id)
    }

    /// Anonymous functions live in the arena but in no overload map.
    pub fn declare_anonymous_function(&mut self, params: &[String]) -> FunctionId {
        let scope = self.current;
        self.new_function("anon", params, scope, None)
    }

    fn new_function(
        &mut self,
        name: &str,
        params: &[String],
        scope: ScopeId,
        class: Option<ClassId>,
    ) -> FunctionId {
        let id = FunctionId(self.functions.len());
        let level = self.function_level(scope) + 1;
        self.functions.push(Function {
            id,
            name: name.to_string(),
            params: params.to_vec(),
            param_objects: Vec::new(),
            this_object: None,
            scope,
            body: None,
            return_type: Type::Nil,
            has_returned_value: false,
            is_method: class.is_some(),
            class,
            level,
        });
        log::debug!("function '{}' declared as {:?} at level {}", name, id, level);
        id
    }

    /// Creates a class and its body scope (entered). Parent properties and
    /// methods are copied so indices stay stable across the hierarchy.
    pub fn declare_class(&mut self, name: &str, parent: Option<ClassId>) -> Result<ClassId, SemanticError> {
        let scope = self.current;
        if self.scope(scope).elements.contains_key(name) {
            return Err(SemanticError::Redeclared { name: name.to_string() });
        }

        let id = ClassId(self.classes.len());
        let (properties, methods, constructor) = match parent {
            Some(p) => {
                let parent = self.class(p);
                (parent.properties.clone(), parent.methods.clone(), parent.constructor)
            }
            None => (Vec::new(), HashMap::new(), None),
        };

        let s = self.scope_mut(scope);
        s.declared.push(name.to_string());
        s.elements.insert(name.to_string(), Element::Class(id));

        let body = self.push_scope(ScopeKind::Class, Some(ScopeRef::Class(id)));
        self.classes.push(Class {
            id,
            name: name.to_string(),
            parent,
            body,
            constructor,
            properties,
            methods,
        });
        log::debug!("class '{}' declared as {:?}", name, id);
        Ok(id)
    }

    /// Adds a method to a class, shadowing an inherited one of the same arity.
    pub fn add_method(&mut self, class: ClassId, function: FunctionId) {
        let (name, arity) = {
            let f = self.function(function);
            (f.name.clone(), f.arity())
        };
        let class = self.class_mut(class);
        if name == "init" {
            class.constructor = Some(function);
        }
        class
            .methods
            .entry(name.clone())
            .or_insert_with(|| FunctionOverload::new(&name))
            .push(function, arity);
    }

    /// Writes `this.name = value`; differing types merge into a union.
    pub fn set_class_property(&mut self, class: ClassId, name: &str, ty: Type) -> Property {
        let class = self.class_mut(class);
        if let Some(existing) = class.properties.iter_mut().find(|p| p.name == name) {
            existing.ty = existing.ty.merge(&ty);
            return existing.clone();
        }
        let property = Property {
            name: name.to_string(),
            ty,
            index: class.properties.len(),
        };
        class.properties.push(property.clone());
        property
    }

    pub fn new_instance(&mut self, class: ClassId) -> Type {
        let id = InstanceId(self.instances.len());
        self.instances.push(Instance {
            id,
            class,
            local_properties: Vec::new(),
            local_methods: HashMap::new(),
        });
        Type::Instance { class, instance: id }
    }

    /// Writes `instance.name = value` into the instance's own overrides. The
    /// class template is never touched. The new type replaces the old one.
    pub fn set_instance_property(&mut self, instance: InstanceId, name: &str, ty: Type) -> Property {
        let class = self.instance(instance).class;
        let inherited = self.class(class).property(name).cloned();
        let class_len = self.class(class).properties.len();

        let local = &mut self.instances[instance.0].local_properties;
        if let Some(existing) = local.iter_mut().find(|p| p.name == name) {
            if !existing.ty.strict_equals(&ty) {
                log::warn!(
                    "attribute '{}' changes type from {} to {} on an instance without a union",
                    name, existing.ty, ty
                );
            }
            existing.ty = ty;
            return existing.clone();
        }

        let index = match &inherited {
            Some(p) => p.index,
            None => local
                .iter()
                .map(|p| p.index + 1)
                .max()
                .unwrap_or(0)
                .max(class_len),
        };
        if let Some(p) = &inherited {
            if !p.ty.strict_equals(&ty) {
                log::warn!(
                    "attribute '{}' changes type from {} to {} on an instance without a union",
                    name, p.ty, ty
                );
            }
        }
        let property = Property {
            name: name.to_string(),
            ty,
            index,
        };
        local.push(property.clone());
        property
    }

    pub fn instance_property(&self, instance: InstanceId, name: &str) -> Option<Property> {
        let inst = self.instance(instance);
        inst.local_properties
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .or_else(|| self.class(inst.class).property(name).cloned())
    }

    pub fn instance_method(&self, instance: InstanceId, name: &str) -> Option<FunctionOverload> {
        let inst = self.instance(instance);
        inst.local_methods
            .get(name)
            .cloned()
            .or_else(|| self.class_method(inst.class, name))
    }

    /// Method lookup through the inheritance chain.
    pub fn class_method(&self, class: ClassId, name: &str) -> Option<FunctionOverload> {
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.class(id);
            if let Some(overload) = c.methods.get(name) {
                return Some(overload.clone());
            }
            current = c.parent;
        }
        None
    }

    /// Property lookup through the inheritance chain.
    pub fn class_property(&self, class: ClassId, name: &str) -> Option<Property> {
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.class(id);
            if let Some(p) = c.property(name) {
                return Some(p.clone());
            }
            current = c.parent;
        }
        None
    }

    /// Resolves a name from the current scope upwards. Class scopes are
    /// crossed without exposing their methods; those need a receiver.
    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        let mut current = Some(self.current);
        while let Some(id) = current {
            let scope = self.scope(id);
            if scope.kind != ScopeKind::Class {
                if let Some(element) = scope.elements.get(name) {
                    return Some(match *element {
                        Element::Object(o) => Symbol::Object(o),
                        Element::Class(c) => Symbol::Class(c),
                    });
                }
                if let Some(overload) = scope.overloads.get(name) {
                    return Some(Symbol::Overload(overload.clone()));
                }
            }
            current = scope.parent;
        }
        None
    }

    /// Current flow type of a variable as seen from the current scope.
    pub fn object_type(&self, id: ObjectId) -> Type {
        let declared_in = self.object(id).scope;
        let mut current = Some(self.current);
        while let Some(scope) = current {
            if scope == declared_in {
                break;
            }
            if let Some(ty) = self.scope(scope).shadows.get(&id) {
                return ty.clone();
            }
            current = self.scope(scope).parent;
        }
        self.object(id).ty.clone()
    }

    /// Records an assignment: the flow type changes (as a shadow when the
    /// variable lives further up) and the storage type widens.
    pub fn assign_object(&mut self, id: ObjectId, ty: Type) {
        let current = self.current;
        let object = self.object_mut(id);
        object.storage = object.storage.widen(&ty);
        if object.scope == current {
            object.ty = ty;
        } else {
            self.scope_mut(current).shadows.insert(id, ty);
        }
    }

    pub fn symbol_type(&self, symbol: &Symbol) -> Type {
        match symbol {
            Symbol::Object(id) => self.object_type(*id),
            Symbol::Overload(overload) => Type::Overload(overload.clone()),
            Symbol::Class(id) => Type::Class(*id),
        }
    }

    /// Nearest enclosing scope (including `from`) accepted by `pred`, stopping
    /// with `None` as soon as `stop` matches first.
    pub fn find_enclosing(
        &self,
        from: ScopeId,
        pred: impl Fn(&Scope) -> bool,
        stop: impl Fn(&Scope) -> bool,
    ) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.scope(id);
            if pred(scope) {
                return Some(id);
            }
            if stop(scope) {
                return None;
            }
            current = scope.parent;
        }
        None
    }

    /// Innermost function whose body encloses `scope`.
    pub fn enclosing_function(&self, scope: ScopeId) -> Option<FunctionId> {
        self.find_enclosing(scope, |s| s.kind.is_function_body(), |_| false)
            .and_then(|id| match self.scope(id).reference {
                Some(ScopeRef::Function(f)) => Some(f),
                _ => None,
            })
    }

    /// Static nesting depth of the function owning `scope`; 0 outside functions.
    pub fn function_level(&self, scope: ScopeId) -> usize {
        self.enclosing_function(scope)
            .map(|f| self.function(f).level)
            .unwrap_or(0)
    }

    /// Places an object at the current cursor of its scope.
    pub fn assign_offset(&mut self, id: ObjectId) -> usize {
        if let Some(offset) = self.object(id).offset {
            return offset;
        }
        let (scope, size) = {
            let o = self.object(id);
            (o.scope, o.size)
        };
        let offset = self.scope(scope).offset;
        self.scope_mut(scope).offset += size;
        self.object_mut(id).offset = Some(offset);
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_tree_persists() {
        let mut table = SymbolTable::new();
        let block = table.push_scope(ScopeKind::Block, None);
        table.declare_object("x", Type::Int).unwrap();
        table.pop_scope();
        assert_eq!(table.current(), table.global());
        assert!(table.resolve("x").is_none());

        table.enter(block);
        assert!(matches!(table.resolve("x"), Some(Symbol::Object(_))));
        assert_eq!(table.scope(block).level, 1);
    }

    #[test]
    fn test_redeclaration_in_same_scope() {
        let mut table = SymbolTable::new();
        table.declare_object("x", Type::Int).unwrap();
        assert!(matches!(
            table.declare_object("x", Type::Str),
            Err(SemanticError::Redeclared { .. })
        ));

        // shadowing in a child scope is fine
        table.push_scope(ScopeKind::Block, None);
        assert!(table.declare_object("x", Type::Str).is_ok());
    }

    #[test]
    fn test_overloads_differ_in_arity() {
        let mut table = SymbolTable::new();
        let one = table.declare_function("f", &["a".into()], None).unwrap();
        let two = table.declare_function("f", &["a".into(), "b".into()], None).unwrap();
        assert!(table.declare_function("f", &["c".into()], None).is_err());

        let Some(Symbol::Overload(overload)) = table.resolve("f") else {
            panic!("expected overload");
        };
        assert_eq!(overload.get_by_arity(1), Some(one));
        assert_eq!(overload.get_by_arity(2), Some(two));
    }

    #[test]
    fn test_shadowed_assignment_stays_in_child_scope() {
        let mut table = SymbolTable::new();
        let x = table.declare_object("x", Type::Int).unwrap();
        table.push_scope(ScopeKind::Conditional, None);
        table.assign_object(x, Type::Str);
        assert_eq!(table.object_type(x), Type::Str);
        table.pop_scope();
        assert_eq!(table.object_type(x), Type::Int);
        assert_eq!(table.object(x).storage, Type::Any);
    }

    #[test]
    fn test_inheritance_copies_properties_and_methods() {
        let mut table = SymbolTable::new();
        let a = table.declare_class("A", None).unwrap();
        let m = table.declare_function("m", &[], Some(a)).unwrap();
        table.add_method(a, m);
        table.set_class_property(a, "x", Type::Int);
        table.pop_scope();

        let b = table.declare_class("B", Some(a)).unwrap();
        let y = table.set_class_property(b, "y", Type::Str);
        table.pop_scope();

        assert_eq!(table.class(b).property("x").map(|p| p.index), Some(0));
        assert_eq!(y.index, 1);
        assert_eq!(table.class_method(b, "m").and_then(|o| o.get_by_arity(0)), Some(m));
        // the parent is untouched
        assert!(table.class(a).property("y").is_none());
    }

    #[test]
    fn test_instance_writes_do_not_touch_class() {
        let mut table = SymbolTable::new();
        let a = table.declare_class("A", None).unwrap();
        table.set_class_property(a, "x", Type::Int);
        table.pop_scope();

        let Type::Instance { instance, .. } = table.new_instance(a) else {
            panic!("expected instance");
        };
        let x = table.set_instance_property(instance, "x", Type::Str);
        let z = table.set_instance_property(instance, "z", Type::Float);
        assert_eq!(x.index, 0);
        assert_eq!(z.index, 1);
        assert_eq!(table.instance_property(instance, "x").map(|p| p.ty), Some(Type::Str));
        assert_eq!(table.class(a).property("x").map(|p| p.ty.clone()), Some(Type::Int));
        assert!(table.class(a).property("z").is_none());
    }

    #[test]
    fn test_offsets_sum_to_cursor() {
        let mut table = SymbolTable::new();
        let a = table.declare_object("a", Type::Int).unwrap();
        let b = table.declare_object("b", Type::Str).unwrap();
        let t = table.declare_temporary(Type::Int);
        for id in [a, b, t] {
            table.assign_offset(id);
        }
        assert_eq!(table.object(b).offset, Some(WORD));
        assert_eq!(table.scope(table.global()).offset, 3 * WORD);
        // placing twice keeps the first offset
        assert_eq!(table.assign_offset(a), 0);
        assert_eq!(table.scope(table.global()).offset, 3 * WORD);
    }

    #[test]
    fn test_function_levels() {
        let mut table = SymbolTable::new();
        let outer = table.declare_function("outer", &[], None).unwrap();
        let body = table.push_scope(ScopeKind::Function, Some(ScopeRef::Function(outer)));
        table.function_mut(outer).body = Some(body);
        let inner = table.declare_function("inner", &[], None).unwrap();
        let x = table.declare_object("x", Type::Int).unwrap();

        assert_eq!(table.function(outer).level, 1);
        assert_eq!(table.function(inner).level, 2);
        assert_eq!(table.object(x).base, BaseKind::Stack);
        assert_eq!(table.function_level(table.global()), 0);
    }
}
