use std::collections::HashMap;

use crate::analysis::symbols::{
    ClassId, FunctionId, ObjectId, ScopeId, ScopeKind, ScopeRef, Symbol, SymbolTable,
};
use crate::analysis::types::{FunctionOverload, Type};
use crate::frontend::ast::{self, BinaryOp, Expr, ExprKind, Span, Stmt, SuffixKind, UnaryOp};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SemanticError {
    #[error("undeclared identifier '{name}'")]
    Undeclared { name: String },

    #[error("'{name}' is already declared in this scope")]
    Redeclared { name: String },

    #[error("function '{name}' taking {arity} argument(s) is already declared in this scope")]
    RedeclaredFunction { name: String, arity: usize },

    #[error("condition must be bool or any, found {found}")]
    InvalidCondition { found: String },

    #[error("'this' can only be used inside a method")]
    ThisOutsideMethod,

    #[error("'super' can only be used inside a method of a class with a parent")]
    SuperOutsideSubclass,

    #[error("'return' can only be used inside a function")]
    ReturnOutsideFunction,

    #[error("'{keyword}' can only be used inside a loop")]
    OutsideLoop { keyword: &'static str },

    #[error("a value of type {found} is not callable")]
    NotCallable { found: String },

    #[error("method '{name}' must be called on a receiver")]
    MissingReceiver { name: String },

    #[error("'{name}' expects {expected} argument(s) but {actual} were given")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("cannot access '{name}' on a value of type {found}")]
    NotAClass { name: String, found: String },

    #[error("undefined property '{name}'")]
    UndefinedProperty { name: String },

    #[error("cannot assign attribute '{name}' on a value of type {found}")]
    InvalidPropertyTarget { name: String, found: String },

    #[error("parent class '{name}' not found")]
    ParentNotFound { name: String },

    #[error("class '{name}' cannot inherit from itself")]
    SelfInheritance { name: String },

    #[error("a value of type {found} cannot be indexed")]
    NotIndexable { found: String },

    #[error("operator '{op}' cannot be applied to {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: String,
        right: String,
    },

    #[error("operator '{op}' cannot be applied to {operand}")]
    InvalidOperand { op: &'static str, operand: String },

    #[error("cannot assign to '{name}'")]
    InvalidAssignment { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub error: SemanticError,
    pub span: Span,
}

/// How one step of a call chain (or a `super.x` access) was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Property { index: usize },
    Method { overload: FunctionOverload, via_super: bool },
    Index,
    Call { function: FunctionId },
    Instantiate { class: ClassId, constructor: Option<FunctionId> },
}

/// Decisions of the analyzer, keyed by the span of the node they decorate.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    pub scopes: HashMap<Span, ScopeId>,
    pub functions: HashMap<Span, FunctionId>,
    pub classes: HashMap<Span, ClassId>,
    pub symbols: HashMap<Span, Symbol>,
    pub types: HashMap<Span, Type>,
    pub steps: HashMap<Span, Step>,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub table: SymbolTable,
    pub annotations: Annotations,
}

pub fn check(program: &ast::Program) -> Result<Analysis, Vec<Diagnostic>> {
    let mut analyzer = Analyzer {
        table: SymbolTable::new(),
        annotations: Annotations::default(),
        errors: Vec::new(),
    };

    for stmt in &program.statements {
        analyzer.statement(stmt);
    }

    log::debug!(
        "semantic analysis finished: {} scope(s), {} error(s)",
        analyzer.table.scopes().len(),
        analyzer.errors.len()
    );

    if analyzer.errors.is_empty() {
        Ok(Analysis {
            table: analyzer.table,
            annotations: analyzer.annotations,
        })
    } else {
        Err(analyzer.errors)
    }
}

fn op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
    }
}

// Operands accepted by arithmetic
fn is_arithmetic(ty: &Type) -> bool {
    matches!(ty, Type::Int | Type::Float) || ty.is_dynamic()
}

struct Analyzer {
    table: SymbolTable,
    annotations: Annotations,
    errors: Vec<Diagnostic>,
}

impl Analyzer {
    fn error(&mut self, error: SemanticError, span: Span) {
        log::trace!("semantic error at {:?}: {}", span, error);
        self.errors.push(Diagnostic { error, span });
    }

    fn statements(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.statement(stmt);
        }
    }

    /// Runs a statement inside a fresh scope of the given kind. A block body
    /// does not open a second scope of its own.
    fn scoped_body(&mut self, stmt: &Stmt, kind: ScopeKind) {
        let scope = self.table.push_scope(kind, None);
        self.annotations.scopes.insert(stmt.span(), scope);
        match stmt {
            Stmt::Block { body, .. } => self.statements(body),
            other => self.statement(other),
        }
        self.table.pop_scope();
    }

    fn check_condition(&mut self, cond: &Expr) {
        let ty = self.expr(cond);
        if !ty.is_condition() {
            self.error(
                SemanticError::InvalidCondition { found: ty.to_string() },
                cond.span,
            );
        }
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Class { name, parent, methods, span } => {
                self.class_decl(name, parent.as_deref(), methods, *span);
            }

            Stmt::Fun(func) => {
                let name = func.name.as_deref().unwrap_or("anon");
                match self.table.declare_function(name, &func.params, None) {
                    Ok(id) => self.function_body(id, func, ScopeKind::Function),
                    Err(err) => self.error(err, func.span),
                }
            }

            Stmt::Var { name, value, span } => {
                let ty = match value {
                    Some(value) => self.expr(value),
                    None => Type::Nil,
                };
                match self.table.declare_object(name, ty) {
                    Ok(id) => {
                        self.annotations.symbols.insert(*span, Symbol::Object(id));
                    }
                    Err(err) => self.error(err, *span),
                }
            }

            Stmt::Expr { expr, .. } | Stmt::Print { expr, .. } => {
                self.expr(expr);
            }

            Stmt::For { init, cond, update, body, span } => {
                let scope = self.table.push_scope(ScopeKind::ForLoop, None);
                self.annotations.scopes.insert(*span, scope);
                if let Some(init) = init {
                    self.statement(init);
                }
                if let Some(cond) = cond {
                    self.check_condition(cond);
                }
                match body.as_ref() {
                    Stmt::Block { body, .. } => self.statements(body),
                    other => self.statement(other),
                }
                if let Some(update) = update {
                    self.expr(update);
                }
                self.table.pop_scope();
            }

            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.check_condition(cond);
                self.scoped_body(then_branch, ScopeKind::Conditional);
                if let Some(else_branch) = else_branch {
                    self.scoped_body(else_branch, ScopeKind::Conditional);
                }
            }

            Stmt::Return { value, span } => {
                let ty = value.as_ref().map(|v| self.expr(v));
                let Some(function) = self.table.enclosing_function(self.table.current()) else {
                    self.error(SemanticError::ReturnOutsideFunction, *span);
                    return;
                };
                if let Some(ty) = ty {
                    let f = self.table.function_mut(function);
                    if f.has_returned_value {
                        f.return_type = f.return_type.widen(&ty);
                    } else {
                        f.return_type = ty;
                        f.has_returned_value = true;
                    }
                }
            }

            Stmt::While { cond, body, .. } => {
                self.check_condition(cond);
                self.scoped_body(body, ScopeKind::WhileLoop);
            }

            Stmt::Break { span } => self.check_in_loop("break", *span),
            Stmt::Continue { span } => self.check_in_loop("continue", *span),

            Stmt::Block { body, span } => {
                let scope = self.table.push_scope(ScopeKind::Block, None);
                self.annotations.scopes.insert(*span, scope);
                self.statements(body);
                self.table.pop_scope();
            }
        }
    }

    fn check_in_loop(&mut self, keyword: &'static str, span: Span) {
        let found = self.table.find_enclosing(
            self.table.current(),
            |s| s.kind.is_loop(),
            |s| s.kind.is_function_body() || s.kind == ScopeKind::Class,
        );
        if found.is_none() {
            self.error(SemanticError::OutsideLoop { keyword }, span);
        }
    }

    fn class_decl(&mut self, name: &str, parent: Option<&str>, methods: &[ast::Function], span: Span) {
        // A missing parent is reported but the class is still created
        let parent_id = match parent {
            None => None,
            Some(p) if p == name => {
                self.error(SemanticError::SelfInheritance { name: name.to_string() }, span);
                None
            }
            Some(p) => match self.table.resolve(p) {
                Some(Symbol::Class(id)) => Some(id),
                _ => {
                    self.error(SemanticError::ParentNotFound { name: p.to_string() }, span);
                    None
                }
            },
        };

        let class = match self.table.declare_class(name, parent_id) {
            Ok(class) => class,
            Err(err) => {
                self.error(err, span);
                return;
            }
        };
        self.annotations.classes.insert(span, class);
        self.annotations.scopes.insert(span, self.table.current());

        // All methods are known before any body is checked
        let mut declared = Vec::new();
        for method in methods {
            let method_name = method.name.as_deref().unwrap_or("anon");
            match self.table.declare_function(method_name, &method.params, Some(class)) {
                Ok(id) => {
                    self.table.add_method(class, id);
                    declared.push((id, method));
                }
                Err(err) => self.error(err, method.span),
            }
        }

        for (id, method) in declared {
            let kind = if method.name.as_deref() == Some("init") {
                ScopeKind::Constructor
            } else {
                ScopeKind::Function
            };
            self.function_body(id, method, kind);
        }

        self.table.pop_scope();
    }

    fn function_body(&mut self, id: FunctionId, func: &ast::Function, kind: ScopeKind) {
        let body = self.table.push_scope(kind, Some(ScopeRef::Function(id)));
        self.annotations.scopes.insert(func.span, body);
        self.annotations.functions.insert(func.span, id);
        self.table.function_mut(id).body = Some(body);

        if let Some(class) = self.table.function(id).class {
            if let Ok(this) = self.table.declare_object("this", Type::SelfRef(class)) {
                self.table.function_mut(id).this_object = Some(this);
            }
        }

        let mut params = Vec::new();
        for param in &func.params {
            match self.table.declare_object(param, Type::Any) {
                Ok(object) => params.push(object),
                Err(err) => self.error(err, func.span),
            }
        }
        self.table.function_mut(id).param_objects = params;

        self.statements(&func.body);
        self.table.pop_scope();
    }

    fn expr(&mut self, expr: &Expr) -> Type {
        let ty = self.expr_kind(expr);
        self.annotations.types.insert(expr.span, ty.clone());
        ty
    }

    fn expr_kind(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::Int(_) => Type::Int,
            ExprKind::Float(_) => Type::Float,
            ExprKind::Str(_) => Type::Str,
            ExprKind::Bool(_) => Type::Bool,
            ExprKind::Nil => Type::Nil,

            ExprKind::This => match self.current_this() {
                Some(this) => {
                    self.annotations.symbols.insert(expr.span, Symbol::Object(this));
                    self.table.object_type(this)
                }
                None => {
                    self.error(SemanticError::ThisOutsideMethod, expr.span);
                    Type::Error
                }
            },

            ExprKind::Variable(name) => match self.table.resolve(name) {
                Some(symbol) => {
                    let ty = self.table.symbol_type(&symbol);
                    self.annotations.symbols.insert(expr.span, symbol);
                    ty
                }
                None => {
                    self.error(SemanticError::Undeclared { name: name.clone() }, expr.span);
                    Type::Error
                }
            },

            ExprKind::Super(name) => self.super_access(name, expr.span),

            ExprKind::Array(elements) => {
                for element in elements {
                    self.expr(element);
                }
                // `[]` lowers to nil
                if elements.is_empty() {
                    Type::Nil
                } else {
                    Type::Array
                }
            }

            ExprKind::Lambda(func) => {
                let id = self.table.declare_anonymous_function(&func.params);
                self.function_body(id, func, ScopeKind::Function);
                Type::Function(id)
            }

            ExprKind::Binary { op, left, right } => {
                let l = self.expr(left);
                let r = self.expr(right);
                self.binary(*op, &l, &r, expr.span)
            }

            ExprKind::Logical { op, left, right } => {
                let l = self.expr(left);
                let r = self.expr(right);
                if !l.is_condition() || !r.is_condition() {
                    let op = match op {
                        ast::LogicalOp::And => "and",
                        ast::LogicalOp::Or => "or",
                    };
                    self.error(
                        SemanticError::InvalidOperands {
                            op,
                            left: l.to_string(),
                            right: r.to_string(),
                        },
                        expr.span,
                    );
                }
                Type::Bool
            }

            ExprKind::Unary { op, operand } => {
                let ty = self.expr(operand);
                match op {
                    UnaryOp::Neg if is_arithmetic(&ty) => ty.arithmetic(&Type::Int),
                    UnaryOp::Not if ty.is_condition() => Type::Bool,
                    _ => {
                        let op = if *op == UnaryOp::Neg { "-" } else { "!" };
                        self.error(
                            SemanticError::InvalidOperand { op, operand: ty.to_string() },
                            expr.span,
                        );
                        Type::Error
                    }
                }
            }

            ExprKind::Chain { head, suffixes } => self.chain(head, suffixes),

            ExprKind::Assign { name, name_span, value } => {
                let ty = self.expr(value);
                match self.table.resolve(name) {
                    Some(Symbol::Object(id)) => {
                        self.table.assign_object(id, ty.clone());
                        self.annotations.symbols.insert(*name_span, Symbol::Object(id));
                    }
                    Some(_) => {
                        self.error(SemanticError::InvalidAssignment { name: name.clone() }, *name_span);
                    }
                    None => {
                        self.error(SemanticError::Undeclared { name: name.clone() }, *name_span);
                    }
                }
                ty
            }

            ExprKind::Set { receiver, name, value } => {
                let target = self.expr(receiver);
                let ty = self.expr(value);
                let property = match &target {
                    Type::SelfRef(class) => Some(self.table.set_class_property(*class, name, ty.clone())),
                    Type::Instance { instance, .. } => {
                        Some(self.table.set_instance_property(*instance, name, ty.clone()))
                    }
                    Type::Error => None,
                    other => {
                        self.error(
                            SemanticError::InvalidPropertyTarget {
                                name: name.clone(),
                                found: other.to_string(),
                            },
                            expr.span,
                        );
                        None
                    }
                };
                if let Some(property) = property {
                    self.annotations
                        .steps
                        .insert(expr.span, Step::Property { index: property.index });
                }
                ty
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, l: &Type, r: &Type, span: Span) -> Type {
        let valid = match op {
            BinaryOp::Add => {
                let stringy = |t: &Type| matches!(t, Type::Str) || is_arithmetic(t);
                (matches!(l, Type::Str) && stringy(r))
                    || (matches!(r, Type::Str) && stringy(l))
                    || (is_arithmetic(l) && is_arithmetic(r))
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                is_arithmetic(l) && is_arithmetic(r)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let comparable = |t: &Type| matches!(t, Type::Str) || is_arithmetic(t);
                let mixed = (matches!(l, Type::Str) && matches!(r, Type::Int | Type::Float))
                    || (matches!(r, Type::Str) && matches!(l, Type::Int | Type::Float));
                comparable(l) && comparable(r) && !mixed
            }
            BinaryOp::Eq | BinaryOp::Ne => true,
        };

        if !valid {
            self.error(
                SemanticError::InvalidOperands {
                    op: op_name(op),
                    left: l.to_string(),
                    right: r.to_string(),
                },
                span,
            );
            return Type::Error;
        }

        match op {
            _ if op.is_comparison() => Type::Bool,
            BinaryOp::Add if matches!(l, Type::Str) || matches!(r, Type::Str) => Type::Str,
            BinaryOp::Div => Type::Float,
            _ => l.arithmetic(r),
        }
    }

    /// `this` object of the innermost function body, when that function is a method.
    fn current_this(&self) -> Option<ObjectId> {
        self.table
            .enclosing_function(self.table.current())
            .and_then(|f| self.table.function(f).this_object)
    }

    fn current_class(&self) -> Option<ClassId> {
        self.table
            .enclosing_function(self.table.current())
            .and_then(|f| self.table.function(f).class)
    }

    fn super_access(&mut self, name: &str, span: Span) -> Type {
        let parent = self
            .current_class()
            .and_then(|class| self.table.class(class).parent);
        let Some(parent) = parent else {
            self.error(SemanticError::SuperOutsideSubclass, span);
            return Type::Error;
        };

        // Only the parent's own members, no further lookup outwards
        if let Some(overload) = self.table.class_method(parent, name) {
            self.annotations.steps.insert(
                span,
                Step::Method { overload: overload.clone(), via_super: true },
            );
            return Type::SuperMethod(overload);
        }
        if let Some(property) = self.table.class_property(parent, name) {
            self.annotations
                .steps
                .insert(span, Step::Property { index: property.index });
            return property.ty;
        }

        self.error(SemanticError::UndefinedProperty { name: name.to_string() }, span);
        Type::Error
    }

    fn chain(&mut self, head: &Expr, suffixes: &[ast::Suffix]) -> Type {
        let mut ty = self.expr(head);
        // set when the previous step resolved a method that still needs its call
        let mut has_receiver = matches!(ty, Type::SuperMethod(_));

        for suffix in suffixes {
            let key = Span::new(head.span.start, suffix.span.end);
            let (next, receiver) = match &suffix.kind {
                SuffixKind::Get(name) => self.member(&ty, name, key, suffix.span),
                SuffixKind::Index(index) => (self.index(&ty, index, key, suffix.span), false),
                SuffixKind::Call(args) => {
                    let arg_types: Vec<Type> = args.iter().map(|a| self.expr(a)).collect();
                    (self.call(&ty, arg_types.len(), has_receiver, key, suffix.span), false)
                }
            };
            ty = next;
            has_receiver = receiver;
            self.annotations.types.insert(key, ty.clone());
        }
        ty
    }

    fn member(&mut self, target: &Type, name: &str, key: Span, span: Span) -> (Type, bool) {
        match target {
            Type::SelfRef(class) => {
                if let Some(property) = self.table.class_property(*class, name) {
                    self.annotations.steps.insert(key, Step::Property { index: property.index });
                    return (property.ty, false);
                }
                if let Some(overload) = self.table.class_method(*class, name) {
                    self.annotations.steps.insert(
                        key,
                        Step::Method { overload: overload.clone(), via_super: false },
                    );
                    return (Type::Overload(overload), true);
                }
                // read before the first write inside the class: the attribute exists as any
                let property = self.table.set_class_property(*class, name, Type::Any);
                self.annotations.steps.insert(key, Step::Property { index: property.index });
                (Type::Any, false)
            }

            Type::Instance { instance, .. } => {
                if let Some(property) = self.table.instance_property(*instance, name) {
                    self.annotations.steps.insert(key, Step::Property { index: property.index });
                    return (property.ty, false);
                }
                if let Some(overload) = self.table.instance_method(*instance, name) {
                    self.annotations.steps.insert(
                        key,
                        Step::Method { overload: overload.clone(), via_super: false },
                    );
                    return (Type::Overload(overload), true);
                }
                self.error(SemanticError::UndefinedProperty { name: name.to_string() }, span);
                (Type::Error, false)
            }

            Type::Error => (Type::Error, false),

            other => {
                self.error(
                    SemanticError::NotAClass {
                        name: name.to_string(),
                        found: other.to_string(),
                    },
                    span,
                );
                (Type::Error, false)
            }
        }
    }

    fn index(&mut self, target: &Type, index: &Expr, key: Span, span: Span) -> Type {
        let index_ty = self.expr(index);
        if !matches!(index_ty, Type::Int) && !index_ty.is_dynamic() {
            self.error(
                SemanticError::InvalidOperands {
                    op: "[]",
                    left: target.to_string(),
                    right: index_ty.to_string(),
                },
                index.span,
            );
        }
        match target {
            Type::Array | Type::Any | Type::Union(_) => {
                self.annotations.steps.insert(key, Step::Index);
                Type::Any
            }
            Type::Error => Type::Error,
            other => {
                self.error(SemanticError::NotIndexable { found: other.to_string() }, span);
                Type::Error
            }
        }
    }

    fn call(&mut self, callee: &Type, argc: usize, has_receiver: bool, key: Span, span: Span) -> Type {
        match callee {
            Type::Overload(overload) | Type::SuperMethod(overload) => {
                let Some(id) = overload.get_by_arity(argc) else {
                    self.error(SemanticError::NotCallable { found: callee.to_string() }, span);
                    return Type::Error;
                };
                self.call_function(id, argc, has_receiver, key, span)
            }

            Type::Function(id) => self.call_function(*id, argc, has_receiver, key, span),

            Type::Class(class) => {
                let constructor = self.table.class(*class).constructor;
                let expected = constructor.map(|c| self.table.function(c).arity()).unwrap_or(0);
                if expected != argc {
                    let name = self.table.class(*class).name.clone();
                    self.error(SemanticError::ArityMismatch { name, expected, actual: argc }, span);
                }
                self.annotations.steps.insert(
                    key,
                    Step::Instantiate { class: *class, constructor },
                );
                self.table.new_instance(*class)
            }

            Type::Error => Type::Error,

            other => {
                self.error(SemanticError::NotCallable { found: other.to_string() }, span);
                Type::Error
            }
        }
    }

    fn call_function(&mut self, id: FunctionId, argc: usize, has_receiver: bool, key: Span, span: Span) -> Type {
        let (name, expected, is_method, ty) = {
            let f = self.table.function(id);
            (f.name.clone(), f.arity(), f.is_method, f.return_type.clone())
        };
        if expected != argc {
            self.error(SemanticError::ArityMismatch { name, expected, actual: argc }, span);
        } else if is_method && !has_receiver {
            self.error(SemanticError::MissingReceiver { name }, span);
        }
        self.annotations.steps.insert(key, Step::Call { function: id });
        ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser;

    fn analyze(src: &str) -> Result<Analysis, Vec<Diagnostic>> {
        let program = parser::parse(src).expect("test program should parse");
        check(&program)
    }

    fn errors(src: &str) -> Vec<SemanticError> {
        match analyze(src) {
            Ok(_) => Vec::new(),
            Err(diagnostics) => diagnostics.into_iter().map(|d| d.error).collect(),
        }
    }

    #[test]
    fn test_valid_programs() {
        #[rustfmt::skip]
        let programs = [
            "var x = 1 + 2; print x;",
            "var s = \"a\" + \"b\"; print s;",
            "class A { init(n) { this.n = n; } get() { return this.n; } } var a = A(7); print a.get();",
            "fun f(x) { if (x < 2) return x; return f(x-1) + f(x-2); } print f(6);",
            "var a; a = 1; a = \"hi\"; print a;",
            "class A { m() { return 1; } } class B < A { m() { return super.m() + 1; } } print B().m();",
            "var i = 0; while (i < 3) { if (i == 1) { i = i + 1; continue; } i = i + 1; }",
            "for (var i = 0; i < 3; i = i + 1) { if (i > 1) break; print i; }",
            "var f = fun(x) { return x; }; print f(3);",
            "var a = [1, 2, 3]; print a[1];",
        ];
        for src in programs {
            assert_eq!(errors(src), Vec::new(), "unexpected errors for {}", src);
        }
    }

    #[test]
    fn test_errors_are_collected() {
        let errs = errors("print x; var a = 1; var a = 2; if (1) print a;");
        assert_eq!(errs.len(), 3);
        assert!(matches!(errs[0], SemanticError::Undeclared { .. }));
        assert!(matches!(errs[1], SemanticError::Redeclared { .. }));
        assert!(matches!(errs[2], SemanticError::InvalidCondition { .. }));
    }

    #[test]
    fn test_this_outside_method() {
        assert_eq!(errors("print this;"), vec![SemanticError::ThisOutsideMethod]);
        // a nested function inside a method does not see the receiver
        assert_eq!(
            errors("class A { m() { var f = fun() { return this; }; } }"),
            vec![SemanticError::ThisOutsideMethod]
        );
    }

    #[test]
    fn test_super_requires_parent() {
        assert_eq!(
            errors("class A { m() { return super.m(); } }"),
            vec![SemanticError::SuperOutsideSubclass]
        );
    }

    #[test]
    fn test_return_break_continue_placement() {
        assert_eq!(errors("return 1;"), vec![SemanticError::ReturnOutsideFunction]);
        assert_eq!(errors("break;"), vec![SemanticError::OutsideLoop { keyword: "break" }]);
        assert_eq!(
            errors("while (true) { fun f() { continue; } }"),
            vec![SemanticError::OutsideLoop { keyword: "continue" }]
        );
    }

    #[test]
    fn test_parent_not_found_still_creates_class() {
        let errs = errors("class B < Missing { m() { return 1; } } print B().m();");
        assert_eq!(errs, vec![SemanticError::ParentNotFound { name: "Missing".into() }]);
    }

    #[test]
    fn test_arity_mismatch() {
        let errs = errors("fun f(a, b) { return a; } f(1);");
        assert!(matches!(errs[0], SemanticError::ArityMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_not_callable() {
        let errs = errors("var x = 1; x();");
        assert!(matches!(errs[0], SemanticError::NotCallable { .. }));
    }

    #[test]
    fn test_any_values_are_not_dispatched() {
        // no static target exists for an indirect call or an untyped member read
        let errs = errors("fun ap(f, x) { return f(x); }");
        assert!(matches!(errs[0], SemanticError::NotCallable { .. }));
        let errs = errors("fun h(o) { return o.x; }");
        assert!(matches!(errs[0], SemanticError::NotAClass { .. }));
    }

    #[test]
    fn test_attribute_on_non_class() {
        let errs = errors("var x = 1; x.y = 2;");
        assert!(matches!(errs[0], SemanticError::InvalidPropertyTarget { .. }));
        let errs = errors("var x = 1; print x.y;");
        assert!(matches!(errs[0], SemanticError::NotAClass { .. }));
    }

    #[test]
    fn test_return_type_narrows() {
        let analysis = analyze("fun f() { return 1; } fun g() { }").unwrap();
        let table = &analysis.table;
        let Some(Symbol::Overload(f)) = table.resolve("f") else {
            panic!("f should resolve");
        };
        let Some(Symbol::Overload(g)) = table.resolve("g") else {
            panic!("g should resolve");
        };
        let f = f.get_by_arity(0).unwrap();
        let g = g.get_by_arity(0).unwrap();
        assert_eq!(table.function(f).return_type, Type::Int);
        assert_eq!(table.function(g).return_type, Type::Nil);
    }

    #[test]
    fn test_storage_widens_on_mixed_assignment() {
        let analysis = analyze("var a; a = 1; a = \"hi\"; var b = 2; b = 3;").unwrap();
        let table = &analysis.table;
        let Some(Symbol::Object(a)) = table.resolve("a") else {
            panic!("a should resolve");
        };
        let Some(Symbol::Object(b)) = table.resolve("b") else {
            panic!("b should resolve");
        };
        assert_eq!(table.object(a).storage, Type::Any);
        assert_eq!(table.object(a).ty, Type::Str);
        assert_eq!(table.object(b).storage, Type::Int);
    }

    #[test]
    fn test_empty_array_is_nil() {
        let analysis = analyze("var a = []; var b = [1]; print a == nil;").unwrap();
        let table = &analysis.table;
        let Some(Symbol::Object(a)) = table.resolve("a") else {
            panic!("a should resolve");
        };
        let Some(Symbol::Object(b)) = table.resolve("b") else {
            panic!("b should resolve");
        };
        assert_eq!(table.object(a).storage, Type::Nil);
        assert_eq!(table.object(b).storage, Type::Array);
    }

    #[test]
    fn test_class_property_union() {
        let analysis = analyze(
            "class A { init() { this.x = 1; } set() { this.x = \"s\"; } }",
        )
        .unwrap();
        let table = &analysis.table;
        let Some(Symbol::Class(a)) = table.resolve("A") else {
            panic!("A should resolve");
        };
        let x = table.class(a).property("x").unwrap();
        assert!(x.ty.equals(&Type::Int));
        assert!(x.ty.equals(&Type::Str));
        assert_eq!(x.index, 0);
    }

    #[test]
    fn test_method_overloads_by_arity() {
        let analysis = analyze(
            "class A { m() { return 1; } m(x) { return \"s\"; } } var a = A(); var r = a.m(2);",
        )
        .unwrap();
        let table = &analysis.table;
        let Some(Symbol::Object(r)) = table.resolve("r") else {
            panic!("r should resolve");
        };
        assert_eq!(table.object(r).ty, Type::Str);
    }
}
