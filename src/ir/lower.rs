use std::slice;

use crate::analysis::semantic::{Analysis, Annotations, Step};
use crate::analysis::symbols::{FunctionId, ObjectId, ScopeId, Symbol, SymbolTable, WORD};
use crate::analysis::types::Type;
use crate::frontend::ast::{self, BinaryOp, Expr, ExprKind, LogicalOp, Span, Stmt, SuffixKind, UnaryOp};
use crate::ir::{InstrList, Instruction, Literal, Op, Operand, Shift};

/// Attribute slots reserved in every instance, after the tag word.
pub const MAX_PROPERTIES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error("no {what} recorded for the node at {span}")]
    MissingAnnotation { what: &'static str, span: Span },

    #[error("'{0}' outside of a loop")]
    OutsideLoop(&'static str),

    #[error("method call without a receiver at {span}")]
    MissingReceiver { span: Span },
}

type Result<T> = std::result::Result<T, LowerError>;

/// Code computing a value, and where that value ends up.
struct Lowered {
    addr: Operand,
    code: InstrList,
}

impl Lowered {
    fn value(addr: Operand) -> Self {
        Self {
            addr,
            code: InstrList::new(),
        }
    }
}

struct LoopParams {
    repeat: String,
    end: String,
    // label in front of the update, used when the update cannot be replayed
    next: Option<String>,
    update: Option<InstrList>,
}

pub struct CodegenContext<'a> {
    table: &'a mut SymbolTable,
    annotations: &'a Annotations,
    next_label: usize,
    loops: Vec<LoopParams>,
    receivers: Vec<Option<ObjectId>>,
}

impl<'a> CodegenContext<'a> {
    pub fn new(table: &'a mut SymbolTable, annotations: &'a Annotations) -> Self {
        Self {
            table,
            annotations,
            next_label: 0,
            loops: Vec::new(),
            receivers: Vec::new(),
        }
    }

    fn new_label(&mut self) -> String {
        let label = format!("L{}", self.next_label);
        self.next_label += 1;
        label
    }

    /// Fresh temporary in the current scope, placed immediately.
    fn temp(&mut self, ty: Type) -> ObjectId {
        let id = self.table.declare_temporary(ty);
        self.table.assign_offset(id);
        id
    }

    /// Makes `scope` current and returns the scope to restore afterwards.
    fn enter(&mut self, scope: ScopeId) -> ScopeId {
        let saved = self.table.current();
        self.table.enter(scope);
        saved
    }

    fn scope_at(&self, span: Span) -> Result<ScopeId> {
        self.annotations
            .scopes
            .get(&span)
            .copied()
            .ok_or(LowerError::MissingAnnotation { what: "scope", span })
    }

    fn function_at(&self, span: Span) -> Result<FunctionId> {
        self.annotations
            .functions
            .get(&span)
            .copied()
            .ok_or(LowerError::MissingAnnotation { what: "function", span })
    }

    fn symbol_at(&self, span: Span) -> Result<&Symbol> {
        self.annotations
            .symbols
            .get(&span)
            .ok_or(LowerError::MissingAnnotation { what: "symbol", span })
    }

    fn object_at(&self, span: Span) -> Result<ObjectId> {
        match self.symbol_at(span)? {
            Symbol::Object(id) => Ok(*id),
            _ => Err(LowerError::MissingAnnotation { what: "variable", span }),
        }
    }

    fn step_at(&self, span: Span) -> Result<&Step> {
        self.annotations
            .steps
            .get(&span)
            .ok_or(LowerError::MissingAnnotation { what: "access", span })
    }

    fn flow_type(&self, span: Span) -> Type {
        self.annotations.types.get(&span).cloned().unwrap_or(Type::Any)
    }

    fn receiver(&self) -> Option<ObjectId> {
        self.receivers.last().copied().flatten()
    }
}

/// Lowers an analyzed program into one flat instruction list. Temporaries
/// and offsets are added to the analysis' symbol table along the way.
pub fn lower(program: &ast::Program, analysis: &mut Analysis) -> Result<InstrList> {
    let Analysis { table, annotations } = analysis;
    let global = table.global();
    table.enter(global);

    let mut ctx = CodegenContext::new(table, annotations);
    let code = lower_statements(&mut ctx, &program.statements)?;

    log::debug!(
        "lowered program into {} instruction(s) using {} label(s)",
        code.len(),
        ctx.next_label
    );
    Ok(code)
}

fn register_free() -> Instruction {
    Instruction::new(Op::RegisterFree, None, None, None)
}

fn lower_statements(ctx: &mut CodegenContext, stmts: &[Stmt]) -> Result<InstrList> {
    let mut code = InstrList::new();
    for stmt in stmts {
        code.concat(lower_statement(ctx, stmt)?);
        code.push(register_free());
    }
    Ok(code)
}

// Body of an if branch or a while loop, inside the scope recorded for it
fn lower_scoped(ctx: &mut CodegenContext, stmt: &Stmt) -> Result<InstrList> {
    let scope = ctx.scope_at(stmt.span())?;
    let saved = ctx.enter(scope);
    let code = match stmt {
        Stmt::Block { body, .. } => lower_statements(ctx, body),
        other => lower_statements(ctx, slice::from_ref(other)),
    };
    ctx.table.enter(saved);
    code
}

fn lower_statement(ctx: &mut CodegenContext, stmt: &Stmt) -> Result<InstrList> {
    log::trace!("lowering statement at {}", stmt.span());
    match stmt {
        Stmt::Class { methods, span, .. } => {
            let scope = ctx.scope_at(*span)?;
            let saved = ctx.enter(scope);
            let mut code = InstrList::new();
            for method in methods {
                let id = ctx.function_at(method.span)?;
                code.concat(lower_function(ctx, id, method)?);
            }
            ctx.table.enter(saved);
            Ok(code)
        }

        Stmt::Fun(func) => {
            let id = ctx.function_at(func.span)?;
            lower_function(ctx, id, func)
        }

        Stmt::Var { value, span, .. } => {
            let object = ctx.object_at(*span)?;
            ctx.table.assign_offset(object);

            let mut code = InstrList::new();
            let value = match value {
                Some(value) => {
                    let lowered = lower_expression(ctx, value)?;
                    code.concat(lowered.code);
                    lowered.addr
                }
                None => Operand::Value(Literal::Nil),
            };
            code.push(Instruction::store(value, Operand::Object(object)));
            Ok(code)
        }

        Stmt::Expr { expr, .. } => Ok(lower_expression(ctx, expr)?.code),

        Stmt::Print { expr, .. } => {
            let lowered = lower_expression(ctx, expr)?;
            let mut code = lowered.code;
            code.push(Instruction::new(Op::Print, Some(lowered.addr), None, None));
            Ok(code)
        }

        Stmt::Return { value, .. } => {
            let mut code = InstrList::new();
            let value = match value {
                Some(value) => {
                    let lowered = lower_expression(ctx, value)?;
                    code.concat(lowered.code);
                    lowered.addr
                }
                None => Operand::Value(Literal::Nil),
            };
            code.push(Instruction::new(Op::Return, Some(value), None, None));
            Ok(code)
        }

        Stmt::If { cond, then_branch, else_branch, .. } => {
            let cond = lower_expression(ctx, cond)?;
            let mut code = cond.code;
            let end = ctx.new_label();

            match else_branch {
                Some(else_branch) => {
                    let otherwise = ctx.new_label();
                    code.push(Instruction::if_false(cond.addr, &otherwise));
                    code.concat(lower_scoped(ctx, then_branch)?);
                    code.push(Instruction::goto(&end));
                    code.push(Instruction::label(&otherwise));
                    code.concat(lower_scoped(ctx, else_branch)?);
                }
                None => {
                    code.push(Instruction::if_false(cond.addr, &end));
                    code.concat(lower_scoped(ctx, then_branch)?);
                }
            }
            code.push(Instruction::label(&end));
            Ok(code)
        }

        Stmt::While { cond, body, .. } => {
            let repeat = ctx.new_label();
            let end = ctx.new_label();

            let mut code = InstrList::single(Instruction::label(&repeat));
            let cond = lower_expression(ctx, cond)?;
            code.concat(cond.code);
            code.push(Instruction::if_false(cond.addr, &end));

            ctx.loops.push(LoopParams {
                repeat: repeat.clone(),
                end: end.clone(),
                next: None,
                update: None,
            });
            let body = lower_scoped(ctx, body);
            ctx.loops.pop();

            code.concat(body?);
            code.push(Instruction::goto(&repeat));
            code.push(Instruction::label(&end));
            Ok(code)
        }

        Stmt::For { init, cond, update, body, span } => {
            let scope = ctx.scope_at(*span)?;
            let saved = ctx.enter(scope);
            let repeat = ctx.new_label();
            let end = ctx.new_label();

            let mut code = InstrList::new();
            if let Some(init) = init {
                code.concat(lower_statement(ctx, init)?);
                code.push(register_free());
            }

            let update = match update {
                Some(update) => Some(lower_expression(ctx, update)?.code),
                None => None,
            };
            let next = match &update {
                Some(update) if update.has_labels() => Some(ctx.new_label()),
                _ => None,
            };

            code.push(Instruction::label(&repeat));
            if let Some(cond) = cond {
                let cond = lower_expression(ctx, cond)?;
                code.concat(cond.code);
                code.push(Instruction::if_false(cond.addr, &end));
            }

            ctx.loops.push(LoopParams {
                repeat: repeat.clone(),
                end: end.clone(),
                next: next.clone(),
                update: update.clone(),
            });
            let body = match body.as_ref() {
                Stmt::Block { body, .. } => lower_statements(ctx, body),
                other => lower_statements(ctx, slice::from_ref(other)),
            };
            ctx.loops.pop();
            code.concat(body?);

            if let Some(next) = &next {
                code.push(Instruction::label(next));
            }
            if let Some(update) = update {
                code.concat(update);
                code.push(register_free());
            }
            code.push(Instruction::goto(&repeat));
            code.push(Instruction::label(&end));

            ctx.table.enter(saved);
            Ok(code)
        }

        Stmt::Break { .. } => {
            let params = ctx.loops.last().ok_or(LowerError::OutsideLoop("break"))?;
            Ok(InstrList::single(Instruction::goto(&params.end)))
        }

        Stmt::Continue { .. } => {
            let params = ctx.loops.last().ok_or(LowerError::OutsideLoop("continue"))?;
            let mut code = InstrList::new();
            match (&params.next, &params.update) {
                (Some(next), _) => code.push(Instruction::goto(next)),
                (None, Some(update)) => {
                    // replay the update inline, then jump back to the test
                    code.concat(update.copy(update.len()));
                    code.push(Instruction::goto(&params.repeat));
                }
                (None, None) => code.push(Instruction::goto(&params.repeat)),
            }
            Ok(code)
        }

        Stmt::Block { body, span } => {
            let scope = ctx.scope_at(*span)?;
            let saved = ctx.enter(scope);
            let code = lower_statements(ctx, body);
            ctx.table.enter(saved);
            code
        }
    }
}

fn lower_function(ctx: &mut CodegenContext, id: FunctionId, func: &ast::Function) -> Result<InstrList> {
    let (body, this, params) = {
        let f = ctx.table.function(id);
        (f.body, f.this_object, f.param_objects.clone())
    };
    let body = body.ok_or(LowerError::MissingAnnotation {
        what: "function body",
        span: func.span,
    })?;
    let saved = ctx.enter(body);

    let mut code = InstrList::single(Instruction::new(
        Op::Function,
        Some(Operand::Function(id)),
        None,
        None,
    ));
    for (slot, object) in this.into_iter().chain(params).enumerate() {
        ctx.table.assign_offset(object);
        code.push(Instruction::new(
            Op::GetArg,
            Some(Operand::int(slot as i32)),
            None,
            Some(Operand::Object(object)),
        ));
    }

    // loops of the enclosing code are not visible from inside the body
    let loops = std::mem::take(&mut ctx.loops);
    ctx.receivers.push(this);
    let statements = lower_statements(ctx, &func.body);
    ctx.receivers.pop();
    ctx.loops = loops;
    code.concat(statements?);

    code.push(Instruction::new(Op::Return, Some(Operand::Value(Literal::Nil)), None, None));
    code.push(Instruction::new(Op::EndFunction, Some(Operand::Function(id)), None, None));
    ctx.table.enter(saved);
    Ok(code)
}

/// Turns any operand into an object, copying it into a temporary if needed.
fn as_object(ctx: &mut CodegenContext, code: &mut InstrList, addr: Operand) -> ObjectId {
    match addr {
        Operand::Object(id) => id,
        other => {
            let ty = other.runtime_type(ctx.table);
            let temp = ctx.temp(ty);
            code.push(Instruction::store(other, Operand::Object(temp)));
            temp
        }
    }
}

fn property_slot(base: ObjectId, index: usize) -> Operand {
    Operand::Offset {
        base,
        shift: Shift::Const(((index + 1) * WORD) as i32),
    }
}

fn lower_expression(ctx: &mut CodegenContext, expr: &Expr) -> Result<Lowered> {
    match &expr.kind {
        ExprKind::Int(v) => Ok(Lowered::value(Operand::Value(Literal::Int(*v)))),
        ExprKind::Float(v) => Ok(Lowered::value(Operand::Value(Literal::Float(*v)))),
        ExprKind::Str(s) => Ok(Lowered::value(Operand::Value(Literal::Str(s.clone())))),
        ExprKind::Bool(b) => Ok(Lowered::value(Operand::Value(Literal::Bool(*b)))),
        ExprKind::Nil => Ok(Lowered::value(Operand::Value(Literal::Nil))),

        ExprKind::This => Ok(Lowered::value(Operand::Object(ctx.object_at(expr.span)?))),

        ExprKind::Variable(_) => {
            let addr = match ctx.symbol_at(expr.span)? {
                Symbol::Object(id) => Operand::Object(*id),
                Symbol::Overload(overload) => match overload.functions().next() {
                    Some(id) => Operand::Function(id),
                    None => Operand::Value(Literal::Nil),
                },
                Symbol::Class(id) => Operand::Class(*id),
            };
            Ok(Lowered::value(addr))
        }

        ExprKind::Super(_) => {
            let this = ctx
                .receiver()
                .ok_or(LowerError::MissingReceiver { span: expr.span })?;
            let addr = match ctx.step_at(expr.span)? {
                Step::Property { index } => property_slot(this, *index),
                _ => Operand::Object(this),
            };
            Ok(Lowered::value(addr))
        }

        ExprKind::Array(elements) => {
            if elements.is_empty() {
                return Ok(Lowered::value(Operand::Value(Literal::Nil)));
            }
            let base = ctx.temp(Type::Array);
            let mut code = InstrList::single(Instruction::new(
                Op::Malloc,
                Some(Operand::int((elements.len() * WORD) as i32)),
                None,
                Some(Operand::Object(base)),
            ));
            for (i, element) in elements.iter().enumerate() {
                let lowered = lower_expression(ctx, element)?;
                code.concat(lowered.code);
                code.push(Instruction::store(
                    lowered.addr,
                    Operand::Offset {
                        base,
                        shift: Shift::Const((i * WORD) as i32),
                    },
                ));
            }
            Ok(Lowered {
                addr: Operand::Object(base),
                code,
            })
        }

        ExprKind::Lambda(func) => {
            let id = ctx.function_at(func.span)?;
            Ok(Lowered {
                addr: Operand::Function(id),
                code: lower_function(ctx, id, func)?,
            })
        }

        ExprKind::Binary { op, left, right } => lower_binary(ctx, *op, left, right),

        ExprKind::Logical { op, left, right } => {
            let left = lower_expression(ctx, left)?;
            let right = lower_expression(ctx, right)?;
            let result = ctx.temp(Type::Bool);
            let short = ctx.new_label();
            let end = ctx.new_label();

            let jump = |cond: Operand| match op {
                LogicalOp::And => Instruction::if_false(cond, &short),
                LogicalOp::Or => Instruction::if_true(cond, &short),
            };
            // value when no operand short-circuits, and when one does
            let (fallthrough, taken) = match op {
                LogicalOp::And => (true, false),
                LogicalOp::Or => (false, true),
            };

            let mut code = left.code;
            code.push(jump(left.addr));
            code.concat(right.code);
            code.push(jump(right.addr));
            code.push(Instruction::store(
                Operand::Value(Literal::Bool(fallthrough)),
                Operand::Object(result),
            ));
            code.push(Instruction::goto(&end));
            code.push(Instruction::label(&short));
            code.push(Instruction::store(
                Operand::Value(Literal::Bool(taken)),
                Operand::Object(result),
            ));
            code.push(Instruction::label(&end));

            Ok(Lowered {
                addr: Operand::Object(result),
                code,
            })
        }

        ExprKind::Unary { op, operand } => {
            let lowered = lower_expression(ctx, operand)?;
            let mut code = lowered.code;
            let result = match op {
                UnaryOp::Neg => {
                    let ty = Type::Int.arithmetic(&lowered.addr.runtime_type(ctx.table));
                    let result = ctx.temp(ty);
                    code.push(Instruction::binary(Op::Minus, Operand::int(0), lowered.addr, result));
                    result
                }
                UnaryOp::Not => {
                    let result = ctx.temp(Type::Bool);
                    code.push(Instruction::binary(Op::Xor, lowered.addr, Operand::int(1), result));
                    result
                }
            };
            Ok(Lowered {
                addr: Operand::Object(result),
                code,
            })
        }

        ExprKind::Chain { head, suffixes } => lower_chain(ctx, head, suffixes),

        ExprKind::Assign { name_span, value, .. } => {
            let object = ctx.object_at(*name_span)?;
            let lowered = lower_expression(ctx, value)?;
            let mut code = lowered.code;
            code.push(Instruction::store(lowered.addr, Operand::Object(object)));
            Ok(Lowered {
                addr: Operand::Object(object),
                code,
            })
        }

        ExprKind::Set { receiver, value, .. } => {
            let index = match ctx.step_at(expr.span)? {
                Step::Property { index } => *index,
                _ => return Err(LowerError::MissingAnnotation { what: "attribute", span: expr.span }),
            };
            let target = lower_expression(ctx, receiver)?;
            let mut code = target.code;
            let base = as_object(ctx, &mut code, target.addr);

            let lowered = lower_expression(ctx, value)?;
            code.concat(lowered.code);
            code.push(Instruction::store(lowered.addr.clone(), property_slot(base, index)));
            Ok(Lowered {
                addr: lowered.addr,
                code,
            })
        }
    }
}

fn lower_binary(ctx: &mut CodegenContext, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Lowered> {
    let l = lower_expression(ctx, left)?;
    let r = lower_expression(ctx, right)?;
    let mut code = l.code;
    code.concat(r.code);

    let lt = l.addr.runtime_type(ctx.table);
    let rt = r.addr.runtime_type(ctx.table);
    let is_str = |t: &Type| matches!(t, Type::Str);
    let concat = op == BinaryOp::Add
        && (is_str(&lt)
            || is_str(&rt)
            || is_str(&ctx.flow_type(left.span))
            || is_str(&ctx.flow_type(right.span)));

    // `a > b` is `!(a <= b)` and `a >= b` is `!(a < b)`
    let (ir_op, ty, negate) = match op {
        BinaryOp::Add if concat => (Op::Concat, Type::Str, false),
        BinaryOp::Add => (Op::Plus, lt.arithmetic(&rt), false),
        BinaryOp::Sub => (Op::Minus, lt.arithmetic(&rt), false),
        BinaryOp::Mul => (Op::Mult, lt.arithmetic(&rt), false),
        BinaryOp::Mod => (Op::Mod, lt.arithmetic(&rt), false),
        BinaryOp::Div => (Op::Div, Type::Float, false),
        BinaryOp::Lt => (Op::Lt, Type::Bool, false),
        BinaryOp::Le => (Op::Le, Type::Bool, false),
        BinaryOp::Eq => (Op::Eq, Type::Bool, false),
        BinaryOp::Ne => (Op::Ne, Type::Bool, false),
        BinaryOp::Gt => (Op::Le, Type::Bool, true),
        BinaryOp::Ge => (Op::Lt, Type::Bool, true),
    };

    let result = ctx.temp(ty);
    code.push(Instruction::binary(ir_op, l.addr, r.addr, result));
    if !negate {
        return Ok(Lowered {
            addr: Operand::Object(result),
            code,
        });
    }

    let negated = ctx.temp(Type::Bool);
    code.push(Instruction::binary(Op::Xor, Operand::Object(result), Operand::int(1), negated));
    Ok(Lowered {
        addr: Operand::Object(negated),
        code,
    })
}

fn lower_chain(ctx: &mut CodegenContext, head: &Expr, suffixes: &[ast::Suffix]) -> Result<Lowered> {
    let first = lower_expression(ctx, head)?;
    let mut code = first.code;
    let mut addr = first.addr;

    // receiver of a method resolved by the previous step, waiting for its call
    let mut receiver: Option<Operand> = None;
    if matches!(head.kind, ExprKind::Super(_)) {
        if let Ok(Step::Method { .. }) = ctx.step_at(head.span) {
            receiver = Some(addr.clone());
        }
    }

    for suffix in suffixes {
        let key = Span::new(head.span.start, suffix.span.end);
        let step = ctx.step_at(key)?.clone();

        match (&suffix.kind, step) {
            (SuffixKind::Get(_), Step::Property { index }) => {
                let base = as_object(ctx, &mut code, addr);
                addr = property_slot(base, index);
            }

            (SuffixKind::Get(_), Step::Method { .. }) => {
                receiver = Some(addr.clone());
            }

            (SuffixKind::Index(index), Step::Index) => {
                let base = as_object(ctx, &mut code, addr);
                let lowered = lower_expression(ctx, index)?;
                code.concat(lowered.code);
                let ty = Type::Int.arithmetic(&lowered.addr.runtime_type(ctx.table));
                let shift = ctx.temp(ty);
                code.push(Instruction::binary(
                    Op::Mult,
                    lowered.addr,
                    Operand::int(WORD as i32),
                    shift,
                ));
                addr = Operand::Offset {
                    base,
                    shift: Shift::Object(shift),
                };
            }

            (SuffixKind::Call(args), Step::Call { function }) => {
                let mut params = Vec::new();
                if ctx.table.function(function).is_method {
                    let recv = receiver
                        .take()
                        .ok_or(LowerError::MissingReceiver { span: key })?;
                    params.push(recv);
                }
                for arg in args {
                    let lowered = lower_expression(ctx, arg)?;
                    code.concat(lowered.code);
                    params.push(lowered.addr);
                }
                let count = params.len() as i32;
                for param in params {
                    code.push(Instruction::new(Op::Param, Some(param), None, None));
                }
                code.push(Instruction::new(
                    Op::Call,
                    Some(Operand::Function(function)),
                    Some(Operand::int(count)),
                    None,
                ));

                let ty = ctx.table.function(function).return_type.clone();
                let result = ctx.temp(ty);
                code.push(Instruction::new(Op::ReturnVal, None, None, Some(Operand::Object(result))));
                addr = Operand::Object(result);
            }

            (SuffixKind::Call(args), Step::Instantiate { class, constructor }) => {
                let mut params = Vec::new();
                for arg in args {
                    let lowered = lower_expression(ctx, arg)?;
                    code.concat(lowered.code);
                    params.push(lowered.addr);
                }

                let instance = ctx.temp(ctx.flow_type(key));
                code.push(Instruction::new(
                    Op::Malloc,
                    Some(Operand::int(((MAX_PROPERTIES + 1) * WORD) as i32)),
                    Some(Operand::Class(class)),
                    Some(Operand::Object(instance)),
                ));
                if let Some(constructor) = constructor {
                    code.push(Instruction::new(Op::Param, Some(Operand::Object(instance)), None, None));
                    let count = params.len() as i32 + 1;
                    for param in params {
                        code.push(Instruction::new(Op::Param, Some(param), None, None));
                    }
                    code.push(Instruction::new(
                        Op::Call,
                        Some(Operand::Function(constructor)),
                        Some(Operand::int(count)),
                        None,
                    ));
                }
                addr = Operand::Object(instance);
            }

            (_, _) => {
                return Err(LowerError::MissingAnnotation { what: "access", span: key });
            }
        }
    }

    Ok(Lowered { addr, code })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::semantic;
    use crate::frontend::parser;

    fn lower_source(src: &str) -> (InstrList, Analysis) {
        let program = parser::parse(src).expect("test program should parse");
        let mut analysis = semantic::check(&program).expect("test program should check");
        let code = lower(&program, &mut analysis).expect("test program should lower");
        (code, analysis)
    }

    fn listing(src: &str) -> Vec<String> {
        let (code, analysis) = lower_source(src);
        code.render(&analysis.table)
            .unwrap()
            .lines()
            .map(|l| l.trim().to_string())
            .collect()
    }

    #[test]
    fn test_arithmetic_and_print() {
        assert_eq!(
            listing("var x = 1 + 2; print x;"),
            vec!["t0 = 1 PLUS 2", "x = t0", "REGISTER_FREE", "PRINT x", "REGISTER_FREE"]
        );
    }

    #[test]
    fn test_greater_than_is_negated_le() {
        let lines = listing("var b = 1 > 2;");
        assert_eq!(lines[0], "t0 = 1 LE 2");
        assert_eq!(lines[1], "t1 = t0 XOR 1");
        assert_eq!(lines[2], "b = t1");
    }

    #[test]
    fn test_while_shape() {
        let lines = listing("var i = 0; while (i < 3) { i = i + 1; }");
        let expected = [
            "i = 0",
            "REGISTER_FREE",
            "L0:",
            "t0 = i LT 3",
            "IF t0 == false GOTO L1",
            "t1 = i PLUS 1",
            "i = t1",
            "REGISTER_FREE",
            "GOTO L0",
            "L1:",
            "REGISTER_FREE",
        ];
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_continue_replays_for_update() {
        let lines = listing(
            "for (var i = 0; i < 5; i = i + 1) { if (i == 2) continue; print i; }",
        );
        let updates = lines.iter().filter(|l| l.ends_with("= i PLUS 1")).count();
        assert_eq!(updates, 2);
        let gotos = lines.iter().filter(|l| *l == "GOTO L0").count();
        assert_eq!(gotos, 2);
    }

    #[test]
    fn test_function_and_call() {
        let lines = listing("fun f(a, b) { return a; } var r = f(1, 2);");
        let expected = [
            "FUNCTION fn_0_f",
            "a = GET_ARG 0",
            "b = GET_ARG 1",
            "RETURN a",
            "REGISTER_FREE",
            "RETURN nil",
            "END_FUNCTION fn_0_f",
            "REGISTER_FREE",
            "PARAM 1",
            "PARAM 2",
            "CALL fn_0_f 2",
            "t0 = RETURN_VAL",
            "r = t0",
            "REGISTER_FREE",
        ];
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_instantiation_calls_constructor() {
        let lines = listing("class A { init(n) { this.n = n; } } var a = A(5);");
        assert!(lines.contains(&"this[4] = n".to_string()));
        let start = lines
            .iter()
            .position(|l| l.starts_with("t0 = MALLOC"))
            .expect("instance allocation");
        assert_eq!(lines[start], format!("t0 = MALLOC {} A", (MAX_PROPERTIES + 1) * WORD));
        assert_eq!(lines[start + 1], "PARAM t0");
        assert_eq!(lines[start + 2], "PARAM 5");
        assert_eq!(lines[start + 3], "CALL fn_0_init 2");
        assert_eq!(lines[start + 4], "a = t0");
    }

    #[test]
    fn test_method_call_passes_receiver_first() {
        let lines = listing(
            "class A { get(x) { return x; } } var a = A(); var v = a.get(3);",
        );
        let call = lines.iter().position(|l| l.starts_with("CALL fn_0_get")).unwrap();
        assert_eq!(lines[call], "CALL fn_0_get 2");
        assert_eq!(lines[call - 2], "PARAM a");
        assert_eq!(lines[call - 1], "PARAM 3");
    }

    #[test]
    fn test_empty_array_is_nil() {
        assert_eq!(listing("var a = [];")[0], "a = nil");
    }

    #[test]
    fn test_array_literal() {
        let lines = listing("var a = [1, 2];");
        assert_eq!(
            &lines[..4],
            &["t0 = MALLOC 8", "t0[0] = 1", "t0[4] = 2", "a = t0"]
        );
    }

    #[test]
    fn test_concat_chosen_by_string_operand() {
        let lines = listing("var s = \"n=\" + 3;");
        assert_eq!(lines[0], "t0 = \"n=\" CONCAT 3");
    }

    #[test]
    fn test_short_circuit_and() {
        let lines = listing("var a = true; var b = a and false;");
        assert!(lines.contains(&"IF a == false GOTO L0".to_string()));
        assert!(lines.contains(&"IF false == false GOTO L0".to_string()));
        assert!(lines.contains(&"t0 = true".to_string()));
        assert!(lines.contains(&"t0 = false".to_string()));
    }

    #[test]
    fn test_offsets_are_assigned() {
        let (_, analysis) = lower_source("var a = 1; { var b = a + 1; print b; }");
        for object in analysis.table.objects() {
            assert!(object.offset.is_some(), "{} was never placed", object.name);
        }
    }
}
