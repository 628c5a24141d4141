pub mod lower;

use std::fmt::Write;

use crate::analysis::symbols::{ClassId, FunctionId, ObjectId, SymbolTable};
use crate::analysis::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Bool(bool),
    Str(String),
    Nil,
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::Bool(_) => Type::Bool,
            Literal::Str(_) => Type::Str,
            Literal::Nil => Type::Nil,
        }
    }
}

/// Byte displacement from the base of an `Offset` operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Shift {
    Const(i32),
    Object(ObjectId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Literal),
    Object(ObjectId),
    // Heap slot at base + shift, holding a pointer to a tagged cell
    Offset { base: ObjectId, shift: Shift },
    Function(FunctionId),
    Class(ClassId),
}

impl Operand {
    pub fn int(value: i32) -> Self {
        Operand::Value(Literal::Int(value))
    }

    /// Type of the value this operand produces at runtime.
    pub fn runtime_type(&self, table: &SymbolTable) -> Type {
        match self {
            Operand::Value(literal) => literal.ty(),
            Operand::Object(id) => table.object(*id).storage.clone(),
            Operand::Offset { .. } => Type::Any,
            Operand::Function(id) => Type::Function(*id),
            Operand::Class(id) => Type::Class(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Store,
    Plus,
    Minus,
    Mult,
    Div,
    Mod,
    Concat,
    Lt,
    Le,
    Eq,
    Ne,
    Xor,
    Label,
    Goto,
    Function,
    EndFunction,
    GetArg,
    Param,
    Return,
    ReturnVal,
    Call,
    Malloc,
    Print,
    RegisterFree,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Store => "STORE",
            Op::Plus => "PLUS",
            Op::Minus => "MINUS",
            Op::Mult => "MULT",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Concat => "CONCAT",
            Op::Lt => "LT",
            Op::Le => "LE",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Xor => "XOR",
            Op::Label => "LABEL",
            Op::Goto => "GOTO",
            Op::Function => "FUNCTION",
            Op::EndFunction => "END_FUNCTION",
            Op::GetArg => "GET_ARG",
            Op::Param => "PARAM",
            Op::Return => "RETURN",
            Op::ReturnVal => "RETURN_VAL",
            Op::Call => "CALL",
            Op::Malloc => "MALLOC",
            Op::Print => "PRINT",
            Op::RegisterFree => "REGISTER_FREE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Single {
        op: Op,
        arg1: Option<Operand>,
        arg2: Option<Operand>,
        result: Option<Operand>,
    },
    // IF arg1 (== | !=) arg2 GOTO label
    Conditional {
        arg1: Operand,
        op: Op,
        arg2: Operand,
        label: String,
    },
    Empty,
}

impl Instruction {
    pub fn new(op: Op, arg1: Option<Operand>, arg2: Option<Operand>, result: Option<Operand>) -> Self {
        Instruction::Single { op, arg1, arg2, result }
    }

    pub fn store(value: Operand, target: Operand) -> Self {
        Self::new(Op::Store, Some(value), None, Some(target))
    }

    pub fn binary(op: Op, left: Operand, right: Operand, result: ObjectId) -> Self {
        Self::new(op, Some(left), Some(right), Some(Operand::Object(result)))
    }

    pub fn label(name: &str) -> Self {
        Self::new(Op::Label, Some(Operand::Value(Literal::Str(name.to_string()))), None, None)
    }

    pub fn goto(name: &str) -> Self {
        Self::new(Op::Goto, Some(Operand::Value(Literal::Str(name.to_string()))), None, None)
    }

    pub fn if_false(cond: Operand, label: &str) -> Self {
        Instruction::Conditional {
            arg1: cond,
            op: Op::Eq,
            arg2: Operand::Value(Literal::Bool(false)),
            label: label.to_string(),
        }
    }

    pub fn if_true(cond: Operand, label: &str) -> Self {
        Instruction::Conditional {
            arg1: cond,
            op: Op::Eq,
            arg2: Operand::Value(Literal::Bool(true)),
            label: label.to_string(),
        }
    }

    pub fn op(&self) -> Option<Op> {
        match self {
            Instruction::Single { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Label name carried by LABEL and GOTO.
    pub fn target(&self) -> Option<&str> {
        match self {
            Instruction::Single {
                op: Op::Label | Op::Goto,
                arg1: Some(Operand::Value(Literal::Str(name))),
                ..
            } => Some(name),
            Instruction::Conditional { label, .. } => Some(label),
            _ => None,
        }
    }
}

/// Ordered sequence of IR instructions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrList {
    instructions: Vec<Instruction>,
}

impl InstrList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(instruction: Instruction) -> Self {
        let mut list = Self::new();
        list.push(instruction);
        list
    }

    pub fn push(&mut self, instruction: Instruction) {
        if instruction != Instruction::Empty {
            self.instructions.push(instruction);
        }
    }

    pub fn concat(&mut self, other: InstrList) {
        self.instructions.extend(other.instructions);
    }

    /// Clone of the first `cut` instructions.
    pub fn copy(&self, cut: usize) -> InstrList {
        let end = cut.min(self.instructions.len());
        Self {
            instructions: self.instructions[..end].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn has_labels(&self) -> bool {
        self.instructions
            .iter()
            .any(|i| i.op() == Some(Op::Label) || i.op() == Some(Op::Function))
    }

    /// Human readable listing, one instruction per line.
    pub fn render(&self, table: &SymbolTable) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        for instruction in &self.instructions {
            render_instruction(&mut out, instruction, table)?;
        }
        Ok(out)
    }
}

fn render_operand(operand: &Operand, table: &SymbolTable) -> String {
    match operand {
        Operand::Value(Literal::Int(v)) => v.to_string(),
        Operand::Value(Literal::Float(v)) => format!("{:?}", v),
        Operand::Value(Literal::Bool(v)) => v.to_string(),
        Operand::Value(Literal::Str(s)) => format!("{:?}", s),
        Operand::Value(Literal::Nil) => "nil".to_string(),
        Operand::Object(id) => table.object(*id).name.clone(),
        Operand::Offset { base, shift } => {
            let shift = match shift {
                Shift::Const(k) => k.to_string(),
                Shift::Object(id) => table.object(*id).name.clone(),
            };
            format!("{}[{}]", table.object(*base).name, shift)
        }
        Operand::Function(id) => table.function(*id).label(),
        Operand::Class(id) => table.class(*id).name.clone(),
    }
}

fn render_instruction(out: &mut String, instruction: &Instruction, table: &SymbolTable) -> std::fmt::Result {
    let Instruction::Single { op, arg1, arg2, result } = instruction else {
        if let Instruction::Conditional { arg1, op, arg2, label } = instruction {
            let relation = if *op == Op::Ne { "!=" } else { "==" };
            writeln!(
                out,
                "    IF {} {} {} GOTO {}",
                render_operand(arg1, table),
                relation,
                render_operand(arg2, table),
                label
            )?;
        }
        return Ok(());
    };

    let a = arg1.as_ref().map(|o| render_operand(o, table));
    let b = arg2.as_ref().map(|o| render_operand(o, table));
    let r = result.as_ref().map(|o| render_operand(o, table));

    match (op, a, b, r) {
        (Op::Label, Some(_), _, _) => writeln!(out, "{}:", instruction.target().unwrap_or("?")),
        (Op::Goto, Some(_), _, _) => writeln!(out, "    GOTO {}", instruction.target().unwrap_or("?")),
        (Op::Store, Some(a), _, Some(r)) => writeln!(out, "    {} = {}", r, a),
        (Op::Malloc, Some(a), Some(b), Some(r)) => writeln!(out, "    {} = MALLOC {} {}", r, a, b),
        (op, Some(a), Some(b), Some(r)) => writeln!(out, "    {} = {} {} {}", r, a, op.name(), b),
        (op, Some(a), None, Some(r)) => writeln!(out, "    {} = {} {}", r, op.name(), a),
        (op, None, None, Some(r)) => writeln!(out, "    {} = {}", r, op.name()),
        (op, Some(a), Some(b), None) => writeln!(out, "    {} {} {}", op.name(), a, b),
        (op, Some(a), None, None) => writeln!(out, "    {} {}", op.name(), a),
        (op, _, _, _) => writeln!(out, "    {}", op.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_clones_prefix() {
        let mut list = InstrList::new();
        list.push(Instruction::label("L0"));
        list.push(Instruction::goto("L1"));
        list.push(Instruction::new(Op::RegisterFree, None, None, None));

        let prefix = list.copy(2);
        assert_eq!(prefix.len(), 2);
        assert_eq!(prefix.iter().nth(1).and_then(|i| i.target()), Some("L1"));
        // cutting past the end copies everything
        assert_eq!(list.copy(10), list);
    }

    #[test]
    fn test_empty_instructions_are_dropped() {
        let mut list = InstrList::single(Instruction::Empty);
        assert!(list.is_empty());
        list.push(Instruction::goto("L3"));
        let mut other = InstrList::new();
        other.concat(list);
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_render() {
        let mut table = SymbolTable::new();
        let x = table.declare_object("x", Type::Int).unwrap();
        let t = table.declare_temporary(Type::Int);

        let mut list = InstrList::new();
        list.push(Instruction::store(Operand::int(3), Operand::Object(x)));
        list.push(Instruction::binary(Op::Plus, Operand::Object(x), Operand::int(1), t));
        list.push(Instruction::if_false(Operand::Object(t), "L0"));
        list.push(Instruction::new(Op::Print, Some(Operand::Object(t)), None, None));
        list.push(Instruction::label("L0"));

        let text = list.render(&table).unwrap();
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        assert_eq!(
            lines,
            vec!["x = 3", "t0 = x PLUS 1", "IF t0 == false GOTO L0", "PRINT t0", "L0:"]
        );
    }
}
