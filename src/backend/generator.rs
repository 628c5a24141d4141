use std::fmt::Write;

use crate::analysis::symbols::{FunctionId, ObjectId, SymbolTable, WORD};
use crate::analysis::types::Type;
use crate::backend::descriptors::{Bank, Descriptors, Register};
use crate::backend::memory::{argument_displacement, Address, Layout, Repr, Tag};
use crate::backend::templates;
use crate::backend::CodegenError;
use crate::ir::{InstrList, Instruction, Literal, Op, Operand, Shift};

type Result<T> = std::result::Result<T, CodegenError>;

fn float_literal(value: f32) -> String {
    let text = value.to_string();
    if text.contains('.') || text.contains("inf") || text.contains("NaN") {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Translates IR into MIPS assembly, one instruction at a time, keeping the
/// register and address descriptors up to date.
pub struct Generator<'a> {
    table: &'a SymbolTable,
    layout: Layout,
    descriptors: Descriptors,
    out: String,
    // enclosing functions, innermost last
    functions: Vec<FunctionId>,
    // PARAM operands waiting for their CALL
    params: Vec<Operand>,
    // registers handed out while expanding the current instruction
    busy: Vec<Register>,
    next_id: usize,
}

impl<'a> Generator<'a> {
    pub fn new(table: &'a SymbolTable) -> Self {
        Self {
            table,
            layout: Layout::new(table),
            descriptors: Descriptors::new(),
            out: String::new(),
            functions: Vec::new(),
            params: Vec::new(),
            busy: Vec::new(),
            next_id: 0,
        }
    }

    pub fn generate(mut self, code: &InstrList) -> Result<String> {
        templates::program_header(&mut self.out, self.layout.dot_slot())?;
        for instruction in code.iter() {
            self.busy.clear();
            self.instruction(instruction)?;
            debug_assert!(self.descriptors.is_consistent());
        }
        templates::program_footer(&mut self.out)?;
        log::debug!("generated {} line(s) of assembly", self.out.lines().count());
        Ok(self.out)
    }

    fn id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn repr(&self, object: ObjectId) -> Repr {
        Repr::of(&self.table.object(object).storage)
    }

    fn current_level(&self) -> usize {
        self.functions
            .last()
            .map(|&f| self.table.function(f).level)
            .unwrap_or(0)
    }

    // Function code prefers the temporary banks, top-level code the saved ones
    fn banks(&self, float: bool) -> [Bank; 2] {
        match (float, self.functions.is_empty()) {
            (false, true) => [Bank::Saved, Bank::Temporary],
            (false, false) => [Bank::Temporary, Bank::Saved],
            (true, true) => [Bank::FloatSaved, Bank::FloatTemporary],
            (true, false) => [Bank::FloatTemporary, Bank::FloatSaved],
        }
    }

    /// A register nobody else in this instruction uses. When all are taken
    /// the least occupied one is spilled.
    fn get_register(&mut self, float: bool) -> Result<Register> {
        let banks = self.banks(float);
        let register = match self.descriptors.free_register(&banks, &self.busy) {
            Some(register) => register,
            None => {
                let victim = self
                    .descriptors
                    .least_occupied(&banks, &self.busy)
                    .ok_or(CodegenError::NoRegister)?;
                log::trace!("spilling {} to make room", victim);
                self.spill_register(victim)?;
                victim
            }
        };
        self.busy.push(register);
        Ok(register)
    }

    fn release(&mut self, registers: &[Register]) {
        self.busy.retain(|r| !registers.contains(r));
    }

    fn spill_register(&mut self, register: Register) -> Result<()> {
        let objects: Vec<ObjectId> = self.descriptors.contents(register).collect();
        for object in objects {
            if self.descriptors.is_dirty(object) {
                self.store_object(object, register)?;
            }
        }
        self.descriptors.evict(register);
        Ok(())
    }

    /// Stores every value that only lives in a register.
    fn flush(&mut self) -> Result<()> {
        for (object, register) in self.descriptors.dirty_objects() {
            self.store_object(object, register)?;
        }
        Ok(())
    }

    /// Memory operand of an object's slot, walking the display first when the
    /// slot belongs to an enclosing function's frame.
    fn slot(&mut self, object: ObjectId) -> Result<String> {
        match self.layout.address(self.table, object)? {
            Address::Static(offset) => Ok(format!("{}($gp)", offset)),
            Address::Frame { offset, level } if level == self.current_level() => {
                Ok(templates::local_slot(offset, "$fp"))
            }
            Address::Frame { offset, level } => {
                let id = self.id();
                templates::frame_walk(&mut self.out, level, id)?;
                Ok(templates::local_slot(offset, "$a3"))
            }
        }
    }

    // Numbers get a fresh cell on every store so that slots never alias
    fn store_object(&mut self, object: ObjectId, register: Register) -> Result<()> {
        match self.repr(object) {
            Repr::Int | Repr::Float => {
                let (tag, store) = if register.is_float() {
                    (Tag::Float, "s.s")
                } else {
                    (Tag::Int, "sw")
                };
                writeln!(self.out, "    li $a0, {}", tag as u8)?;
                writeln!(self.out, "    jal {}", crate::backend::memory::ALLOC_HELPER)?;
                writeln!(self.out, "    {} {}, 4($v0)", store, register)?;
                let slot = self.slot(object)?;
                writeln!(self.out, "    sw $v0, {}", slot)?;
            }
            Repr::Pointer | Repr::Boxed => {
                let slot = self.slot(object)?;
                writeln!(self.out, "    sw {}, {}", register, slot)?;
            }
            Repr::Void => {}
        }
        self.descriptors.spilled(object);
        Ok(())
    }

    fn load_object(&mut self, object: ObjectId, register: Register) -> Result<()> {
        match self.repr(object) {
            Repr::Int => {
                let slot = self.slot(object)?;
                writeln!(self.out, "    lw {}, {}", register, slot)?;
                writeln!(self.out, "    lw {}, 4({})", register, register)?;
            }
            Repr::Float => {
                let slot = self.slot(object)?;
                writeln!(self.out, "    lw $a1, {}", slot)?;
                writeln!(self.out, "    l.s {}, 4($a1)", register)?;
            }
            Repr::Pointer | Repr::Boxed => {
                let slot = self.slot(object)?;
                writeln!(self.out, "    lw {}, {}", register, slot)?;
            }
            Repr::Void => writeln!(self.out, "    move {}, $zero", register)?,
        }
        self.descriptors.loaded(object, register);
        Ok(())
    }

    /// Register holding the operand in its natural representation.
    fn load(&mut self, operand: &Operand) -> Result<(Register, Repr)> {
        match operand {
            Operand::Value(literal) => self.load_literal(literal),

            Operand::Object(object) => {
                let repr = self.repr(*object);
                if let Some(register) = self.descriptors.register_of(*object) {
                    self.busy.push(register);
                    return Ok((register, repr));
                }
                let register = self.get_register(repr.is_float())?;
                self.load_object(*object, register)?;
                Ok((register, repr))
            }

            Operand::Offset { base, shift } => {
                let (base, _) = self.load(&Operand::Object(*base))?;
                let index = match shift {
                    Shift::Const(_) => None,
                    Shift::Object(s) => Some(self.load_int(&Operand::Object(*s))?),
                };
                let register = self.get_register(false)?;
                match (shift, index) {
                    (Shift::Const(k), _) => writeln!(self.out, "    lw {}, {}({})", register, k, base)?,
                    (_, Some(index)) => {
                        writeln!(self.out, "    add $a1, {}, {}", base, index)?;
                        writeln!(self.out, "    lw {}, 0($a1)", register)?;
                    }
                    (_, None) => return Err(CodegenError::Malformed("offset")),
                }
                Ok((register, Repr::Boxed))
            }

            Operand::Function(_) | Operand::Class(_) => {
                let register = self.get_register(false)?;
                writeln!(self.out, "    move {}, $zero", register)?;
                Ok((register, Repr::Int))
            }
        }
    }

    fn load_literal(&mut self, literal: &Literal) -> Result<(Register, Repr)> {
        match literal {
            Literal::Float(v) => {
                let register = self.get_register(true)?;
                writeln!(self.out, "    li.s {}, {}", register, float_literal(*v))?;
                Ok((register, Repr::Float))
            }
            Literal::Str(text) => {
                let register = self.get_register(false)?;
                templates::string_literal(&mut self.out, text, register)?;
                Ok((register, Repr::Pointer))
            }
            Literal::Int(v) => self.load_immediate(*v),
            Literal::Bool(b) => self.load_immediate(*b as i32),
            Literal::Nil => self.load_immediate(0),
        }
    }

    fn load_immediate(&mut self, value: i32) -> Result<(Register, Repr)> {
        let register = self.get_register(false)?;
        writeln!(self.out, "    li {}, {}", register, value)?;
        Ok((register, Repr::Int))
    }

    /// Changes the representation of a value, into a new register if needed.
    fn convert(&mut self, register: Register, from: Repr, to: Repr) -> Result<Register> {
        let converted = match (from, to) {
            _ if from == to => register,
            (_, Repr::Void) => register,

            (Repr::Boxed, Repr::Float) => {
                let f = self.get_register(true)?;
                let id = self.id();
                templates::unbox_float(&mut self.out, register, f, id)?;
                f
            }
            (_, Repr::Float) => {
                let f = self.get_register(true)?;
                writeln!(self.out, "    mtc1 {}, {}", register, f)?;
                writeln!(self.out, "    cvt.s.w {}, {}", f, f)?;
                f
            }

            (Repr::Boxed, Repr::Int) => {
                let d = self.get_register(false)?;
                let id = self.id();
                templates::unbox_int(&mut self.out, register, d, id)?;
                d
            }
            (Repr::Float, Repr::Int) => {
                let d = self.get_register(false)?;
                writeln!(self.out, "    trunc.w.s $f0, {}", register)?;
                writeln!(self.out, "    mfc1 {}, $f0", d)?;
                d
            }
            (_, Repr::Int) => register,

            (Repr::Int, _) => {
                let d = self.get_register(false)?;
                templates::box_int(&mut self.out, register, d)?;
                d
            }
            (Repr::Float, _) => {
                let d = self.get_register(false)?;
                templates::box_float(&mut self.out, register, d)?;
                d
            }
            _ => register,
        };
        Ok(converted)
    }

    fn load_int(&mut self, operand: &Operand) -> Result<Register> {
        let (register, repr) = self.load(operand)?;
        self.convert(register, repr, Repr::Int)
    }

    fn load_float(&mut self, operand: &Operand) -> Result<Register> {
        let (register, repr) = self.load(operand)?;
        self.convert(register, repr, Repr::Float)
    }

    /// Pointer to a tagged cell (or string, instance, array) for the operand.
    fn pointer_of(&mut self, operand: &Operand) -> Result<Register> {
        let (register, repr) = self.load(operand)?;
        self.convert(register, repr, Repr::Boxed)
    }

    /// Pointer to a string holding the operand's printed form.
    fn string_of(&mut self, operand: &Operand) -> Result<Register> {
        let (register, repr) = self.load(operand)?;
        if repr == Repr::Pointer {
            return Ok(register);
        }

        let id = self.id();
        let dot = self.layout.dot_slot();
        let dst = self.get_register(false)?;
        let scratch = [
            self.get_register(false)?,
            self.get_register(false)?,
            self.get_register(false)?,
        ];
        let [n, w, s] = scratch;
        match repr {
            Repr::Float => {
                templates::float_to_string(&mut self.out, register, dst, n, w, s, dot, id)?;
            }
            Repr::Boxed => {
                let f = self.get_register(true)?;
                templates::any_to_string(&mut self.out, register, dst, n, w, s, f, dot, id)?;
                self.release(&[f]);
            }
            _ => templates::int_to_string(&mut self.out, register, dst, n, w, s, id)?,
        }
        self.release(&scratch);
        Ok(dst)
    }

    /// Binds a freshly computed value to `target`, converting it to the
    /// target's representation. A register still describing other objects
    /// is copied rather than taken over.
    fn write_result(&mut self, target: ObjectId, register: Register, repr: Repr) -> Result<()> {
        let want = self.repr(target);
        if want == Repr::Void {
            return Ok(());
        }
        let register = self.convert(register, repr, want)?;
        let shared = self.descriptors.contents(register).any(|o| o != target);
        if !shared {
            self.descriptors.bind(target, register);
            return Ok(());
        }

        self.descriptors.detach(target);
        let copy = self.get_register(want.is_float())?;
        let mv = if want.is_float() { "mov.s" } else { "move" };
        writeln!(self.out, "    {} {}, {}", mv, copy, register)?;
        self.descriptors.bind(target, copy);
        Ok(())
    }

    fn result_object(result: &Option<Operand>, op: &'static str) -> Result<ObjectId> {
        match result {
            Some(Operand::Object(id)) => Ok(*id),
            _ => Err(CodegenError::Malformed(op)),
        }
    }

    fn label_name(operand: &Option<Operand>, op: &'static str) -> Result<String> {
        match operand {
            Some(Operand::Value(Literal::Str(name))) => Ok(name.clone()),
            _ => Err(CodegenError::Malformed(op)),
        }
    }

    fn function_operand(operand: &Option<Operand>, op: &'static str) -> Result<FunctionId> {
        match operand {
            Some(Operand::Function(id)) => Ok(*id),
            _ => Err(CodegenError::Malformed(op)),
        }
    }

    fn instruction(&mut self, instruction: &Instruction) -> Result<()> {
        let (op, arg1, arg2, result) = match instruction {
            Instruction::Empty => return Ok(()),
            Instruction::Conditional { arg1, op, arg2, label } => {
                return self.conditional(arg1, *op, arg2, label);
            }
            Instruction::Single { op, arg1, arg2, result } => (*op, arg1, arg2, result),
        };

        match op {
            Op::Store => {
                let value = arg1.as_ref().ok_or(CodegenError::Malformed("STORE"))?;
                match result {
                    Some(Operand::Object(target)) => self.store(value, *target),
                    Some(Operand::Offset { base, shift }) => self.store_offset(value, *base, shift),
                    _ => Err(CodegenError::Malformed("STORE")),
                }
            }

            Op::Plus | Op::Minus | Op::Mult | Op::Mod | Op::Div => {
                let (a, b) = match (arg1, arg2) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(CodegenError::Malformed("arithmetic")),
                };
                let target = Self::result_object(result, "arithmetic")?;
                self.arithmetic(op, a, b, target)
            }

            Op::Lt | Op::Le | Op::Eq | Op::Ne => {
                let (a, b) = match (arg1, arg2) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(CodegenError::Malformed("comparison")),
                };
                let target = Self::result_object(result, "comparison")?;
                self.compare(op, a, b, target)
            }

            Op::Xor => {
                let (a, b) = match (arg1, arg2) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(CodegenError::Malformed("XOR")),
                };
                let target = Self::result_object(result, "XOR")?;
                let ra = self.load_int(a)?;
                let rb = self.load_int(b)?;
                let dst = self.get_register(false)?;
                templates::int_op(&mut self.out, Op::Xor, ra, rb, dst)?;
                self.write_result(target, dst, Repr::Int)
            }

            Op::Concat => {
                let (a, b) = match (arg1, arg2) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(CodegenError::Malformed("CONCAT")),
                };
                let target = Self::result_object(result, "CONCAT")?;
                let sa = self.string_of(a)?;
                let sb = self.string_of(b)?;
                let cursor = self.get_register(false)?;
                let len = self.get_register(false)?;
                let dst = self.get_register(false)?;
                let id = self.id();
                templates::concat(&mut self.out, sa, sb, dst, cursor, len, id)?;
                self.write_result(target, dst, Repr::Pointer)
            }

            Op::Label => {
                let name = Self::label_name(arg1, "LABEL")?;
                self.flush()?;
                writeln!(self.out, "{}:", name)?;
                self.descriptors.clear();
                Ok(())
            }

            Op::Goto => {
                let name = Self::label_name(arg1, "GOTO")?;
                self.flush()?;
                writeln!(self.out, "    j {}", name)?;
                Ok(())
            }

            Op::Function => {
                let id = Self::function_operand(arg1, "FUNCTION")?;
                self.flush()?;
                self.descriptors.clear();
                let function = self.table.function(id);
                templates::function_prologue(
                    &mut self.out,
                    &function.label(),
                    &format!("skip_fn_{}", id.0),
                    function.level,
                    self.layout.frame_size(id),
                )?;
                self.functions.push(id);
                Ok(())
            }

            Op::EndFunction => {
                let id = Self::function_operand(arg1, "END_FUNCTION")?;
                self.flush()?;
                templates::function_epilogue(
                    &mut self.out,
                    &format!("return_fn_{}", id.0),
                    &format!("skip_fn_{}", id.0),
                )?;
                self.functions.pop();
                self.descriptors.clear();
                Ok(())
            }

            Op::GetArg => {
                let index = match arg1 {
                    Some(Operand::Value(Literal::Int(i))) => *i as usize,
                    _ => return Err(CodegenError::Malformed("GET_ARG")),
                };
                let target = Self::result_object(result, "GET_ARG")?;
                let register = self.get_register(false)?;
                writeln!(
                    self.out,
                    "    lw {}, {}($fp)",
                    register,
                    argument_displacement(index)
                )?;
                self.write_result(target, register, Repr::Boxed)
            }

            Op::Param => {
                let value = arg1.clone().ok_or(CodegenError::Malformed("PARAM"))?;
                self.params.push(value);
                Ok(())
            }

            Op::Call => {
                let id = Self::function_operand(arg1, "CALL")?;
                self.call(id)
            }

            Op::ReturnVal => {
                let target = Self::result_object(result, "RETURN_VAL")?;
                let slot = self.slot(target)?;
                writeln!(self.out, "    sw $v1, {}", slot)?;
                self.descriptors.forget(target);
                Ok(())
            }

            Op::Return => {
                let function = *self
                    .functions
                    .last()
                    .ok_or(CodegenError::OutsideFunction("RETURN"))?;
                let value = arg1.as_ref().ok_or(CodegenError::Malformed("RETURN"))?;
                let pointer = self.pointer_of(value)?;
                writeln!(self.out, "    move $v1, {}", pointer)?;
                self.flush()?;
                writeln!(self.out, "    j return_fn_{}", function.0)?;
                Ok(())
            }

            Op::Malloc => {
                let size = match arg1 {
                    Some(Operand::Value(Literal::Int(size))) => *size,
                    _ => return Err(CodegenError::Malformed("MALLOC")),
                };
                let target = Self::result_object(result, "MALLOC")?;
                writeln!(self.out, "    li $a0, {}", size)?;
                writeln!(self.out, "    li $v0, 9")?;
                writeln!(self.out, "    syscall")?;
                let register = self.get_register(false)?;
                writeln!(self.out, "    move {}, $v0", register)?;
                if let Some(Operand::Class(_)) = arg2 {
                    writeln!(self.out, "    li $a1, {}", Tag::Instance as u8)?;
                    writeln!(self.out, "    sb $a1, 0({})", register)?;
                }
                self.write_result(target, register, Repr::Pointer)
            }

            Op::Print => {
                let value = arg1.as_ref().ok_or(CodegenError::Malformed("PRINT"))?;
                self.print(value)
            }

            Op::RegisterFree => {
                self.flush()?;
                self.descriptors.clear();
                Ok(())
            }
        }
    }

    fn store(&mut self, value: &Operand, target: ObjectId) -> Result<()> {
        if let Operand::Function(_) | Operand::Class(_) = value {
            return Ok(());
        }
        if let Operand::Object(source) = value {
            if *source == target {
                return Ok(());
            }
            // same representation: both names share the register
            if self.repr(*source) == self.repr(target) {
                let (register, _) = self.load(value)?;
                self.descriptors.bind(target, register);
                return Ok(());
            }
        }
        let (register, repr) = self.load(value)?;
        self.write_result(target, register, repr)
    }

    fn store_offset(&mut self, value: &Operand, base: ObjectId, shift: &Shift) -> Result<()> {
        let pointer = self.pointer_of(value)?;
        let (base, _) = self.load(&Operand::Object(base))?;
        match shift {
            Shift::Const(k) => writeln!(self.out, "    sw {}, {}({})", pointer, k, base)?,
            Shift::Object(s) => {
                let s = self.load_int(&Operand::Object(*s))?;
                writeln!(self.out, "    add $a1, {}, {}", base, s)?;
                writeln!(self.out, "    sw {}, 0($a1)", pointer)?;
            }
        }
        Ok(())
    }

    fn arithmetic(&mut self, op: Op, a: &Operand, b: &Operand, target: ObjectId) -> Result<()> {
        let ra = Repr::of(&a.runtime_type(self.table));
        let rb = Repr::of(&b.runtime_type(self.table));

        if op == Op::Div {
            let fa = self.load_float(a)?;
            let fb = self.load_float(b)?;
            let dst = self.get_register(true)?;
            templates::float_op(&mut self.out, op, fa, fb, dst)?;
            return self.write_result(target, dst, Repr::Float);
        }

        if ra == Repr::Boxed || rb == Repr::Boxed {
            let pa = self.pointer_of(a)?;
            let pb = self.pointer_of(b)?;
            let ta = self.get_register(false)?;
            let tb = self.get_register(false)?;
            let dst = self.get_register(false)?;
            let id = self.id();
            templates::any_arithmetic(&mut self.out, op, pa, pb, ta, tb, dst, id)?;
            return self.write_result(target, dst, Repr::Boxed);
        }

        if ra == Repr::Float || rb == Repr::Float {
            let fa = self.load_float(a)?;
            let fb = self.load_float(b)?;
            let dst = self.get_register(true)?;
            templates::float_op(&mut self.out, op, fa, fb, dst)?;
            return self.write_result(target, dst, Repr::Float);
        }

        let ia = self.load_int(a)?;
        let ib = self.load_int(b)?;
        let dst = self.get_register(false)?;
        templates::int_op(&mut self.out, op, ia, ib, dst)?;
        self.write_result(target, dst, Repr::Int)
    }

    fn compare(&mut self, op: Op, a: &Operand, b: &Operand, target: ObjectId) -> Result<()> {
        let ta = a.runtime_type(self.table);
        let tb = b.runtime_type(self.table);
        let (ra, rb) = (Repr::of(&ta), Repr::of(&tb));

        let dst = if ra == Repr::Boxed || rb == Repr::Boxed {
            let pa = self.pointer_of(a)?;
            let pb = self.pointer_of(b)?;
            let sa = self.get_register(false)?;
            let sb = self.get_register(false)?;
            let dst = self.get_register(false)?;
            let id = self.id();
            templates::any_compare(&mut self.out, op, pa, pb, sa, sb, dst, id)?;
            dst
        } else if ta == Type::Str && tb == Type::Str {
            let (pa, _) = self.load(a)?;
            let (pb, _) = self.load(b)?;
            let ca = self.get_register(false)?;
            let cb = self.get_register(false)?;
            let dst = self.get_register(false)?;
            let id = self.id();
            templates::string_compare(&mut self.out, op, pa, pb, ca, cb, dst, id)?;
            dst
        } else if ra == Repr::Float || rb == Repr::Float {
            let fa = self.load_float(a)?;
            let fb = self.load_float(b)?;
            let dst = self.get_register(false)?;
            let id = self.id();
            templates::float_compare(&mut self.out, op, fa, fb, dst, id)?;
            dst
        } else {
            let ia = self.load_int(a)?;
            let ib = self.load_int(b)?;
            let dst = self.get_register(false)?;
            templates::int_op(&mut self.out, op, ia, ib, dst)?;
            dst
        };
        self.write_result(target, dst, Repr::Int)
    }

    fn conditional(&mut self, a: &Operand, op: Op, b: &Operand, label: &str) -> Result<()> {
        let ra = self.load_int(a)?;
        let branch = match b {
            Operand::Value(Literal::Bool(expected)) => {
                let on_zero = (op == Op::Eq) != *expected;
                self.flush()?;
                let mnemonic = if on_zero { "beqz" } else { "bnez" };
                format!("{} {}, {}", mnemonic, ra, label)
            }
            other => {
                let rb = self.load_int(other)?;
                self.flush()?;
                let mnemonic = if op == Op::Eq { "beq" } else { "bne" };
                format!("{} {}, {}, {}", mnemonic, ra, rb, label)
            }
        };
        writeln!(self.out, "    {}", branch)?;
        Ok(())
    }

    fn call(&mut self, function: FunctionId) -> Result<()> {
        self.flush()?;
        let params = std::mem::take(&mut self.params);

        // right to left, so argument 0 ends up nearest the callee's frame
        for param in params.iter().rev() {
            match param {
                Operand::Object(object) => {
                    let slot = self.slot(*object)?;
                    writeln!(self.out, "    lw $a1, {}", slot)?;
                    templates::push(&mut self.out, "$a1")?;
                }
                other => {
                    let pointer = self.pointer_of(other)?;
                    templates::push(&mut self.out, pointer)?;
                    self.busy.clear();
                }
            }
        }

        writeln!(self.out, "    jal {}", self.table.function(function).label())?;
        if !params.is_empty() {
            writeln!(self.out, "    addi $sp, $sp, {}", params.len() * WORD)?;
        }
        self.descriptors.clear();
        Ok(())
    }

    fn print(&mut self, value: &Operand) -> Result<()> {
        let ty = value.runtime_type(self.table);
        let (register, repr) = self.load(value)?;
        match repr {
            Repr::Float => templates::print_float(&mut self.out, register)?,
            Repr::Pointer if ty == Type::Str => {
                let cursor = self.get_register(false)?;
                let id = self.id();
                templates::print_string(&mut self.out, register, cursor, id)?;
            }
            Repr::Boxed => {
                let cursor = self.get_register(false)?;
                let id = self.id();
                templates::print_any(&mut self.out, register, cursor, id)?;
            }
            _ => templates::print_int(&mut self.out, register)?,
        }
        templates::newline(&mut self.out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::symbols::ScopeKind;

    fn table_with(objects: &[(&str, Type)]) -> (SymbolTable, Vec<ObjectId>) {
        let mut table = SymbolTable::new();
        let ids = objects
            .iter()
            .map(|(name, ty)| {
                let id = table.declare_object(name, ty.clone()).unwrap();
                table.assign_offset(id);
                id
            })
            .collect();
        (table, ids)
    }

    fn run(table: &SymbolTable, code: &[Instruction]) -> (String, Descriptors) {
        let mut generator = Generator::new(table);
        for instruction in code {
            generator.busy.clear();
            generator.instruction(instruction).unwrap();
            assert!(generator.descriptors.is_consistent());
        }
        (generator.out, generator.descriptors)
    }

    #[test]
    fn test_result_lands_in_a_register() {
        let (table, ids) = table_with(&[("x", Type::Int), ("y", Type::Int)]);
        let (x, y) = (ids[0], ids[1]);
        let (out, d) = run(
            &table,
            &[
                Instruction::store(Operand::int(2), Operand::Object(x)),
                Instruction::binary(Op::Plus, Operand::Object(x), Operand::int(3), y),
            ],
        );
        assert!(d.register_of(x).is_some());
        assert!(d.register_of(y).is_some());
        assert!(d.is_dirty(y));
        assert!(out.contains("add $s"));
        // top-level code prefers the saved bank
        assert_eq!(d.register_of(x).map(|r| r.bank), Some(Bank::Saved));
    }

    #[test]
    fn test_copy_shares_register_until_overwritten() {
        let (table, ids) = table_with(&[("a", Type::Int), ("b", Type::Int)]);
        let (a, b) = (ids[0], ids[1]);
        let (_, d) = run(
            &table,
            &[
                Instruction::store(Operand::int(1), Operand::Object(a)),
                Instruction::store(Operand::Object(a), Operand::Object(b)),
            ],
        );
        assert_eq!(d.register_of(a), d.register_of(b));

        let (_, d) = run(
            &table,
            &[
                Instruction::store(Operand::int(1), Operand::Object(a)),
                Instruction::store(Operand::Object(a), Operand::Object(b)),
                Instruction::binary(Op::Plus, Operand::Object(a), Operand::int(1), a),
            ],
        );
        assert_ne!(d.register_of(a), d.register_of(b));
    }

    #[test]
    fn test_register_free_spills_numbers_into_fresh_cells() {
        let (table, ids) = table_with(&[("x", Type::Int)]);
        let (out, d) = run(
            &table,
            &[
                Instruction::store(Operand::int(7), Operand::Object(ids[0])),
                Instruction::new(Op::RegisterFree, None, None, None),
            ],
        );
        assert!(out.contains("jal auto_number_memory_alloc"));
        assert!(out.contains("sw $v0, 0($gp)"));
        assert_eq!(d.register_of(ids[0]), None);
        assert!(d.dirty_objects().is_empty());
    }

    #[test]
    fn test_labels_flush_and_forget() {
        let (table, ids) = table_with(&[("s", Type::Str)]);
        let (out, d) = run(
            &table,
            &[
                Instruction::store(Operand::Value(Literal::Str("hi".into())), Operand::Object(ids[0])),
                Instruction::label("L0"),
            ],
        );
        let store = out.find("sw $s0, 0($gp)").expect("string spilled");
        let label = out.find("L0:").expect("label emitted");
        assert!(store < label);
        assert_eq!(d.register_of(ids[0]), None);
    }

    #[test]
    fn test_division_is_float() {
        let (mut table, _) = table_with(&[]);
        let t = table.declare_temporary(Type::Float);
        table.assign_offset(t);
        let (out, d) = run(
            &table,
            &[Instruction::binary(Op::Div, Operand::int(7), Operand::int(2), t)],
        );
        assert!(out.contains("cvt.s.w"));
        assert!(out.contains("div.s"));
        assert!(d.register_of(t).map_or(false, |r| r.is_float()));
    }

    #[test]
    fn test_any_arithmetic_dispatches_on_tags() {
        let (table, ids) = table_with(&[("a", Type::Any), ("r", Type::Any)]);
        let (out, _) = run(
            &table,
            &[Instruction::binary(Op::Plus, Operand::Object(ids[0]), Operand::int(1), ids[1])],
        );
        assert!(out.contains("any_float_"));
        assert!(out.contains("add.s $f0, $f0, $f1"));
    }

    #[test]
    fn test_non_local_access_walks_frames() {
        let mut table = SymbolTable::new();
        let outer = table.declare_function("outer", &[], None).unwrap();
        let outer_body = table.push_scope(ScopeKind::Function, Some(crate::analysis::symbols::ScopeRef::Function(outer)));
        table.function_mut(outer).body = Some(outer_body);
        let x = table.declare_object("x", Type::Int).unwrap();
        table.assign_offset(x);

        let inner = table.declare_function("inner", &[], None).unwrap();
        let inner_body = table.push_scope(ScopeKind::Function, Some(crate::analysis::symbols::ScopeRef::Function(inner)));
        table.function_mut(inner).body = Some(inner_body);
        table.pop_scope();
        table.pop_scope();

        let code = [
            Instruction::new(Op::Function, Some(Operand::Function(outer)), None, None),
            Instruction::new(Op::Function, Some(Operand::Function(inner)), None, None),
            Instruction::new(Op::Print, Some(Operand::Object(x)), None, None),
        ];
        let (out, _) = run(&table, &code);
        assert!(out.contains("addi $a2, $a2, -1"));
        assert!(out.contains("lw $t0, -4($a3)"));
    }

    #[test]
    fn test_call_pushes_arguments_right_to_left() {
        let mut table = SymbolTable::new();
        let f = table.declare_function("f", &["a".into(), "b".into()], None).unwrap();
        let body = table.push_scope(ScopeKind::Function, Some(crate::analysis::symbols::ScopeRef::Function(f)));
        table.function_mut(f).body = Some(body);
        table.pop_scope();
        let x = table.declare_object("x", Type::Str).unwrap();
        table.assign_offset(x);

        let code = [
            Instruction::new(Op::Param, Some(Operand::int(1)), None, None),
            Instruction::new(Op::Param, Some(Operand::Object(x)), None, None),
            Instruction::new(Op::Call, Some(Operand::Function(f)), Some(Operand::int(2)), None),
        ];
        let (out, d) = run(&table, &code);
        let x_push = out.find("lw $a1, 0($gp)").expect("x pushed from its slot");
        let boxed = out.find("jal auto_number_memory_alloc").expect("literal boxed");
        assert!(x_push < boxed);
        assert!(out.contains("jal fn_0_f"));
        assert!(out.contains("addi $sp, $sp, 8"));
        assert!(d.dirty_objects().is_empty());
    }
}
