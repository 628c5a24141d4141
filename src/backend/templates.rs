//! Fixed MIPS instruction sequences. Every template receives the registers
//! it may use; `$a0`, `$a1` and `$v0` are clobbered freely, `$f0`-`$f2` are
//! float scratch.

use std::fmt::{self, Display, Write};

use crate::backend::memory::{local_displacement, Tag, ALLOC_HELPER, CELL_SIZE, STATIC_BASE};
use crate::ir::Op;

type Out<'a> = &'a mut String;

pub fn program_header(out: Out, dot_slot: usize) -> fmt::Result {
    writeln!(out, ".text")?;
    writeln!(out, ".globl main")?;
    writeln!(out, "main:")?;
    writeln!(out, "    li $gp, {:#x}", STATIC_BASE)?;
    // cached "." string for float printing
    writeln!(out, "    li $a0, 3")?;
    writeln!(out, "    li $v0, 9")?;
    writeln!(out, "    syscall")?;
    writeln!(out, "    li $a1, {}", Tag::Str as u8)?;
    writeln!(out, "    sb $a1, 0($v0)")?;
    writeln!(out, "    li $a1, 46")?;
    writeln!(out, "    sb $a1, 1($v0)")?;
    writeln!(out, "    sb $zero, 2($v0)")?;
    writeln!(out, "    sw $v0, {}($gp)", dot_slot)
}

pub fn program_footer(out: Out) -> fmt::Result {
    writeln!(out, "    li $v0, 10")?;
    writeln!(out, "    syscall")?;
    alloc_helper(out)
}

/// `$a0` = tag in, `$v0` = fresh cell out. Only `$a0` and `$v0` change.
pub fn alloc_helper(out: Out) -> fmt::Result {
    writeln!(out, "{}:", ALLOC_HELPER)?;
    writeln!(out, "    addi $sp, $sp, -4")?;
    writeln!(out, "    sw $a0, 0($sp)")?;
    writeln!(out, "    li $a0, {}", CELL_SIZE)?;
    writeln!(out, "    li $v0, 9")?;
    writeln!(out, "    syscall")?;
    writeln!(out, "    lw $a0, 0($sp)")?;
    writeln!(out, "    addi $sp, $sp, 4")?;
    writeln!(out, "    sb $a0, 0($v0)")?;
    writeln!(out, "    jr $ra")
}

pub fn function_prologue(out: Out, label: &str, skip: &str, level: usize, frame_size: usize) -> fmt::Result {
    writeln!(out, "    j {}", skip)?;
    writeln!(out, "{}:", label)?;
    writeln!(out, "    addi $sp, $sp, -4")?;
    writeln!(out, "    sw $ra, 0($sp)")?;
    writeln!(out, "    li $a1, {}", level)?;
    writeln!(out, "    addi $sp, $sp, -4")?;
    writeln!(out, "    sw $a1, 0($sp)")?;
    writeln!(out, "    addi $sp, $sp, -4")?;
    writeln!(out, "    sw $fp, 0($sp)")?;
    writeln!(out, "    move $fp, $sp")?;
    if frame_size > 0 {
        writeln!(out, "    addi $sp, $sp, -{}", frame_size)?;
    }
    Ok(())
}

pub fn function_epilogue(out: Out, ret: &str, skip: &str) -> fmt::Result {
    writeln!(out, "{}:", ret)?;
    writeln!(out, "    move $sp, $fp")?;
    writeln!(out, "    lw $fp, 0($sp)")?;
    writeln!(out, "    lw $ra, 8($sp)")?;
    writeln!(out, "    addi $sp, $sp, 12")?;
    writeln!(out, "    jr $ra")?;
    writeln!(out, "{}:", skip)
}

/// Leaves in `$a3` the frame pointer of the nearest active frame at `level`.
pub fn frame_walk(out: Out, level: usize, id: usize) -> fmt::Result {
    writeln!(out, "    move $a3, $fp")?;
    writeln!(out, "walk_{}:", id)?;
    writeln!(out, "    lw $a2, 4($a3)")?;
    writeln!(out, "    addi $a2, $a2, -{}", level)?;
    writeln!(out, "    beqz $a2, walk_done_{}", id)?;
    writeln!(out, "    lw $a3, 0($a3)")?;
    writeln!(out, "    j walk_{}", id)?;
    writeln!(out, "walk_done_{}:", id)
}

pub fn local_slot(offset: usize, base: &str) -> String {
    format!("{}({})", local_displacement(offset), base)
}

pub fn push(out: Out, reg: impl Display) -> fmt::Result {
    writeln!(out, "    addi $sp, $sp, -4")?;
    writeln!(out, "    sw {}, 0($sp)", reg)
}

/// Fresh integer cell holding `src`, pointer left in `dst`.
pub fn box_int(out: Out, src: impl Display, dst: impl Display) -> fmt::Result {
    writeln!(out, "    li $a0, {}", Tag::Int as u8)?;
    writeln!(out, "    jal {}", ALLOC_HELPER)?;
    writeln!(out, "    sw {}, 4($v0)", src)?;
    writeln!(out, "    move {}, $v0", dst)
}

pub fn box_float(out: Out, src: impl Display, dst: impl Display) -> fmt::Result {
    writeln!(out, "    li $a0, {}", Tag::Float as u8)?;
    writeln!(out, "    jal {}", ALLOC_HELPER)?;
    writeln!(out, "    s.s {}, 4($v0)", src)?;
    writeln!(out, "    move {}, $v0", dst)
}

/// Builds a tagged, NUL-terminated string on the heap.
pub fn string_literal(out: Out, text: &str, dst: impl Display) -> fmt::Result {
    let bytes = text.as_bytes();
    writeln!(out, "    li $a0, {}", bytes.len() + 2)?;
    writeln!(out, "    li $v0, 9")?;
    writeln!(out, "    syscall")?;
    writeln!(out, "    move {}, $v0", dst)?;
    writeln!(out, "    li $a1, {}", Tag::Str as u8)?;
    writeln!(out, "    sb $a1, 0({})", dst)?;
    for (i, byte) in bytes.iter().enumerate() {
        writeln!(out, "    li $a1, {}", byte)?;
        writeln!(out, "    sb $a1, {}({})", i + 1, dst)?;
    }
    writeln!(out, "    sb $zero, {}({})", bytes.len() + 1, dst)
}

/// Integer payload of a boxed value, truncating a float payload.
pub fn unbox_int(out: Out, ptr: impl Display, dst: impl Display, id: usize) -> fmt::Result {
    writeln!(out, "    lbu $a1, 0({})", ptr)?;
    writeln!(out, "    addi $a1, $a1, -{}", Tag::Float as u8)?;
    writeln!(out, "    bnez $a1, unbox_int_{}", id)?;
    writeln!(out, "    l.s $f0, 4({})", ptr)?;
    writeln!(out, "    cvt.w.s $f0, $f0")?;
    writeln!(out, "    mfc1 {}, $f0", dst)?;
    writeln!(out, "    j unbox_done_{}", id)?;
    writeln!(out, "unbox_int_{}:", id)?;
    writeln!(out, "    lw {}, 4({})", dst, ptr)?;
    writeln!(out, "unbox_done_{}:", id)
}

/// Float payload of a boxed value, converting an integer payload.
pub fn unbox_float(out: Out, ptr: impl Display, dst: impl Display, id: usize) -> fmt::Result {
    writeln!(out, "    l.s {}, 4({})", dst, ptr)?;
    writeln!(out, "    lbu $a1, 0({})", ptr)?;
    writeln!(out, "    addi $a1, $a1, -{}", Tag::Float as u8)?;
    writeln!(out, "    beqz $a1, unbox_done_{}", id)?;
    writeln!(out, "    cvt.s.w {}, {}", dst, dst)?;
    writeln!(out, "unbox_done_{}:", id)
}

fn int_instruction(op: Op) -> &'static str {
    match op {
        Op::Plus => "add",
        Op::Minus => "sub",
        Op::Mult => "mul",
        Op::Mod => "remu",
        Op::Lt => "slt",
        Op::Le => "sle",
        Op::Eq => "seq",
        Op::Ne => "sne",
        Op::Xor => "xor",
        _ => "add",
    }
}

fn float_instruction(op: Op) -> &'static str {
    match op {
        Op::Plus => "add.s",
        Op::Minus => "sub.s",
        Op::Mult => "mul.s",
        Op::Div => "div.s",
        _ => "add.s",
    }
}

/// Integer arithmetic, comparison or xor.
pub fn int_op(out: Out, op: Op, a: impl Display, b: impl Display, dst: impl Display) -> fmt::Result {
    writeln!(out, "    {} {}, {}, {}", int_instruction(op), dst, a, b)
}

/// Float arithmetic; modulo truncates the quotient toward zero.
pub fn float_op(out: Out, op: Op, a: impl Display, b: impl Display, dst: impl Display) -> fmt::Result {
    if op != Op::Mod {
        return writeln!(out, "    {} {}, {}, {}", float_instruction(op), dst, a, b);
    }
    writeln!(out, "    div.s $f2, {}, {}", a, b)?;
    writeln!(out, "    trunc.w.s $f2, $f2")?;
    writeln!(out, "    cvt.s.w $f2, $f2")?;
    writeln!(out, "    mul.s $f2, $f2, {}", b)?;
    writeln!(out, "    sub.s {}, {}, $f2", dst, a)
}

/// Float comparison materialised as 0/1 in `dst`.
pub fn float_compare(out: Out, op: Op, a: impl Display, b: impl Display, dst: impl Display, id: usize) -> fmt::Result {
    let (predicate, branch) = match op {
        Op::Lt => ("c.lt.s", "bc1t"),
        Op::Le => ("c.le.s", "bc1t"),
        Op::Ne => ("c.eq.s", "bc1f"),
        _ => ("c.eq.s", "bc1t"),
    };
    writeln!(out, "    {} {}, {}", predicate, a, b)?;
    writeln!(out, "    li {}, 1", dst)?;
    writeln!(out, "    {} fcmp_{}", branch, id)?;
    writeln!(out, "    li {}, 0", dst)?;
    writeln!(out, "fcmp_{}:", id)
}

/// Byte-wise comparison of two strings. The signed difference of the first
/// mismatching bytes is compared against zero.
#[allow(clippy::too_many_arguments)]
pub fn string_compare(
    out: Out,
    op: Op,
    a: impl Display,
    b: impl Display,
    ca: impl Display,
    cb: impl Display,
    dst: impl Display,
    id: usize,
) -> fmt::Result {
    writeln!(out, "    addi {}, {}, 1", ca, a)?;
    writeln!(out, "    addi {}, {}, 1", cb, b)?;
    writeln!(out, "scmp_{}:", id)?;
    writeln!(out, "    lbu {}, 0({})", dst, ca)?;
    writeln!(out, "    lbu $a1, 0({})", cb)?;
    writeln!(out, "    bne {}, $a1, scmp_diff_{}", dst, id)?;
    writeln!(out, "    beqz {}, scmp_same_{}", dst, id)?;
    writeln!(out, "    addi {}, {}, 1", ca, ca)?;
    writeln!(out, "    addi {}, {}, 1", cb, cb)?;
    writeln!(out, "    j scmp_{}", id)?;
    writeln!(out, "scmp_diff_{}:", id)?;
    writeln!(out, "    sub {}, {}, $a1", dst, dst)?;
    writeln!(out, "    j scmp_end_{}", id)?;
    writeln!(out, "scmp_same_{}:", id)?;
    writeln!(out, "    li {}, 0", dst)?;
    writeln!(out, "scmp_end_{}:", id)?;
    writeln!(out, "    {} {}, {}, $zero", int_instruction(op), dst, dst)
}

/// Arithmetic on two boxed operands, dispatching on their tags. The result
/// is a fresh cell: float when either side is a float, integer otherwise.
#[allow(clippy::too_many_arguments)]
pub fn any_arithmetic(
    out: Out,
    op: Op,
    a: impl Display,
    b: impl Display,
    ta: impl Display,
    tb: impl Display,
    dst: impl Display,
    id: usize,
) -> fmt::Result {
    let float = Tag::Float as u8;
    writeln!(out, "    lbu {}, 0({})", ta, a)?;
    writeln!(out, "    lbu {}, 0({})", tb, b)?;
    writeln!(out, "    li $a1, {}", float)?;
    writeln!(out, "    beq {}, $a1, any_float_{}", ta, id)?;
    writeln!(out, "    beq {}, $a1, any_float_{}", tb, id)?;
    writeln!(out, "    lw {}, 4({})", ta, a)?;
    writeln!(out, "    lw {}, 4({})", tb, b)?;
    int_op(out, op, &ta, &tb, &ta)?;
    box_int(out, &ta, &dst)?;
    writeln!(out, "    j any_end_{}", id)?;

    writeln!(out, "any_float_{}:", id)?;
    writeln!(out, "    l.s $f0, 4({})", a)?;
    writeln!(out, "    beq {}, $a1, any_fa_{}", ta, id)?;
    writeln!(out, "    cvt.s.w $f0, $f0")?;
    writeln!(out, "any_fa_{}:", id)?;
    writeln!(out, "    l.s $f1, 4({})", b)?;
    writeln!(out, "    beq {}, $a1, any_fb_{}", tb, id)?;
    writeln!(out, "    cvt.s.w $f1, $f1")?;
    writeln!(out, "any_fb_{}:", id)?;
    float_op(out, op, "$f0", "$f1", "$f0")?;
    box_float(out, "$f0", &dst)?;
    writeln!(out, "any_end_{}:", id)
}

/// Comparison of two boxed operands: strings byte-wise, instances by
/// address, numbers by value.
#[allow(clippy::too_many_arguments)]
pub fn any_compare(
    out: Out,
    op: Op,
    a: impl Display,
    b: impl Display,
    ta: impl Display,
    tb: impl Display,
    dst: impl Display,
    id: usize,
) -> fmt::Result {
    writeln!(out, "    lbu {}, 0({})", ta, a)?;
    writeln!(out, "    lbu {}, 0({})", tb, b)?;
    writeln!(out, "    li $a1, {}", Tag::Str as u8)?;
    writeln!(out, "    beq {}, $a1, acmp_str_{}", ta, id)?;
    writeln!(out, "    beq {}, $a1, acmp_str_{}", tb, id)?;
    writeln!(out, "    li $a1, {}", Tag::Instance as u8)?;
    writeln!(out, "    beq {}, $a1, acmp_ptr_{}", ta, id)?;
    writeln!(out, "    beq {}, $a1, acmp_ptr_{}", tb, id)?;
    writeln!(out, "    li $a1, {}", Tag::Float as u8)?;
    writeln!(out, "    beq {}, $a1, acmp_float_{}", ta, id)?;
    writeln!(out, "    beq {}, $a1, acmp_float_{}", tb, id)?;
    writeln!(out, "    lw {}, 4({})", ta, a)?;
    writeln!(out, "    lw {}, 4({})", tb, b)?;
    int_op(out, op, &ta, &tb, &dst)?;
    writeln!(out, "    j acmp_end_{}", id)?;

    writeln!(out, "acmp_ptr_{}:", id)?;
    int_op(out, op, &a, &b, &dst)?;
    writeln!(out, "    j acmp_end_{}", id)?;

    writeln!(out, "acmp_float_{}:", id)?;
    writeln!(out, "    l.s $f0, 4({})", a)?;
    writeln!(out, "    beq {}, $a1, acmp_fa_{}", ta, id)?;
    writeln!(out, "    cvt.s.w $f0, $f0")?;
    writeln!(out, "acmp_fa_{}:", id)?;
    writeln!(out, "    l.s $f1, 4({})", b)?;
    writeln!(out, "    beq {}, $a1, acmp_fb_{}", tb, id)?;
    writeln!(out, "    cvt.s.w $f1, $f1")?;
    writeln!(out, "acmp_fb_{}:", id)?;
    float_compare(out, op, "$f0", "$f1", &dst, id)?;
    writeln!(out, "    j acmp_end_{}", id)?;

    writeln!(out, "acmp_str_{}:", id)?;
    string_compare(out, op, &a, &b, &ta, &tb, &dst, id)?;
    writeln!(out, "acmp_end_{}:", id)
}

// Writes the decimal digits of the unsigned value in `n` at `w`, advancing
// `w` past them. `n` is consumed.
fn digits(out: Out, n: &dyn Display, w: &dyn Display, s: &dyn Display, prefix: &str, id: usize) -> fmt::Result {
    writeln!(out, "    move {}, {}", s, w)?;
    writeln!(out, "{}_digit_{}:", prefix, id)?;
    writeln!(out, "    li $a1, 10")?;
    writeln!(out, "    divu {}, $a1", n)?;
    writeln!(out, "    mfhi $a1")?;
    writeln!(out, "    mflo {}", n)?;
    writeln!(out, "    addi $a1, $a1, 48")?;
    writeln!(out, "    sb $a1, 0({})", w)?;
    writeln!(out, "    addi {}, {}, 1", w, w)?;
    writeln!(out, "    bnez {}, {}_digit_{}", n, prefix, id)?;
    // digits came out backwards
    writeln!(out, "    addi $a0, {}, -1", w)?;
    writeln!(out, "{}_reverse_{}:", prefix, id)?;
    writeln!(out, "    bge {}, $a0, {}_reverse_done_{}", s, prefix, id)?;
    writeln!(out, "    lbu $a1, 0({})", s)?;
    writeln!(out, "    lbu $v0, 0($a0)")?;
    writeln!(out, "    sb $v0, 0({})", s)?;
    writeln!(out, "    sb $a1, 0($a0)")?;
    writeln!(out, "    addi {}, {}, 1", s, s)?;
    writeln!(out, "    addi $a0, $a0, -1")?;
    writeln!(out, "    j {}_reverse_{}", prefix, id)?;
    writeln!(out, "{}_reverse_done_{}:", prefix, id)
}

/// Decimal string of the integer in `src`. `n`, `w` and `s` are scratch.
pub fn int_to_string(
    out: Out,
    src: impl Display,
    dst: impl Display,
    n: impl Display,
    w: impl Display,
    s: impl Display,
    id: usize,
) -> fmt::Result {
    writeln!(out, "    move {}, {}", n, src)?;
    writeln!(out, "    li $a0, 16")?;
    writeln!(out, "    li $v0, 9")?;
    writeln!(out, "    syscall")?;
    writeln!(out, "    move {}, $v0", dst)?;
    writeln!(out, "    li $a1, {}", Tag::Str as u8)?;
    writeln!(out, "    sb $a1, 0({})", dst)?;
    writeln!(out, "    addi {}, {}, 1", w, dst)?;
    writeln!(out, "    bgez {}, itos_pos_{}", n, id)?;
    writeln!(out, "    li $a1, 45")?;
    writeln!(out, "    sb $a1, 0({})", w)?;
    writeln!(out, "    addi {}, {}, 1", w, w)?;
    writeln!(out, "    sub {}, $zero, {}", n, n)?;
    writeln!(out, "itos_pos_{}:", id)?;
    digits(out, &n, &w, &s, "itos", id)?;
    writeln!(out, "    sb $zero, 0({})", w)
}

/// Decimal string of the float in `src`: integer part, ".", then eight
/// fractional digits.
#[allow(clippy::too_many_arguments)]
pub fn float_to_string(
    out: Out,
    src: impl Display,
    dst: impl Display,
    n: impl Display,
    w: impl Display,
    s: impl Display,
    dot_slot: usize,
    id: usize,
) -> fmt::Result {
    writeln!(out, "    li $a0, 32")?;
    writeln!(out, "    li $v0, 9")?;
    writeln!(out, "    syscall")?;
    writeln!(out, "    move {}, $v0", dst)?;
    writeln!(out, "    li $a1, {}", Tag::Str as u8)?;
    writeln!(out, "    sb $a1, 0({})", dst)?;
    writeln!(out, "    addi {}, {}, 1", w, dst)?;
    writeln!(out, "    mov.s $f0, {}", src)?;
    writeln!(out, "    mtc1 $zero, $f1")?;
    writeln!(out, "    c.lt.s $f0, $f1")?;
    writeln!(out, "    bc1f ftos_pos_{}", id)?;
    writeln!(out, "    neg.s $f0, $f0")?;
    writeln!(out, "    li $a1, 45")?;
    writeln!(out, "    sb $a1, 0({})", w)?;
    writeln!(out, "    addi {}, {}, 1", w, w)?;
    writeln!(out, "ftos_pos_{}:", id)?;
    writeln!(out, "    trunc.w.s $f1, $f0")?;
    writeln!(out, "    mfc1 {}, $f1", n)?;
    writeln!(out, "    cvt.s.w $f1, $f1")?;
    writeln!(out, "    sub.s $f0, $f0, $f1")?;
    digits(out, &n, &w, &s, "ftos", id)?;

    writeln!(out, "    lw $a1, {}($gp)", dot_slot)?;
    writeln!(out, "    lbu $a1, 1($a1)")?;
    writeln!(out, "    sb $a1, 0({})", w)?;
    writeln!(out, "    addi {}, {}, 1", w, w)?;

    writeln!(out, "    li $a1, 100000000")?;
    writeln!(out, "    mtc1 $a1, $f1")?;
    writeln!(out, "    cvt.s.w $f1, $f1")?;
    writeln!(out, "    mul.s $f0, $f0, $f1")?;
    writeln!(out, "    trunc.w.s $f0, $f0")?;
    writeln!(out, "    mfc1 {}, $f0", n)?;
    // eight digits written right to left, zero padded
    writeln!(out, "    addi {}, {}, 8", w, w)?;
    writeln!(out, "    sb $zero, 0({})", w)?;
    writeln!(out, "    addi {}, {}, -1", s, w)?;
    writeln!(out, "    addi $a0, {}, -9", w)?;
    writeln!(out, "frac_{}:", id)?;
    writeln!(out, "    li $a1, 10")?;
    writeln!(out, "    divu {}, $a1", n)?;
    writeln!(out, "    mfhi $a1")?;
    writeln!(out, "    mflo {}", n)?;
    writeln!(out, "    addi $a1, $a1, 48")?;
    writeln!(out, "    sb $a1, 0({})", s)?;
    writeln!(out, "    addi {}, {}, -1", s, s)?;
    writeln!(out, "    bne {}, $a0, frac_{}", s, id)
}

/// String form of a boxed value.
#[allow(clippy::too_many_arguments)]
pub fn any_to_string(
    out: Out,
    src: impl Display,
    dst: impl Display,
    n: impl Display,
    w: impl Display,
    s: impl Display,
    f: impl Display,
    dot_slot: usize,
    id: usize,
) -> fmt::Result {
    writeln!(out, "    lbu $a1, 0({})", src)?;
    writeln!(out, "    addi $a1, $a1, -{}", Tag::Str as u8)?;
    writeln!(out, "    beqz $a1, ats_str_{}", id)?;
    writeln!(out, "    addi $a1, $a1, 1")?;
    writeln!(out, "    beqz $a1, ats_float_{}", id)?;
    writeln!(out, "    lw {}, 4({})", n, src)?;
    int_to_string(out, &n, &dst, &n, &w, &s, id)?;
    writeln!(out, "    j ats_end_{}", id)?;
    writeln!(out, "ats_float_{}:", id)?;
    writeln!(out, "    l.s {}, 4({})", f, src)?;
    float_to_string(out, &f, &dst, &n, &w, &s, dot_slot, id)?;
    writeln!(out, "    j ats_end_{}", id)?;
    writeln!(out, "ats_str_{}:", id)?;
    writeln!(out, "    move {}, {}", dst, src)?;
    writeln!(out, "ats_end_{}:", id)
}

/// Concatenation in two passes: measure both strings, allocate, copy.
pub fn concat(
    out: Out,
    a: impl Display,
    b: impl Display,
    dst: impl Display,
    cursor: impl Display,
    len: impl Display,
    id: usize,
) -> fmt::Result {
    writeln!(out, "    li {}, 0", len)?;
    for (part, src) in [("a", &a as &dyn Display), ("b", &b as &dyn Display)] {
        writeln!(out, "    addi {}, {}, 1", cursor, src)?;
        writeln!(out, "cat_len_{}_{}:", part, id)?;
        writeln!(out, "    lbu $a1, 0({})", cursor)?;
        writeln!(out, "    beqz $a1, cat_len_{}_done_{}", part, id)?;
        writeln!(out, "    addi {}, {}, 1", len, len)?;
        writeln!(out, "    addi {}, {}, 1", cursor, cursor)?;
        writeln!(out, "    j cat_len_{}_{}", part, id)?;
        writeln!(out, "cat_len_{}_done_{}:", part, id)?;
    }

    writeln!(out, "    addi $a0, {}, 2", len)?;
    writeln!(out, "    li $v0, 9")?;
    writeln!(out, "    syscall")?;
    writeln!(out, "    move {}, $v0", dst)?;
    writeln!(out, "    li $a1, {}", Tag::Str as u8)?;
    writeln!(out, "    sb $a1, 0({})", dst)?;
    // `len` becomes the write cursor
    writeln!(out, "    addi {}, {}, 1", len, dst)?;

    for (part, src) in [("a", &a as &dyn Display), ("b", &b as &dyn Display)] {
        writeln!(out, "    addi {}, {}, 1", cursor, src)?;
        writeln!(out, "cat_copy_{}_{}:", part, id)?;
        writeln!(out, "    lbu $a1, 0({})", cursor)?;
        writeln!(out, "    beqz $a1, cat_copy_{}_done_{}", part, id)?;
        writeln!(out, "    sb $a1, 0({})", len)?;
        writeln!(out, "    addi {}, {}, 1", len, len)?;
        writeln!(out, "    addi {}, {}, 1", cursor, cursor)?;
        writeln!(out, "    j cat_copy_{}_{}", part, id)?;
        writeln!(out, "cat_copy_{}_done_{}:", part, id)?;
    }
    writeln!(out, "    sb $zero, 0({})", len)
}

pub fn print_int(out: Out, src: impl Display) -> fmt::Result {
    writeln!(out, "    move $a0, {}", src)?;
    writeln!(out, "    li $v0, 1")?;
    writeln!(out, "    syscall")
}

pub fn print_float(out: Out, src: impl Display) -> fmt::Result {
    writeln!(out, "    mov.s $f12, {}", src)?;
    writeln!(out, "    li $v0, 2")?;
    writeln!(out, "    syscall")
}

/// Prints a string byte by byte, skipping its tag.
pub fn print_string(out: Out, src: impl Display, cursor: impl Display, id: usize) -> fmt::Result {
    writeln!(out, "    addi {}, {}, 1", cursor, src)?;
    writeln!(out, "pstr_{}:", id)?;
    writeln!(out, "    lbu $a0, 0({})", cursor)?;
    writeln!(out, "    beqz $a0, pstr_done_{}", id)?;
    writeln!(out, "    li $v0, 11")?;
    writeln!(out, "    syscall")?;
    writeln!(out, "    addi {}, {}, 1", cursor, cursor)?;
    writeln!(out, "    j pstr_{}", id)?;
    writeln!(out, "pstr_done_{}:", id)
}

pub fn print_any(out: Out, src: impl Display, cursor: impl Display, id: usize) -> fmt::Result {
    writeln!(out, "    lbu $a1, 0({})", src)?;
    writeln!(out, "    addi $a1, $a1, -{}", Tag::Str as u8)?;
    writeln!(out, "    beqz $a1, pany_str_{}", id)?;
    writeln!(out, "    addi $a1, $a1, 1")?;
    writeln!(out, "    beqz $a1, pany_float_{}", id)?;
    writeln!(out, "    lw $a0, 4({})", src)?;
    writeln!(out, "    li $v0, 1")?;
    writeln!(out, "    syscall")?;
    writeln!(out, "    j pany_end_{}", id)?;
    writeln!(out, "pany_float_{}:", id)?;
    writeln!(out, "    l.s $f12, 4({})", src)?;
    writeln!(out, "    li $v0, 2")?;
    writeln!(out, "    syscall")?;
    writeln!(out, "    j pany_end_{}", id)?;
    writeln!(out, "pany_str_{}:", id)?;
    print_string(out, &src, &cursor, id)?;
    writeln!(out, "pany_end_{}:", id)
}

pub fn newline(out: Out) -> fmt::Result {
    writeln!(out, "    li $a0, 10")?;
    writeln!(out, "    li $v0, 11")?;
    writeln!(out, "    syscall")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().map(str::trim).collect()
    }

    #[test]
    fn test_alloc_helper_preserves_tag() {
        let mut out = String::new();
        alloc_helper(&mut out).unwrap();
        let l = lines(&out);
        assert_eq!(l[0], "auto_number_memory_alloc:");
        assert!(l.contains(&"li $a0, 8"));
        assert!(l.contains(&"sb $a0, 0($v0)"));
        assert_eq!(*l.last().unwrap(), "jr $ra");
    }

    #[test]
    fn test_prologue_and_epilogue_agree() {
        let mut out = String::new();
        function_prologue(&mut out, "fn_0_f", "skip_fn_0", 1, 8).unwrap();
        function_epilogue(&mut out, "return_fn_0", "skip_fn_0").unwrap();
        let l = lines(&out);
        assert_eq!(l[0], "j skip_fn_0");
        assert_eq!(l[1], "fn_0_f:");
        assert!(l.contains(&"li $a1, 1"));
        assert!(l.contains(&"addi $sp, $sp, -8"));
        assert!(l.contains(&"lw $ra, 8($sp)"));
        assert_eq!(*l.last().unwrap(), "skip_fn_0:");
    }

    #[test]
    fn test_int_op_names() {
        let mut out = String::new();
        int_op(&mut out, Op::Mod, "$s0", "$s1", "$s2").unwrap();
        int_op(&mut out, Op::Le, "$s0", "$s1", "$s2").unwrap();
        assert_eq!(lines(&out), vec!["remu $s2, $s0, $s1", "sle $s2, $s0, $s1"]);
    }

    #[test]
    fn test_float_mod_truncates() {
        let mut out = String::new();
        float_op(&mut out, Op::Mod, "$f20", "$f21", "$f22").unwrap();
        let l = lines(&out);
        assert_eq!(l[1], "trunc.w.s $f2, $f2");
        assert_eq!(l[4], "sub.s $f22, $f20, $f2");
    }

    #[test]
    fn test_float_not_equal_inverts_branch() {
        let mut out = String::new();
        float_compare(&mut out, Op::Ne, "$f20", "$f21", "$s0", 3).unwrap();
        let l = lines(&out);
        assert_eq!(l[0], "c.eq.s $f20, $f21");
        assert_eq!(l[2], "bc1f fcmp_3");
    }

    #[test]
    fn test_string_literal_layout() {
        let mut out = String::new();
        string_literal(&mut out, "hi", "$s0").unwrap();
        let l = lines(&out);
        assert_eq!(l[0], "li $a0, 4");
        assert!(l.contains(&"li $a1, 104"));
        assert!(l.contains(&"sb $a1, 2($s0)"));
        assert_eq!(*l.last().unwrap(), "sb $zero, 3($s0)");
    }

    #[test]
    fn test_template_labels_are_unique_per_id() {
        let mut out = String::new();
        any_to_string(&mut out, "$s0", "$s1", "$s2", "$s3", "$s4", "$f20", 12, 7).unwrap();
        let labels: Vec<&str> = lines(&out)
            .into_iter()
            .filter(|l| l.ends_with(':'))
            .collect();
        let mut unique = labels.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(labels.len(), unique.len());
        assert!(labels.iter().all(|l| l.contains("_7")));
    }

    #[test]
    fn test_frame_walk() {
        let mut out = String::new();
        frame_walk(&mut out, 2, 0).unwrap();
        let l = lines(&out);
        assert_eq!(l[0], "move $a3, $fp");
        assert!(l.contains(&"lw $a2, 4($a3)"));
        assert!(l.contains(&"addi $a2, $a2, -2"));
        assert!(l.contains(&"lw $a3, 0($a3)"));
    }
}
