use compiscript::compile;
use compiscript::error::ErrorKind;

use std::sync::Once;

/// Setup function that is only run once, even if called multiple times.
fn setup() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn assembly(src: &str) -> String {
    setup();
    let output = compile(src).unwrap();
    assert!(!output.had_errors, "unexpected errors: {:?}", output.errors);
    output.assembly.unwrap()
}

fn first_error(src: &str) -> compiscript::error::CompileError {
    setup();
    let output = compile(src).unwrap();
    assert!(output.had_errors);
    assert!(output.assembly.is_none());
    output.errors.into_iter().next().unwrap()
}

fn assert_program_shape(asm: &str) {
    assert!(asm.starts_with(".text"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("li $gp, 0x10010000"));
    assert!(asm.contains("auto_number_memory_alloc:"));
    // exit syscall before the helper
    let exit = asm.find("li $v0, 10").unwrap();
    let helper = asm.find("auto_number_memory_alloc:").unwrap();
    assert!(exit < helper);
}

#[test]
fn arithmetic() {
    let asm = assembly("var x = 1 + 2; print x;");
    assert_program_shape(&asm);
    assert!(asm.contains("add "));
    assert!(asm.contains("li $v0, 1"));
}

#[test]
fn string_concat() {
    let asm = assembly(r#"var s = "a" + "b"; print s;"#);
    assert_program_shape(&asm);
    assert!(asm.contains("cat_len_a_"));
    assert!(asm.contains("pstr_"));
}

#[test]
fn class_with_method() {
    let asm = assembly(
        r#"
        class A {
            init(n) { this.n = n; }
            get() { return this.n; }
        }
        var a = A(7);
        print a.get();
    "#,
    );
    assert_program_shape(&asm);
    assert!(asm.contains("fn_0_init:"));
    assert!(asm.contains("fn_1_get:"));
    assert!(asm.contains("jal fn_0_init"));
    assert!(asm.contains("jal fn_1_get"));
    // instance tag written into the fresh allocation
    assert!(asm.contains("li $a0, 132"));
    assert!(asm.contains("li $a1, 4"));
}

#[test]
fn recursion() {
    let asm = assembly(
        r#"
        fun f(x) {
            if (x < 2) return x;
            return f(x - 1) + f(x - 2);
        }
        print f(6);
    "#,
    );
    assert_program_shape(&asm);
    assert!(asm.contains("skip_fn_0:"));
    assert!(asm.contains("return_fn_0:"));
    assert_eq!(asm.matches("jal fn_0_f").count(), 3);
}

#[test]
fn any_dispatch() {
    let asm = assembly(r#"var a; a = 1; a = "hi"; print a;"#);
    assert_program_shape(&asm);
    assert!(asm.contains("pany_str_"));
}

#[test]
fn inheritance_and_super() {
    let asm = assembly(
        r#"
        class A { m() { return 1; } }
        class B < A { m() { return super.m() + 1; } }
        print B().m();
    "#,
    );
    assert_program_shape(&asm);
    assert!(asm.contains("jal fn_0_m"));
    assert!(asm.contains("jal fn_1_m"));
}

#[test]
fn loops_with_break_and_continue() {
    let output = compile(
        r#"
        for (var i = 0; i < 5; i = i + 1) {
            if (i == 1) continue;
            if (i > 3) break;
            print i;
        }
        var j = 0;
        while (j < 3) { j = j + 1; }
    "#,
    )
    .unwrap();
    assert!(!output.had_errors);
    let ir = output.ir.unwrap();
    assert!(ir.contains("GOTO"));
    assert!(ir.contains("IF "));
    assert_program_shape(&output.assembly.unwrap());
}

#[test]
fn float_division() {
    let asm = assembly("var x = 7 / 2; print x;");
    assert!(asm.contains("div.s"));
    assert!(asm.contains("li $v0, 2"));
}

#[test]
fn nested_function_walks_frames() {
    let asm = assembly(
        r#"
        fun outer() {
            var x = 1;
            fun inner() { return x; }
            return inner();
        }
        print outer();
    "#,
    );
    assert!(asm.contains("walk_"));
    assert!(asm.contains("fn_1_inner:"));
}

#[test]
fn arrays() {
    let asm = assembly("var a = [1, 2, 3]; var i = 2; print a[i];");
    assert_program_shape(&asm);
    assert!(asm.contains("li $a0, 12"));
}

#[test]
fn empty_array_is_nil() {
    setup();
    let output = compile("var a = []; print a == nil;").unwrap();
    assert!(!output.had_errors, "unexpected errors: {:?}", output.errors);
    let ir = output.ir.unwrap();
    assert!(ir.contains("a = nil"));
    // both sides are plain integers, so no tag dispatch and no array pointer
    let asm = output.assembly.unwrap();
    assert!(asm.contains("seq "));
    assert!(!asm.contains("acmp_"));
}

#[test]
fn undeclared_variable() {
    let err = first_error("print x;");
    assert_eq!(err.kind, ErrorKind::Semantic);
    assert_eq!((err.line, err.column), (1, 7));
}

#[test]
fn syntax_error() {
    let err = first_error("var = ;");
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn lexical_error() {
    let err = first_error("var a = 1 @ 2;");
    assert_eq!(err.kind, ErrorKind::Lexical);
}

#[test]
fn errors_are_all_reported() {
    setup();
    let output = compile("print x;\nvar a = 1;\nvar a = 2;\nif (1) print a;").unwrap();
    assert!(output.had_errors);
    assert_eq!(output.errors.len(), 3);
    assert_eq!(output.errors[1].line, 3);
}

#[test]
fn check_only() {
    setup();
    assert!(compiscript::check("var a = 1; print a;").is_empty());
    assert_eq!(compiscript::check("break;").len(), 1);
}
