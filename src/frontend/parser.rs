use crate::error::{CompileError, ErrorKind};
use crate::frontend::ast::{
    self, BinaryOp, Expr, ExprKind, LogicalOp, Span, Stmt, Suffix, SuffixKind, UnaryOp,
};
use chumsky::prelude::*;
use chumsky::Parser;

type Extra<'src> = extra::Err<Rich<'src, char>>;

const KEYWORDS: &[&str] = &[
    "and", "break", "class", "continue", "else", "false", "for", "fun", "if", "nil", "or",
    "print", "return", "super", "this", "true", "var", "while",
];

pub fn parse(source_code: &str) -> Result<ast::Program, Vec<CompileError>> {
    parser()
        .parse(source_code)
        .into_result()
        .map_err(|errors| {
            errors
                .into_iter()
                .map(|err| {
                    CompileError::new(
                        ErrorKind::Syntax,
                        err.to_string(),
                        source_code,
                        Span::from(*err.span()),
                    )
                })
                .collect()
        })
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.join(right.span),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.join(right.span),
        kind: ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

// Only `name = value` and `receiver.name = value` are assignable
fn assignment_target<'src>(
    target: Expr,
    value: Expr,
    raw_span: SimpleSpan,
) -> Result<Expr, Rich<'src, char>> {
    let span = Span::from(raw_span);
    match target.kind {
        ExprKind::Variable(name) => Ok(Expr {
            kind: ExprKind::Assign {
                name,
                name_span: target.span,
                value: Box::new(value),
            },
            span,
        }),

        ExprKind::Chain { head, mut suffixes } => match suffixes.pop() {
            Some(Suffix { kind: SuffixKind::Get(name), .. }) => {
                let receiver = match suffixes.last() {
                    None => *head,
                    Some(last) => Expr {
                        span: Span::new(head.span.start, last.span.end),
                        kind: ExprKind::Chain { head, suffixes },
                    },
                };
                Ok(Expr {
                    kind: ExprKind::Set {
                        receiver: Box::new(receiver),
                        name,
                        value: Box::new(value),
                    },
                    span,
                })
            }
            _ => Err(Rich::custom(raw_span, "invalid assignment target")),
        },

        _ => Err(Rich::custom(raw_span, "invalid assignment target")),
    }
}

fn parser<'src>() -> impl Parser<'src, &'src str, ast::Program, Extra<'src>> {
    // All of our 'atoms' (like identifiers, keywords, symbols)
    // are '.padded()' to ignore whitespace around them.
    let ident = text::ident()
        .try_map(|name: &str, span| {
            if KEYWORDS.contains(&name) {
                Err(Rich::custom(span, format!("expected identifier, found keyword '{}'", name)))
            } else {
                Ok(name.to_string())
            }
        })
        .padded();

    let params = ident
        .clone()
        .separated_by(just(',').padded())
        .allow_trailing()
        .collect::<Vec<String>>()
        .delimited_by(just('(').padded(), just(')').padded());

    let statement = recursive(|statement| {
        let block = statement
            .clone()
            .repeated()
            .collect::<Vec<Stmt>>()
            .delimited_by(just('{').padded(), just('}').padded());

        /*
         * Expression Parser
         * assignment > or > and > equality > comparison > term > factor > unary > chain
         */
        let expr = recursive(|expr| {
            let number = text::int(10)
                .then(just('.').then(text::digits(10)).or_not())
                .to_slice()
                .try_map(|digits: &str, span| {
                    if digits.contains('.') {
                        digits
                            .parse::<f32>()
                            .map(ExprKind::Float)
                            .map_err(|_| Rich::custom(span, "invalid float literal"))
                    } else {
                        digits
                            .parse::<i32>()
                            .map(ExprKind::Int)
                            .map_err(|_| Rich::custom(span, "integer literal out of range"))
                    }
                });

            let string = just('"')
                .ignore_then(none_of("\"").repeated().to_slice())
                .then_ignore(just('"'))
                .map(|s: &str| ExprKind::Str(s.to_string()));

            let super_access = text::keyword("super")
                .padded()
                .ignore_then(just('.').padded())
                .ignore_then(ident.clone())
                .map(ExprKind::Super);

            let array = expr
                .clone()
                .separated_by(just(',').padded())
                .allow_trailing()
                .collect::<Vec<Expr>>()
                .delimited_by(just('[').padded(), just(']').padded())
                .map(ExprKind::Array);

            let lambda = text::keyword("fun")
                .padded()
                .ignore_then(params.clone())
                .then(
                    statement
                        .clone()
                        .repeated()
                        .collect::<Vec<Stmt>>()
                        .delimited_by(just('{').padded(), just('}').padded()),
                )
                .map_with(|(params, body), e| {
                    ExprKind::Lambda(Box::new(ast::Function {
                        name: None,
                        params,
                        body,
                        span: Span::from(e.span()),
                    }))
                });

            let primary = choice((
                number,
                string,
                text::keyword("true").to(ExprKind::Bool(true)),
                text::keyword("false").to(ExprKind::Bool(false)),
                text::keyword("nil").to(ExprKind::Nil),
                text::keyword("this").to(ExprKind::This),
                super_access,
                lambda,
                array,
                ident.clone().map(ExprKind::Variable),
            ))
            .map_with(|kind, e| Expr { kind, span: Span::from(e.span()) })
            .padded()
            .or(expr.clone().delimited_by(just('(').padded(), just(')').padded()));

            let call_args = expr
                .clone()
                .separated_by(just(',').padded())
                .allow_trailing()
                .collect::<Vec<Expr>>()
                .delimited_by(just('(').padded(), just(')').padded())
                .map(SuffixKind::Call);

            let field = just('.')
                .padded()
                .ignore_then(ident.clone())
                .map(SuffixKind::Get);

            let index = expr
                .clone()
                .delimited_by(just('[').padded(), just(']').padded())
                .map(|index| SuffixKind::Index(Box::new(index)));

            let suffix = choice((call_args, field, index))
                .map_with(|kind, e| Suffix { kind, span: Span::from(e.span()) });

            let chain = primary
                .then(suffix.repeated().collect::<Vec<Suffix>>())
                .map(|(head, suffixes)| match suffixes.last() {
                    None => head,
                    Some(last) => Expr {
                        span: Span::new(head.span.start, last.span.end),
                        kind: ExprKind::Chain {
                            head: Box::new(head),
                            suffixes,
                        },
                    },
                })
                .boxed();

            let unary = choice((just('-').to(UnaryOp::Neg), just('!').to(UnaryOp::Not)))
                .map_with(|op, e| (op, Span::from(e.span())))
                .padded()
                .repeated()
                .foldr(chain, |(op, op_span), operand: Expr| Expr {
                    span: op_span.join(operand.span),
                    kind: ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                })
                .boxed();

            let factor = unary
                .clone()
                .foldl(
                    choice((
                        just('*').to(BinaryOp::Mul),
                        just('/').to(BinaryOp::Div),
                        just('%').to(BinaryOp::Mod),
                    ))
                    .padded()
                    .then(unary)
                    .repeated(),
                    |left, (op, right)| binary(op, left, right),
                )
                .boxed();

            let term = factor
                .clone()
                .foldl(
                    choice((just('+').to(BinaryOp::Add), just('-').to(BinaryOp::Sub)))
                        .padded()
                        .then(factor)
                        .repeated(),
                    |left, (op, right)| binary(op, left, right),
                )
                .boxed();

            let comparison = term
                .clone()
                .foldl(
                    choice((
                        just("<=").to(BinaryOp::Le),
                        just(">=").to(BinaryOp::Ge),
                        just("<").to(BinaryOp::Lt),
                        just(">").to(BinaryOp::Gt),
                    ))
                    .padded()
                    .then(term)
                    .repeated(),
                    |left, (op, right)| binary(op, left, right),
                )
                .boxed();

            let equality = comparison
                .clone()
                .foldl(
                    choice((just("==").to(BinaryOp::Eq), just("!=").to(BinaryOp::Ne)))
                        .padded()
                        .then(comparison)
                        .repeated(),
                    |left, (op, right)| binary(op, left, right),
                )
                .boxed();

            let logic_and = equality
                .clone()
                .foldl(
                    text::keyword("and")
                        .padded()
                        .to(LogicalOp::And)
                        .then(equality)
                        .repeated(),
                    |left, (op, right)| logical(op, left, right),
                )
                .boxed();

            let logic_or = logic_and
                .clone()
                .foldl(
                    text::keyword("or")
                        .padded()
                        .to(LogicalOp::Or)
                        .then(logic_and)
                        .repeated(),
                    |left, (op, right)| logical(op, left, right),
                )
                .boxed();

            logic_or
                .then(just('=').padded().ignore_then(expr.clone()).or_not())
                .try_map(|(target, value), span| match value {
                    None => Ok(target),
                    Some(value) => assignment_target(target, value, span),
                })
                .boxed()
        });

        /*
         * Statement Parser
         */
        let function = ident
            .clone()
            .then(params.clone())
            .then(block.clone())
            .map_with(|((name, params), body), e| ast::Function {
                name: Some(name),
                params,
                body,
                span: Span::from(e.span()),
            });

        let class_decl = text::keyword("class")
            .padded()
            .ignore_then(ident.clone())
            .then(just('<').padded().ignore_then(ident.clone()).or_not())
            .then(
                function
                    .clone()
                    .repeated()
                    .collect::<Vec<ast::Function>>()
                    .delimited_by(just('{').padded(), just('}').padded()),
            )
            .map_with(|((name, parent), methods), e| Stmt::Class {
                name,
                parent,
                methods,
                span: Span::from(e.span()),
            });

        let fun_decl = text::keyword("fun")
            .padded()
            .ignore_then(function)
            .map(Stmt::Fun);

        let var_decl = text::keyword("var")
            .padded()
            .ignore_then(ident.clone())
            .then(just('=').padded().ignore_then(expr.clone()).or_not())
            .then_ignore(just(';').padded())
            .map_with(|(name, value), e| Stmt::Var {
                name,
                value,
                span: Span::from(e.span()),
            });

        let expr_stmt = expr
            .clone()
            .then_ignore(just(';').padded())
            .map_with(|expr, e| Stmt::Expr {
                expr,
                span: Span::from(e.span()),
            });

        let for_init = choice((
            var_decl.clone().map(|s| Some(Box::new(s))),
            expr_stmt.clone().map(|s| Some(Box::new(s))),
            just(';').padded().to(None),
        ));

        let for_stmt = text::keyword("for")
            .padded()
            .ignore_then(just('(').padded())
            .ignore_then(for_init)
            .then(expr.clone().or_not())
            .then_ignore(just(';').padded())
            .then(expr.clone().or_not())
            .then_ignore(just(')').padded())
            .then(statement.clone())
            .map_with(|(((init, cond), update), body), e| Stmt::For {
                init,
                cond,
                update,
                body: Box::new(body),
                span: Span::from(e.span()),
            });

        let if_stmt = text::keyword("if")
            .padded()
            .ignore_then(expr.clone().delimited_by(just('(').padded(), just(')').padded()))
            .then(statement.clone())
            .then(text::keyword("else").padded().ignore_then(statement.clone()).or_not())
            .map_with(|((cond, then_branch), else_branch), e| Stmt::If {
                cond,
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
                span: Span::from(e.span()),
            });

        let print_stmt = text::keyword("print")
            .padded()
            .ignore_then(expr.clone())
            .then_ignore(just(';').padded())
            .map_with(|expr, e| Stmt::Print {
                expr,
                span: Span::from(e.span()),
            });

        let return_stmt = text::keyword("return")
            .padded()
            .ignore_then(expr.clone().or_not())
            .then_ignore(just(';').padded())
            .map_with(|value, e| Stmt::Return {
                value,
                span: Span::from(e.span()),
            });

        let while_stmt = text::keyword("while")
            .padded()
            .ignore_then(expr.clone().delimited_by(just('(').padded(), just(')').padded()))
            .then(statement.clone())
            .map_with(|(cond, body), e| Stmt::While {
                cond,
                body: Box::new(body),
                span: Span::from(e.span()),
            });

        let break_stmt = text::keyword("break")
            .padded()
            .then_ignore(just(';').padded())
            .map_with(|_, e| Stmt::Break { span: Span::from(e.span()) });

        let continue_stmt = text::keyword("continue")
            .padded()
            .then_ignore(just(';').padded())
            .map_with(|_, e| Stmt::Continue { span: Span::from(e.span()) });

        let block_stmt = block.map_with(|body, e| Stmt::Block {
            body,
            span: Span::from(e.span()),
        });

        choice((
            class_decl,
            fun_decl,
            var_decl,
            for_stmt,
            if_stmt,
            print_stmt,
            return_stmt,
            while_stmt,
            break_stmt,
            continue_stmt,
            block_stmt,
            expr_stmt,
        ))
        .boxed()
    });

    statement
        .padded()
        .repeated()
        .collect()
        .map(|statements| ast::Program { statements })
        .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> ast::Program {
        match parse(src) {
            Ok(program) => program,
            Err(errors) => panic!("unexpected syntax errors: {:?}", errors),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse_ok("print 1 + 2 * 3;");
        let Stmt::Print { expr, .. } = &program.statements[0] else {
            panic!("expected print");
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_logical_binds_looser_than_comparison() {
        let program = parse_ok("var a = 1 < 2 or 3 >= 4 and true;");
        let Stmt::Var { value: Some(expr), .. } = &program.statements[0] else {
            panic!("expected var");
        };
        assert!(matches!(expr.kind, ExprKind::Logical { op: LogicalOp::Or, .. }));
    }

    #[test]
    fn test_call_chain() {
        let program = parse_ok("a.b(1, 2)[0].c;");
        let Stmt::Expr { expr, .. } = &program.statements[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::Chain { head, suffixes } = &expr.kind else {
            panic!("expected chain");
        };
        assert!(matches!(head.kind, ExprKind::Variable(ref name) if name == "a"));
        assert_eq!(suffixes.len(), 4);
        assert!(matches!(suffixes[1].kind, SuffixKind::Call(ref args) if args.len() == 2));
        assert!(matches!(suffixes[2].kind, SuffixKind::Index(_)));
    }

    #[test]
    fn test_property_assignment() {
        let program = parse_ok("class A { init(n) { this.n = n; } }");
        let Stmt::Class { methods, .. } = &program.statements[0] else {
            panic!("expected class");
        };
        let Stmt::Expr { expr, .. } = &methods[0].body[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::Set { receiver, name, .. } = &expr.kind else {
            panic!("expected set");
        };
        assert_eq!(name, "n");
        assert!(matches!(receiver.kind, ExprKind::This));
    }

    #[test]
    fn test_class_with_parent_and_lambda() {
        let program = parse_ok(
            "class B < A { m() { return super.m() + 1; } }
             var f = fun(x) { return x; };",
        );
        assert!(matches!(
            program.statements[0],
            Stmt::Class { parent: Some(ref p), .. } if p == "A"
        ));
        let Stmt::Var { value: Some(expr), .. } = &program.statements[1] else {
            panic!("expected var");
        };
        assert!(matches!(expr.kind, ExprKind::Lambda(ref f) if f.params.len() == 1));
    }

    #[test]
    fn test_for_clauses() {
        let program = parse_ok("for (var i = 0; i < 3; i = i + 1) print i;");
        let Stmt::For { init, cond, update, .. } = &program.statements[0] else {
            panic!("expected for");
        };
        assert!(init.is_some() && cond.is_some() && update.is_some());

        let program = parse_ok("for (;;) { break; }");
        let Stmt::For { init, cond, update, .. } = &program.statements[0] else {
            panic!("expected for");
        };
        assert!(init.is_none() && cond.is_none() && update.is_none());
    }

    #[test]
    fn test_literals() {
        let program = parse_ok("print 2.5; print \"hi\"; print nil;");
        let kinds: Vec<_> = program
            .statements
            .iter()
            .map(|s| match s {
                Stmt::Print { expr, .. } => expr.kind.clone(),
                _ => panic!("expected print"),
            })
            .collect();
        assert!(matches!(kinds[0], ExprKind::Float(f) if f == 2.5));
        assert!(matches!(kinds[1], ExprKind::Str(ref s) if s == "hi"));
        assert!(matches!(kinds[2], ExprKind::Nil));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let errors = parse("1 + 2 = 3;").unwrap_err();
        assert!(errors.iter().all(|e| e.kind == ErrorKind::Syntax));
    }

    #[test]
    fn test_keyword_is_not_identifier() {
        assert!(parse("var while = 1;").is_err());
    }

    #[test]
    fn test_missing_semicolon_reports_position() {
        let errors = parse("var a = 1\nprint a;").unwrap_err();
        assert_eq!(errors[0].kind, ErrorKind::Syntax);
        assert_eq!(errors[0].line, 2);
    }
}
