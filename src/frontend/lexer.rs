use crate::error::{CompileError, ErrorKind};
use crate::frontend::ast::Span;

const PUNCTUATION: &str = "(){}[];,.+-*/%=!<>\"";

/// Lexical pre-pass run before the grammar.
///
/// Returns a copy of the source with `//` comments replaced by spaces so
/// that every byte offset of the copy still points at the same place in the
/// original text. Stray characters and unterminated strings are reported here
/// rather than as syntax errors.
pub fn scan(source: &str) -> Result<String, Vec<CompileError>> {
    let mut errors = Vec::new();
    let mut cleaned = String::with_capacity(source.len());
    let mut chars = source.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                cleaned.push(' ');
                while let Some(&(_, next)) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    blank(&mut cleaned, next);
                    chars.next();
                }
            }

            '"' => {
                cleaned.push('"');
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    cleaned.push(next);
                    if next == '"' {
                        closed = true;
                        break;
                    }
                    if next == '\n' {
                        break;
                    }
                }
                if !closed {
                    errors.push(CompileError::new(
                        ErrorKind::Lexical,
                        "unterminated string literal",
                        source,
                        Span::new(i, i + 1),
                    ));
                }
            }

            c if c.is_ascii_alphanumeric() || c == '_' || c.is_whitespace() || PUNCTUATION.contains(c) => {
                cleaned.push(c);
            }

            other => {
                errors.push(CompileError::new(
                    ErrorKind::Lexical,
                    format!("unexpected character '{}'", other),
                    source,
                    Span::new(i, i + other.len_utf8()),
                ));
                blank(&mut cleaned, other);
            }
        }
    }

    log::debug!("lexical pre-pass finished with {} error(s)", errors.len());

    if errors.is_empty() {
        Ok(cleaned)
    } else {
        Err(errors)
    }
}

// Keeps byte offsets stable when a character is dropped
fn blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_are_blanked() {
        let src = "var a = 1; // the answer\nprint a;";
        let cleaned = scan(src).unwrap();
        assert_eq!(cleaned.len(), src.len());
        assert!(!cleaned.contains("answer"));
        assert!(cleaned.ends_with("print a;"));
    }

    #[test]
    fn test_comment_markers_inside_strings_survive() {
        let src = "print \"a // b\";";
        assert_eq!(scan(src).unwrap(), src);
    }

    #[test]
    fn test_unexpected_character() {
        let errors = scan("var a = 1;\nvar b = @;").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Lexical);
        assert_eq!((errors[0].line, errors[0].column), (2, 9));
    }

    #[test]
    fn test_unterminated_string() {
        let errors = scan("print \"abc;\nprint 1;").unwrap_err();
        assert_eq!(errors[0].message, "unterminated string literal");
        assert_eq!(errors[0].line, 1);
    }
}
