//! Splits a template into literal text and tokenized `{{ ... }}` actions.

use super::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Function name or keyword (`if`, `else`, `end`, `range`, `true`, `false`).
    Ident(String),
    /// `.` (empty) or `.A.B`.
    Field(Vec<String>),
    /// `$` (empty) or `$.A.B`.
    Var(Vec<String>),
    Str(String),
    Int(u64),
    Pipe,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Item {
    Text(String),
    Action { tokens: Vec<Token>, line: usize },
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

pub(crate) fn lex(src: &str) -> Result<Vec<Item>, TemplateError> {
    let mut items = Vec::new();
    let mut rest = src;
    let mut line = 1;
    let mut trim_next = false;

    loop {
        let Some(open) = rest.find(OPEN) else {
            push_text(&mut items, rest, trim_next, false);
            break;
        };

        let after = &rest[open + OPEN.len()..];
        let trim_left = after.starts_with('-') && after[1..].starts_with(char::is_whitespace);
        let body = if trim_left { &after[1..] } else { after };

        push_text(&mut items, &rest[..open], trim_next, trim_left);
        line += newlines(&rest[..open]);

        let action = scan_action(body, line)?;
        if !action.tokens.is_empty() {
            items.push(Item::Action {
                tokens: action.tokens,
                line,
            });
        }
        line += newlines(&body[..action.consumed]);
        rest = &body[action.consumed..];
        trim_next = action.trim_right;
    }

    Ok(items)
}

fn push_text(items: &mut Vec<Item>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

struct ScannedAction {
    tokens: Vec<Token>,
    /// Bytes of the body consumed, including the closing delimiter.
    consumed: usize,
    trim_right: bool,
}

fn syntax(line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        line,
        message: message.into(),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn scan_action(body: &str, line: usize) -> Result<ScannedAction, TemplateError> {
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut saw_space = true;

    loop {
        let rest = &body[i..];
        let Some(c) = rest.chars().next() else {
            return Err(syntax(line, "unclosed action"));
        };

        if c.is_whitespace() {
            i += c.len_utf8();
            saw_space = true;
            continue;
        }
        if rest.starts_with(CLOSE) {
            return Ok(ScannedAction {
                tokens,
                consumed: i + CLOSE.len(),
                trim_right: false,
            });
        }
        if saw_space && rest.starts_with("-}}") {
            return Ok(ScannedAction {
                tokens,
                consumed: i + 1 + CLOSE.len(),
                trim_right: true,
            });
        }
        if tokens.is_empty() && rest.starts_with("/*") {
            let end = rest
                .find("*/")
                .ok_or_else(|| syntax(line, "unclosed comment"))?;
            i += end + 2;
            saw_space = true;
            let tail = body[i..].trim_start();
            if !(tail.starts_with(CLOSE) || tail.starts_with("-}}")) {
                return Err(syntax(line, "comment must be the whole action"));
            }
            continue;
        }
        saw_space = false;

        match c {
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let (value, len) = scan_quoted(rest, line)?;
                tokens.push(Token::Str(value));
                i += len;
            }
            '`' => {
                let end = rest[1..]
                    .find('`')
                    .ok_or_else(|| syntax(line, "unterminated raw string"))?;
                tokens.push(Token::Str(rest[1..1 + end].to_string()));
                i += end + 2;
            }
            '.' => {
                let (path, len) = scan_path(rest);
                tokens.push(Token::Field(path));
                i += len;
            }
            '$' => {
                let (path, len) = scan_path(&rest[1..]);
                if len == 0 && rest[1..].starts_with(is_ident_char) {
                    return Err(syntax(line, "named variables are not supported"));
                }
                tokens.push(Token::Var(path));
                i += 1 + len;
            }
            c if c.is_ascii_digit() => {
                let len = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                let value = rest[..len]
                    .parse()
                    .map_err(|_| syntax(line, format!("invalid number '{}'", &rest[..len])))?;
                tokens.push(Token::Int(value));
                i += len;
            }
            c if is_ident_start(c) => {
                let len = rest
                    .find(|c: char| !is_ident_char(c))
                    .unwrap_or(rest.len());
                tokens.push(Token::Ident(rest[..len].to_string()));
                i += len;
            }
            other => {
                return Err(syntax(line, format!("unexpected character '{other}' in action")));
            }
        }
    }
}

/// Scan `.A.B` starting at a `.`; returns the segments and bytes consumed.
/// A lone `.` yields an empty path.
fn scan_path(s: &str) -> (Vec<String>, usize) {
    let mut path = Vec::new();
    let mut i = 0;
    while s[i..].starts_with('.') {
        let name = &s[i + 1..];
        let len = match name.chars().next() {
            Some(c) if is_ident_start(c) => name.find(|c: char| !is_ident_char(c)).unwrap_or(name.len()),
            _ => 0,
        };
        if len == 0 {
            if path.is_empty() {
                i += 1;
            }
            break;
        }
        path.push(name[..len].to_string());
        i += 1 + len;
    }
    (path, i)
}

/// Scan a double-quoted string with Go-style escapes.
fn scan_quoted(s: &str, line: usize) -> Result<(String, usize), TemplateError> {
    let mut value = String::new();
    let mut chars = s.char_indices().skip(1);
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((value, idx + 1)),
            '\n' => break,
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, other)) => {
                    return Err(syntax(line, format!("unknown escape sequence '\\{other}'")));
                }
                None => break,
            },
            c => value.push(c),
        }
    }
    Err(syntax(line, "unterminated quoted string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(src: &str) -> Vec<Token> {
        match lex(src).unwrap().as_slice() {
            [Item::Action { tokens, .. }] => tokens.clone(),
            other => panic!("expected one action, got {other:?}"),
        }
    }

    #[test]
    fn tokenizes_operands() {
        assert_eq!(
            action(r#"{{make "a b" `raw\n` 12 . .X.y $ $.Z | f (g)}}"#),
            vec![
                Token::Ident("make".into()),
                Token::Str("a b".into()),
                Token::Str("raw\\n".into()),
                Token::Int(12),
                Token::Field(vec![]),
                Token::Field(vec!["X".into(), "y".into()]),
                Token::Var(vec![]),
                Token::Var(vec!["Z".into()]),
                Token::Pipe,
                Token::Ident("f".into()),
                Token::LParen,
                Token::Ident("g".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn escapes_in_strings() {
        assert_eq!(
            action(r#"{{"a\"b\\c\td"}}"#),
            vec![Token::Str("a\"b\\c\td".into())]
        );
    }

    #[test]
    fn tracks_lines_through_text_and_actions() {
        let items = lex("one\n{{a}}\n{{b\n}}\n{{c}}").unwrap();
        let lines: Vec<usize> = items
            .iter()
            .filter_map(|item| match item {
                Item::Action { line, .. } => Some(*line),
                Item::Text(_) => None,
            })
            .collect();
        assert_eq!(lines, [2, 3, 5]);
    }

    #[test]
    fn comments_produce_no_action() {
        let items = lex("a{{/* note */}}b").unwrap();
        assert_eq!(items, [Item::Text("a".into()), Item::Text("b".into())]);
    }

    #[test]
    fn minus_without_space_is_not_a_trim_marker() {
        assert!(matches!(
            lex("{{-3}}"),
            Err(TemplateError::Syntax { .. })
        ));
    }

    #[test]
    fn unclosed_action_fails() {
        assert!(matches!(lex("{{make"), Err(TemplateError::Syntax { .. })));
    }
}
