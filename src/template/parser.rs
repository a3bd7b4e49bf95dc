//! Builds the node tree from lexed items.

use super::functions;
use super::lexer::{Item, Token};
use super::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action {
        pipe: Pipeline,
        line: usize,
    },
    If {
        cond: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
    Range {
        over: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
        line: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Func(String),
    Field(Vec<String>),
    Var(Vec<String>),
    Str(String),
    Int(u64),
    Bool(bool),
    Sub(Pipeline),
}

/// How a nested list ended.
enum Terminator {
    End,
    /// `{{else}}` or `{{else if ...}}`; carries the tokens after `else`.
    Else(Vec<Token>),
}

pub(crate) fn parse(items: Vec<Item>) -> Result<Vec<Node>, TemplateError> {
    let mut parser = Parser {
        items: items.into_iter(),
    };
    let (nodes, terminator) = parser.parse_list()?;
    match terminator {
        None => Ok(nodes),
        Some((Terminator::End, line)) => Err(syntax(line, "unexpected {{end}}")),
        Some((Terminator::Else(_), line)) => Err(syntax(line, "unexpected {{else}}")),
    }
}

fn syntax(line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        line,
        message: message.into(),
    }
}

struct Parser {
    items: std::vec::IntoIter<Item>,
}

impl Parser {
    fn parse_list(&mut self) -> Result<(Vec<Node>, Option<(Terminator, usize)>), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            let (mut tokens, line) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { tokens, line } => (tokens, line),
            };

            let keyword = match tokens.first() {
                Some(Token::Ident(word)) => word.clone(),
                _ => String::new(),
            };
            match keyword.as_str() {
                "if" => {
                    tokens.remove(0);
                    nodes.push(self.parse_if(tokens, line)?);
                }
                "range" => {
                    tokens.remove(0);
                    nodes.push(self.parse_range(tokens, line)?);
                }
                "else" => {
                    tokens.remove(0);
                    return Ok((nodes, Some((Terminator::Else(tokens), line))));
                }
                "end" => {
                    if tokens.len() > 1 {
                        return Err(syntax(line, "unexpected tokens after end"));
                    }
                    return Ok((nodes, Some((Terminator::End, line))));
                }
                _ => nodes.push(Node::Action {
                    pipe: parse_pipeline(&tokens, line)?,
                    line,
                }),
            }
        }
        Ok((nodes, None))
    }

    fn parse_if(&mut self, cond_tokens: Vec<Token>, line: usize) -> Result<Node, TemplateError> {
        let cond = parse_pipeline(&cond_tokens, line)?;
        let (then, terminator) = self.parse_list()?;
        let otherwise = match terminator {
            None => return Err(syntax(line, "unexpected EOF: if without end")),
            Some((Terminator::End, _)) => Vec::new(),
            Some((Terminator::Else(rest), else_line)) => match rest.first() {
                None => self.parse_else_body(line)?,
                Some(Token::Ident(word)) if word == "if" => {
                    vec![self.parse_if(rest[1..].to_vec(), else_line)?]
                }
                Some(_) => return Err(syntax(else_line, "unexpected tokens after else")),
            },
        };
        Ok(Node::If {
            cond,
            then,
            otherwise,
            line,
        })
    }

    fn parse_range(&mut self, over_tokens: Vec<Token>, line: usize) -> Result<Node, TemplateError> {
        let over = parse_pipeline(&over_tokens, line)?;
        let (body, terminator) = self.parse_list()?;
        let otherwise = match terminator {
            None => return Err(syntax(line, "unexpected EOF: range without end")),
            Some((Terminator::End, _)) => Vec::new(),
            Some((Terminator::Else(rest), else_line)) => {
                if !rest.is_empty() {
                    return Err(syntax(else_line, "unexpected tokens after else"));
                }
                self.parse_else_body(line)?
            }
        };
        Ok(Node::Range {
            over,
            body,
            otherwise,
            line,
        })
    }

    fn parse_else_body(&mut self, line: usize) -> Result<Vec<Node>, TemplateError> {
        match self.parse_list()? {
            (nodes, Some((Terminator::End, _))) => Ok(nodes),
            (_, Some((Terminator::Else(_), else_line))) => {
                Err(syntax(else_line, "more than one else in block"))
            }
            (_, None) => Err(syntax(line, "unexpected EOF: else without end")),
        }
    }
}

fn parse_pipeline(tokens: &[Token], line: usize) -> Result<Pipeline, TemplateError> {
    let mut commands = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| syntax(line, "unexpected right paren"))?;
            }
            Token::Pipe if depth == 0 => {
                commands.push(parse_command(&tokens[start..idx], line)?);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(syntax(line, "unclosed left paren"));
    }
    commands.push(parse_command(&tokens[start..], line)?);
    Ok(Pipeline { commands })
}

fn parse_command(tokens: &[Token], line: usize) -> Result<Command, TemplateError> {
    if tokens.is_empty() {
        return Err(syntax(line, "missing command in pipeline"));
    }
    let mut operands = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        let operand = match &tokens[idx] {
            Token::Ident(word) => match word.as_str() {
                "true" => Operand::Bool(true),
                "false" => Operand::Bool(false),
                "if" | "else" | "end" | "range" => {
                    return Err(syntax(line, format!("unexpected keyword '{word}'")));
                }
                name if functions::is_builtin(name) => Operand::Func(name.to_string()),
                name => {
                    return Err(TemplateError::UnknownFunction {
                        line,
                        name: name.to_string(),
                    });
                }
            },
            Token::Field(path) => Operand::Field(path.clone()),
            Token::Var(path) => Operand::Var(path.clone()),
            Token::Str(s) => Operand::Str(s.clone()),
            Token::Int(n) => Operand::Int(*n),
            Token::LParen => {
                let close = matching_paren(tokens, idx, line)?;
                let inner = parse_pipeline(&tokens[idx + 1..close], line)?;
                idx = close;
                Operand::Sub(inner)
            }
            Token::RParen => return Err(syntax(line, "unexpected right paren")),
            Token::Pipe => return Err(syntax(line, "missing command in pipeline")),
        };
        operands.push(operand);
        idx += 1;
    }
    Ok(Command { operands })
}

fn matching_paren(tokens: &[Token], open: usize, line: usize) -> Result<usize, TemplateError> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(idx);
                }
            }
            _ => {}
        }
    }
    Err(syntax(line, "unclosed left paren"))
}
