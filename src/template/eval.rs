//! Executes a parsed template against a [`TemplateContext`].

use super::functions;
use super::parser::{Command, Node, Operand, Pipeline};
use super::{TemplateContext, TemplateError};
use crate::descriptor::TemplateValue;
use std::collections::BTreeMap;

/// A value produced while evaluating a template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    /// The descriptor itself (`.` at top level, and `$`).
    Root,
    Str(String),
    Int(u64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Root => "descriptor",
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::Map(_) => "mapping",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Root => true,
            Value::Str(s) => !s.is_empty(),
            Value::Int(n) => *n != 0,
            Value::Bool(b) => *b,
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    fn strings(items: &[String]) -> Value {
        Value::List(items.iter().cloned().map(Value::Str).collect())
    }
}

impl From<&TemplateValue> for Value {
    fn from(value: &TemplateValue) -> Self {
        match value {
            TemplateValue::String(s) => Value::Str(s.clone()),
            TemplateValue::List(items) => Value::strings(items),
            TemplateValue::Map(map) => Value::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), Value::from(value)))
                    .collect(),
            ),
        }
    }
}

pub(crate) struct Evaluator<'c, 'a> {
    ctx: &'c TemplateContext<'a>,
}

impl<'c, 'a> Evaluator<'c, 'a> {
    pub(crate) fn new(ctx: &'c TemplateContext<'a>) -> Self {
        Self { ctx }
    }

    pub(crate) fn exec(&self, nodes: &[Node], dot: &Value, out: &mut String) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action { pipe, line } => {
                    let value = self.eval_pipeline(pipe, dot, *line)?;
                    render_into(&value, *line, out)?;
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                    line,
                } => {
                    if self.eval_pipeline(cond, dot, *line)?.truthy() {
                        self.exec(then, dot, out)?;
                    } else {
                        self.exec(otherwise, dot, out)?;
                    }
                }
                Node::Range {
                    over,
                    body,
                    otherwise,
                    line,
                } => {
                    let items = match self.eval_pipeline(over, dot, *line)? {
                        Value::List(items) => items,
                        Value::Map(map) => map.into_values().collect(),
                        other => {
                            return Err(TemplateError::Exec {
                                line: *line,
                                message: format!("range can't iterate over {}", other.kind()),
                            });
                        }
                    };
                    if items.is_empty() {
                        self.exec(otherwise, dot, out)?;
                    }
                    for item in &items {
                        self.exec(body, item, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_pipeline(&self, pipe: &Pipeline, dot: &Value, line: usize) -> Result<Value, TemplateError> {
        let mut piped = None;
        for command in &pipe.commands {
            piped = Some(self.eval_command(command, dot, piped.take(), line)?);
        }
        piped.ok_or_else(|| TemplateError::Syntax {
            line,
            message: "empty pipeline".to_string(),
        })
    }

    fn eval_command(
        &self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
        line: usize,
    ) -> Result<Value, TemplateError> {
        let Some((first, rest)) = command.operands.split_first() else {
            return Err(TemplateError::Syntax {
                line,
                message: "empty command".to_string(),
            });
        };

        if let Operand::Func(name) = first {
            let mut args = rest
                .iter()
                .map(|operand| self.eval_operand(operand, dot, line))
                .collect::<Result<Vec<_>, _>>()?;
            args.extend(piped);
            return functions::call(name, self.ctx, args, line);
        }

        if !rest.is_empty() || piped.is_some() {
            return Err(TemplateError::Exec {
                line,
                message: "can't give argument to non-function".to_string(),
            });
        }
        self.eval_operand(first, dot, line)
    }

    fn eval_operand(&self, operand: &Operand, dot: &Value, line: usize) -> Result<Value, TemplateError> {
        match operand {
            Operand::Func(name) => functions::call(name, self.ctx, Vec::new(), line),
            Operand::Field(path) => self.walk(dot.clone(), path, line),
            Operand::Var(path) => self.walk(Value::Root, path, line),
            Operand::Str(s) => Ok(Value::Str(s.clone())),
            Operand::Int(n) => Ok(Value::Int(*n)),
            Operand::Bool(b) => Ok(Value::Bool(*b)),
            Operand::Sub(pipe) => self.eval_pipeline(pipe, dot, line),
        }
    }

    fn walk(&self, start: Value, path: &[String], line: usize) -> Result<Value, TemplateError> {
        let mut value = start;
        for name in path {
            value = self.field(value, name, line)?;
        }
        Ok(value)
    }

    fn field(&self, base: Value, name: &str, line: usize) -> Result<Value, TemplateError> {
        let missing = || TemplateError::MissingField {
            line,
            field: name.to_string(),
        };
        match base {
            Value::Root => self.root_field(name).ok_or_else(missing),
            Value::Map(mut map) => map.remove(name).ok_or_else(missing),
            other => Err(TemplateError::Exec {
                line,
                message: format!("can't evaluate field {name} in a {}", other.kind()),
            }),
        }
    }

    /// Descriptor fields, matched case-insensitively.
    fn root_field(&self, name: &str) -> Option<Value> {
        let d = self.ctx.descriptor;
        let value = match name.to_ascii_lowercase().as_str() {
            "version" => Value::Str(d.version.clone()),
            "build" | "buildnumber" => Value::Int(d.build),
            "builder" => Value::Str(d.builder.clone()),
            "builddependencies" => Value::strings(&d.build_dependencies),
            "sources" => Value::strings(&d.sources),
            "script" => Value::strings(&d.script),
            "packages" => Value::Map(
                d.packages
                    .iter()
                    .map(|(name, pkg)| {
                        let fields =
                            BTreeMap::from([("Dependencies".to_string(), Value::strings(&pkg.dependencies))]);
                        (name.clone(), Value::Map(fields))
                    })
                    .collect(),
            ),
            "data" => Value::Map(
                d.data
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from(value)))
                    .collect(),
            ),
            _ => return None,
        };
        Some(value)
    }
}

fn render_into(value: &Value, line: usize, out: &mut String) -> Result<(), TemplateError> {
    match value {
        Value::Str(s) => out.push_str(s),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::List(items) => {
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(' ');
                }
                render_into(item, line, out)?;
            }
        }
        Value::Map(_) | Value::Root => {
            return Err(TemplateError::Exec {
                line,
                message: format!("can't render a {}", value.kind()),
            });
        }
    }
    Ok(())
}
