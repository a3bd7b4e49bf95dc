//! Template expansion for descriptor `sources` and `script` lines.
//!
//! The language is the subset of Go's `text/template` that package
//! descriptors use: field lookups on the descriptor (`{{.Version}}`,
//! `{{.Data.configure}}`), pipelines, `if`/`range` blocks, and a fixed set
//! of builder functions (see [`functions`]).
//!
//! A line list is expanded as one document so that a function which emits
//! several lines (`make`, `extract`, `pkmv`, ...) simply produces more lines.

mod eval;
pub mod functions;
mod lexer;
mod parser;

use crate::descriptor::PackageSetDescriptor;
use crate::error::PackagingError;
use thiserror::Error;

/// Host and target architecture names (`x86_64`, `x86`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchPair {
    pub host: String,
    pub build: String,
}

impl ArchPair {
    pub fn new(host: impl Into<String>, build: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            build: build.into(),
        }
    }
}

/// Everything a template can see. Read-only.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub descriptor: &'a PackageSetDescriptor,
    pub host_arch: &'a str,
    pub build_arch: &'a str,
}

impl<'a> TemplateContext<'a> {
    pub fn new(descriptor: &'a PackageSetDescriptor, arch: &'a ArchPair) -> Self {
        Self {
            descriptor,
            host_arch: &arch.host,
            build_arch: &arch.build,
        }
    }

    /// Flags passed to `./configure`, from the `configure` data key.
    pub fn configure_flags(&self) -> Result<&'a [String], PackagingError> {
        match self.descriptor.data.get(functions::CONFIGURE_DATA_KEY) {
            Some(value) => value.as_list(functions::CONFIGURE_DATA_KEY),
            None => Ok(&[]),
        }
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("template line {line}: function \"{name}\" not defined")]
    UnknownFunction { line: usize, name: String },

    #[error("template line {line}: wrong number of args for {name}: want {want}, got {got}")]
    Arity {
        line: usize,
        name: String,
        want: String,
        got: usize,
    },

    #[error("template line {line}: missing field '{field}'")]
    MissingField { line: usize, field: String },

    #[error("template line {line}: {message}")]
    Exec { line: usize, message: String },

    #[error("template line {line}: {source}")]
    Data {
        line: usize,
        #[source]
        source: PackagingError,
    },
}

/// Render a whole template document.
pub fn render(source: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
    let items = lexer::lex(source)?;
    let nodes = parser::parse(items)?;
    let mut out = String::new();
    eval::Evaluator::new(ctx).exec(&nodes, &eval::Value::Root, &mut out)?;
    Ok(out)
}

/// Expand a list of lines as one document and split the result back into lines.
///
/// A single trailing empty line left by a trailing newline is dropped.
pub fn expand_lines(lines: &[String], ctx: &TemplateContext<'_>) -> Result<Vec<String>, TemplateError> {
    let rendered = render(&lines.join("\n"), ctx)?;
    let mut out: Vec<String> = rendered.split('\n').map(str::to_string).collect();
    if out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::tests::{arch, descriptor};

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    fn expand(yaml: &str, src: &[&str]) -> Result<Vec<String>, TemplateError> {
        let d = descriptor(yaml);
        let arch = arch();
        expand_lines(&lines(src), &TemplateContext::new(&d, &arch))
    }

    #[test]
    fn plain_lines_pass_through() {
        let out = expand("", &["echo one", "", "echo two"]).unwrap();
        assert_eq!(out, ["echo one", "", "echo two"]);
    }

    #[test]
    fn empty_input_yields_no_lines() {
        assert!(expand("", &[]).unwrap().is_empty());
    }

    #[test]
    fn single_trailing_blank_line_is_trimmed() {
        let out = expand("", &["a", "", ""]).unwrap();
        assert_eq!(out, ["a", ""]);
    }

    #[test]
    fn multi_line_functions_split_into_lines() {
        let out = expand(
            "version: '1.3'\n",
            &["{{extract \"zlib\" \"gz\"}}", "{{make \"zlib\" \"all\" \"install\"}}"],
        )
        .unwrap();
        assert_eq!(
            out,
            [
                "tar -xf src/zlib-1.3.tar.gz",
                "mv zlib-1.3 zlib",
                "$(MAKE) -C zlib all",
                "$(MAKE) -C zlib install",
            ]
        );
    }

    #[test]
    fn expansion_is_deterministic() {
        let yaml = "version: '9'\ndata:\n  configure: [--a, --b]\n";
        let src = ["{{configure \"x\"}}", "{{range .Data.configure}}{{.}};{{end}}"];
        assert_eq!(expand(yaml, &src).unwrap(), expand(yaml, &src).unwrap());
    }

    #[test]
    fn fields_pipelines_and_blocks() {
        let yaml = "version: '2.1'\nbuild: 4\nbuilder: alpine\n\
                    packages:\n  foo:\n    dependencies: [bar]\n\
                    data:\n  opts:\n    debug: 'yes'\n  list: [x, y]\n";
        let out = expand(
            yaml,
            &[
                "v={{.Version}} b={{.build}} builder={{$.Builder}}",
                "{{if .Data.opts.debug}}debug{{else}}release{{end}}",
                "{{range .Data.list}}[{{.}}]{{else}}none{{end}}",
                "deps={{.Packages.foo.Dependencies}}",
                "{{- /* comment */ -}}",
                "arch={{hostarch}}/{{buildarch | printarch}}",
            ],
        );
        // printarch does not exist
        assert!(matches!(out, Err(TemplateError::UnknownFunction { line: 6, .. })));

        let out = expand(
            yaml,
            &[
                "v={{.Version}} b={{.build}} builder={{$.Builder}}",
                "{{if .Data.opts.debug}}debug{{else}}release{{end}}",
                "{{range .Data.list}}[{{.}}]{{else}}none{{end}}",
                "deps={{.Packages.foo.Dependencies}}",
                "arch={{hostarch}}/{{(buildarch)}}",
            ],
        )
        .unwrap();
        assert_eq!(
            out,
            [
                "v=2.1 b=4 builder=alpine",
                "debug",
                "[x][y]",
                "deps=bar",
                "arch=x86_64/x86_64",
            ]
        );
    }

    #[test]
    fn trim_markers_join_lines() {
        let out = expand("", &["a", "{{- \"b\" -}}", "c"]).unwrap();
        assert_eq!(out, ["abc"]);
    }

    #[test]
    fn else_if_chains() {
        let yaml = "data:\n  mode: ''\n  other: set\n";
        let out = expand(
            yaml,
            &["{{if .Data.mode}}mode{{else if .Data.other}}other{{else}}none{{end}}"],
        )
        .unwrap();
        assert_eq!(out, ["other"]);
    }

    #[test]
    fn missing_data_key_is_fatal() {
        let err = expand("", &["ok", "{{.Data.nothing}}"]).unwrap_err();
        assert!(matches!(err, TemplateError::MissingField { line: 2, .. }));
    }

    #[test]
    fn malformed_syntax_is_fatal() {
        assert!(matches!(
            expand("", &["{{if .Version}}unterminated"]),
            Err(TemplateError::Syntax { .. })
        ));
        assert!(matches!(
            expand("", &["{{\"open"]),
            Err(TemplateError::Syntax { .. })
        ));
        assert!(matches!(
            expand("", &["{{end}}"]),
            Err(TemplateError::Syntax { .. })
        ));
    }

    #[test]
    fn configure_mismatch_names_the_key() {
        let err = expand("data:\n  configure: --prefix=/usr\n", &["{{configure \"x\"}}"]).unwrap_err();
        match err {
            TemplateError::Data { line, source } => {
                assert_eq!(line, 1);
                assert!(matches!(
                    source,
                    PackagingError::DataBagTypeMismatch { ref key, .. } if key == "configure"
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rendering_a_mapping_is_an_error() {
        assert!(matches!(
            expand("data:\n  m:\n    k: v\n", &["{{.Data.m}}"]),
            Err(TemplateError::Exec { .. })
        ));
    }
}
