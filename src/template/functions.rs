//! Builder functions available to descriptor templates.
//!
//! | Function | Expands to |
//! |---|---|
//! | `make dir action...` | one `$(MAKE) -C dir action` line per action |
//! | `extract name ext` | untar `src/name-VERSION.tar.ext`, rename to `name` |
//! | `pkmv file from to` | move `file` from `out/from` to `out/to` |
//! | `mvman pkg` | move `usr/share/man` from `pkg` into `pkg-man` |
//! | `configure dir` | `(cd dir && ./configure FLAGS)` with flags from `data.configure` |
//! | `confarch` | build arch, with `x86` spelled `i386` |
//! | `hostarch`, `buildarch` | the architectures as given |
//!
//! Paths in the generated lines are relative to the build directory that the
//! generated makefile runs in.

use super::eval::Value;
use super::{TemplateContext, TemplateError};

/// How generated lines invoke make recursively.
pub const MAKE_INVOCATION: &str = "$(MAKE)";

/// Data bag key holding `./configure` flags.
pub const CONFIGURE_DATA_KEY: &str = "configure";

/// Directory (relative to the build root) holding per-package output trees.
pub const OUTPUT_DIR: &str = "out";

/// Man pages split out by `mvman`.
pub const MAN_DIR: &str = "usr/share/man";

const BUILTINS: &[&str] = &[
    "make",
    "extract",
    "pkmv",
    "mvman",
    "configure",
    "confarch",
    "hostarch",
    "buildarch",
];

pub(crate) fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

pub fn make(dir: &str, actions: &[String]) -> String {
    actions
        .iter()
        .map(|action| format!("{MAKE_INVOCATION} -C {dir} {action}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn extract(name: &str, ext: &str, version: &str) -> String {
    format!("tar -xf src/{name}-{version}.tar.{ext}\nmv {name}-{version} {name}")
}

pub fn pkmv(file: &str, from: &str, to: &str) -> String {
    let file = file.trim_end_matches('/').trim_start_matches('/');
    let source = format!("{OUTPUT_DIR}/{from}/{file}");
    match file.rsplit_once('/') {
        Some((dir, _)) => {
            let dest_dir = format!("{OUTPUT_DIR}/{to}/{dir}");
            format!("mkdir -p {dest_dir}\nmv {source} {dest_dir}")
        }
        None => format!("mv {source} {OUTPUT_DIR}/{to}"),
    }
}

pub fn mvman(package: &str) -> String {
    pkmv(MAN_DIR, package, &format!("{package}-man"))
}

pub fn configure(dir: &str, flags: &[String]) -> String {
    if flags.is_empty() {
        format!("(cd {dir} && ./configure)")
    } else {
        format!("(cd {dir} && ./configure {})", flags.join(" "))
    }
}

/// GNU triplets call 32-bit x86 `i386`.
pub fn confarch(build_arch: &str) -> &str {
    if build_arch == "x86" {
        "i386"
    } else {
        build_arch
    }
}

pub(crate) fn call(
    name: &str,
    ctx: &TemplateContext<'_>,
    args: Vec<Value>,
    line: usize,
) -> Result<Value, TemplateError> {
    let args = args
        .into_iter()
        .map(|arg| scalar_arg(name, arg, line))
        .collect::<Result<Vec<_>, _>>()?;

    let arity = |want: &str| TemplateError::Arity {
        line,
        name: name.to_string(),
        want: want.to_string(),
        got: args.len(),
    };

    let out = match (name, args.as_slice()) {
        ("make", [dir, actions @ ..]) => make(dir, actions),
        ("make", _) => return Err(arity("at least 1")),
        ("extract", [pkg, ext]) => extract(pkg, ext, &ctx.descriptor.version),
        ("extract", _) => return Err(arity("2")),
        ("pkmv", [file, from, to]) => pkmv(file, from, to),
        ("pkmv", _) => return Err(arity("3")),
        ("mvman", [pkg]) => mvman(pkg),
        ("mvman", _) => return Err(arity("1")),
        ("configure", [dir]) => {
            let flags = ctx
                .configure_flags()
                .map_err(|source| TemplateError::Data { line, source })?;
            configure(dir, flags)
        }
        ("configure", _) => return Err(arity("1")),
        ("confarch", []) => confarch(ctx.build_arch).to_string(),
        ("hostarch", []) => ctx.host_arch.to_string(),
        ("buildarch", []) => ctx.build_arch.to_string(),
        ("confarch" | "hostarch" | "buildarch", _) => return Err(arity("0")),
        _ => {
            return Err(TemplateError::UnknownFunction {
                line,
                name: name.to_string(),
            });
        }
    };
    Ok(Value::Str(out))
}

fn scalar_arg(name: &str, arg: Value, line: usize) -> Result<String, TemplateError> {
    match arg {
        Value::Str(s) => Ok(s),
        Value::Int(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(TemplateError::Exec {
            line,
            message: format!("{name}: arguments must be scalars, got a {}", other.kind()),
        }),
    }
}
