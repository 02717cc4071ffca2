//! Language adapters: pure mapping from (language, code) to a launch recipe.
//!
//! The wrapper templates are fixed programs. User code is never spliced into
//! them textually; it is staged as a side file the wrapper reads at runtime,
//! so a payload containing the template's own delimiters cannot escape its
//! execution slot. Each wrapper runs the payload as the body of a single
//! async function, silences the payload's own print/console output, and
//! emits exactly one sentinel-prefixed JSON envelope on stdout.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    JavaScript,
    Python,
}

impl Language {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "javascript" => Some(Self::JavaScript),
            "python" => Some(Self::Python),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
        }
    }
}

/// Everything the lifecycle driver needs to provision one sandbox. Built
/// once per request, immutable afterwards. `BindMount::host_file` names a
/// staged file and is resolved against the request's staging directory.
#[derive(Debug, Clone)]
pub struct LaunchRecipe {
    pub image: &'static str,
    pub entry_command: Vec<String>,
    pub working_dir: &'static str,
    pub files: Vec<StagedFile>,
    pub mounts: Vec<BindMount>,
}

#[derive(Debug, Clone)]
pub struct StagedFile {
    pub name: &'static str,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct BindMount {
    pub host_file: &'static str,
    pub container_path: &'static str,
    pub read_only: bool,
}

pub fn build_recipe(language: Language, code: &str) -> LaunchRecipe {
    match language {
        Language::JavaScript => LaunchRecipe {
            image: "node:22-alpine",
            entry_command: vec!["node".to_string(), "/code/wrapper.mjs".to_string()],
            working_dir: "/code",
            files: vec![
                StagedFile {
                    name: "wrapper.mjs",
                    content: JS_WRAPPER.to_string(),
                },
                StagedFile {
                    name: "user_code.mjs",
                    content: code.to_string(),
                },
            ],
            mounts: vec![
                BindMount {
                    host_file: "wrapper.mjs",
                    container_path: "/code/wrapper.mjs",
                    read_only: true,
                },
                BindMount {
                    host_file: "user_code.mjs",
                    container_path: "/code/user_code.mjs",
                    read_only: true,
                },
            ],
        },
        Language::Python => LaunchRecipe {
            image: "python:3.12-alpine",
            entry_command: vec!["python3".to_string(), "/code/wrapper.py".to_string()],
            working_dir: "/code",
            files: vec![
                StagedFile {
                    name: "wrapper.py",
                    content: PY_WRAPPER.to_string(),
                },
                StagedFile {
                    name: "user_code.py",
                    content: code.to_string(),
                },
            ],
            mounts: vec![
                BindMount {
                    host_file: "wrapper.py",
                    container_path: "/code/wrapper.py",
                    read_only: true,
                },
                BindMount {
                    host_file: "user_code.py",
                    container_path: "/code/user_code.py",
                    read_only: true,
                },
            ],
        },
    }
}

const JS_WRAPPER: &str = r#"import { readFileSync } from 'node:fs';

const SENTINEL = '__EXECBOX_RESULT__';
const USER_CODE_PATH = '/code/user_code.mjs';

const emit = (payload) => {
  process.stdout.write('\n' + SENTINEL + JSON.stringify(payload) + '\n');
};

const AsyncFunction = async function () {}.constructor;

const silence = () => {};
for (const level of ['log', 'info', 'warn', 'error', 'debug', 'trace']) {
  console[level] = silence;
}

try {
  const source = readFileSync(USER_CODE_PATH, 'utf8');
  const userMain = new AsyncFunction(source);
  const value = await userMain();
  emit({ result: value === undefined ? '' : String(value) });
} catch (err) {
  emit({ error: err instanceof Error ? err.message : String(err) });
}
"#;

const PY_WRAPPER: &str = r#"import ast
import asyncio
import io
import json
import sys

SENTINEL = "__EXECBOX_RESULT__"
USER_CODE_PATH = "/code/user_code.py"


def emit(payload):
    out = sys.__stdout__
    out.write("\n" + SENTINEL + json.dumps(payload) + "\n")
    out.flush()


def build_user_main(source):
    shell = ast.parse("async def __user_main__():\n    pass")
    try:
        body = ast.parse(source).body
    except SyntaxError:
        # A top-level `return` only parses inside a function body; reparse
        # the source indented under the shell definition instead.
        indented = "".join("    " + line for line in source.splitlines(keepends=True))
        shell = ast.parse("async def __user_main__():\n" + (indented or "    pass"))
        return compile(shell, "<user_code>", "exec")
    if body and isinstance(body[-1], ast.Expr):
        body[-1] = ast.Return(value=body[-1].value)
    shell.body[0].body = body or [ast.Pass()]
    ast.fix_missing_locations(shell)
    return compile(shell, "<user_code>", "exec")


def main():
    try:
        with open(USER_CODE_PATH, "r", encoding="utf-8") as handle:
            source = handle.read()
        code = build_user_main(source)
        sys.stdout = io.StringIO()
        sys.stderr = io.StringIO()
        scope = {}
        exec(code, scope)
        value = asyncio.run(scope["__user_main__"]())
        emit({"result": "" if value is None else str(value)})
    except BaseException as exc:
        emit({"error": str(exc) or type(exc).__name__})


main()
"#;
