use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::frontend::ast::{dump, NodeId, Pool};
use crate::frontend::diagnostic::{format_diagnostic, CompileError, Diagnostics};
use crate::frontend::lexer::Lexer;
use crate::frontend::parser::Parser;
use crate::sema::{BuildParams, Resolver};

pub struct Checked {
    pub pool: Pool,
    pub root: NodeId,
}

impl Checked {
    pub fn dump(&self) -> String {
        dump(&self.pool, self.root)
    }
}

/// Reads, parses, and resolves one module plus its single-level imports.
/// Errors carry fully rendered diagnostics, ready to print.
pub fn check_file(path: &Path, params: &BuildParams) -> Result<Checked, CompileError> {
    let mut pool = Pool::new();
    let root = parse_into(&mut pool, path)?;

    let import_names = pool.module(root).import_names.clone();
    let dir = path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    for name in import_names {
        let import_path = dir.join(format!("{}.opal", name));
        let module = parse_into(&mut pool, &import_path)?;
        pool.module_mut(root).imports.push(module);
    }

    let mut resolver = Resolver::new(params.clone());
    match resolver.run(&mut pool, root) {
        Ok(()) => Ok(Checked { pool, root }),
        Err(()) => Err(CompileError::Resolve {
            rendered: render_diags(&resolver.diags, &pool),
            count: resolver.diags.len(),
        }),
    }
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))
}

fn parse_into(pool: &mut Pool, path: &Path) -> Result<NodeId, CompileError> {
    let source = read_text(path).map_err(CompileError::Read)?;
    let module_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();
    let file = pool.add_file(path.display().to_string(), source.clone());
    let tokens = Lexer::new(&source, file).lex_all();
    let (module, diags) = {
        let mut parser = Parser::new(tokens, pool, file);
        let module = parser.parse_module(&module_name);
        (module, parser.diags)
    };
    if !diags.is_empty() {
        let count = diags.len();
        let rendered = render_diags(&diags, pool);
        return Err(CompileError::Parse { rendered, count });
    }
    Ok(module)
}

pub fn render_diags(diags: &Diagnostics, pool: &Pool) -> String {
    diags
        .items
        .iter()
        .map(|d| format_diagnostic(d, pool))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::Node;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time drift")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "opal-{}-{}-{}",
            prefix,
            std::process::id(),
            nonce
        ))
    }

    #[test]
    fn imported_module_supplies_call_candidates() {
        let root = temp_dir("import");
        fs::create_dir_all(&root).expect("mkdir");
        fs::write(
            root.join("util.opal"),
            "helper: func (x: Int) -> Int { return x }\n",
        )
        .expect("write util");
        let main = root.join("main.opal");
        fs::write(&main, "import util\nmain: func {\n    x := helper(3)\n}\n")
            .expect("write main");

        let checked = check_file(&main, &BuildParams::default()).expect("check");
        let resolved = checked
            .pool
            .collect_subtree(checked.root)
            .into_iter()
            .any(|id| {
                matches!(
                    checked.pool.get(id),
                    Node::FunctionCall(c) if c.name == "helper" && c.ref_score > 0
                )
            });
        assert!(resolved, "call into the imported module did not resolve");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_import_fails_to_read() {
        let root = temp_dir("missing");
        fs::create_dir_all(&root).expect("mkdir");
        let main = root.join("main.opal");
        fs::write(&main, "import nowhere\nmain: func { }\n").expect("write main");

        match check_file(&main, &BuildParams::default()) {
            Err(CompileError::Read(e)) => {
                assert!(format!("{:#}", e).contains("nowhere.opal"));
            }
            other => panic!("expected read error, got ok={}", other.is_ok()),
        }

        let _ = fs::remove_dir_all(root);
    }
}
