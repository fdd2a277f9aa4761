//! Unused-variable elimination.
//!
//! A `let` local that is never read loses its binding and every plain or compound assignment
//! to it. Side-effecting initializers and right-hand sides stay behind as expression
//! statements. Removing one local can orphan another, so the orchestrator repeats this with a
//! fresh model until a round removes nothing.

use std::collections::HashSet;

use syn::{
    fold::{self, Fold},
    Block, Expr, File, Pat, Stmt,
};

use super::{expr_stmt, is_assignment, is_pure, Rewrite};
use crate::front::{Access, SemanticModel, SymbolId, SymbolKind};

/// `let` locals of the focus unit that are never read.
pub fn unused_locals(model: &SemanticModel) -> HashSet<SymbolId> {
    let read: HashSet<SymbolId> = model
        .references()
        .iter()
        .filter(|reference| reference.access == Access::Read)
        .map(|reference| reference.symbol)
        .collect();
    model
        .symbols()
        .filter(|(id, symbol)| {
            matches!(symbol.kind, SymbolKind::Local { .. })
                && !symbol.name.starts_with('_')
                && !read.contains(id)
        })
        .map(|(id, _)| id)
        .collect()
}

pub fn remove_unused(file: &File, model: &SemanticModel) -> Rewrite {
    let unused = unused_locals(model);
    if unused.is_empty() {
        return Rewrite::unchanged(file);
    }
    let mut remover = Remover {
        model,
        unused,
        removed: 0,
    };
    let file = remover.fold_file(file.clone());
    tracing::debug!(removed = remover.removed, "unused variables");
    Rewrite::new(file, remover.removed > 0)
}

struct Remover<'a> {
    model: &'a SemanticModel,
    unused: HashSet<SymbolId>,
    removed: usize,
}

impl Remover<'_> {
    fn is_unused(&self, ident: &syn::Ident) -> bool {
        self.model
            .resolve_ident(ident)
            .is_some_and(|id| self.unused.contains(&id))
    }

    /// Left-hand side naming an unused local.
    fn is_dead_target(&self, target: &Expr) -> bool {
        match target {
            Expr::Path(path) if path.qself.is_none() => path
                .path
                .get_ident()
                .is_some_and(|ident| self.is_unused(ident)),
            Expr::Paren(paren) => self.is_dead_target(&paren.expr),
            _ => false,
        }
    }

    /// What remains of a statement dropping `value`: nothing, or its side effects.
    fn leftover(&mut self, value: Expr) -> Option<Stmt> {
        self.removed += 1;
        (!is_pure(&value)).then(|| expr_stmt(value))
    }

    fn reduce(&mut self, stmt: Stmt) -> Option<Stmt> {
        match stmt {
            Stmt::Local(mut local) => {
                local.pat = self.wildcard(local.pat);
                if !is_wild(&local.pat) {
                    return Some(Stmt::Local(local));
                }
                match local.init {
                    Some(init) if init.diverge.is_some() => {
                        local.init = Some(init);
                        Some(Stmt::Local(local))
                    }
                    Some(init) => self.leftover(*init.expr),
                    None => {
                        self.removed += 1;
                        None
                    }
                }
            }
            Stmt::Expr(Expr::Assign(assign), semi) => {
                if self.is_dead_target(&assign.left) {
                    self.leftover(*assign.right)
                } else {
                    Some(Stmt::Expr(Expr::Assign(assign), semi))
                }
            }
            Stmt::Expr(Expr::Binary(binary), semi) if is_assignment(&binary.op) => {
                if self.is_dead_target(&binary.left) {
                    self.leftover(*binary.right)
                } else {
                    Some(Stmt::Expr(Expr::Binary(binary), semi))
                }
            }
            other => Some(other),
        }
    }

    /// Replaces unused bindings inside a pattern with `_`.
    fn wildcard(&self, pat: Pat) -> Pat {
        match pat {
            Pat::Ident(ident) if ident.subpat.is_none() && self.is_unused(&ident.ident) => {
                Pat::Wild(syn::PatWild {
                    attrs: ident.attrs,
                    underscore_token: Default::default(),
                })
            }
            Pat::Type(mut typed) => {
                typed.pat = Box::new(self.wildcard(*typed.pat));
                Pat::Type(typed)
            }
            Pat::Tuple(mut tuple) => {
                let elems = std::mem::take(&mut tuple.elems);
                tuple.elems = elems.into_iter().map(|elem| self.wildcard(elem)).collect();
                Pat::Tuple(tuple)
            }
            Pat::Paren(mut paren) => {
                paren.pat = Box::new(self.wildcard(*paren.pat));
                Pat::Paren(paren)
            }
            other => other,
        }
    }
}

fn is_wild(pat: &Pat) -> bool {
    match pat {
        Pat::Wild(_) => true,
        Pat::Type(typed) => is_wild(&typed.pat),
        Pat::Paren(paren) => is_wild(&paren.pat),
        _ => false,
    }
}

fn count_wilds(pat: &Pat) -> usize {
    match pat {
        Pat::Wild(_) => 1,
        Pat::Type(typed) => count_wilds(&typed.pat),
        Pat::Paren(paren) => count_wilds(&paren.pat),
        Pat::Tuple(tuple) => tuple.elems.iter().map(count_wilds).sum(),
        _ => 0,
    }
}

impl Fold for Remover<'_> {
    fn fold_block(&mut self, block: Block) -> Block {
        let mut stmts = Vec::with_capacity(block.stmts.len());
        for stmt in block.stmts {
            let stmt = fold::fold_stmt(self, stmt);
            let wilds = match &stmt {
                Stmt::Local(local) => count_wilds(&local.pat),
                _ => 0,
            };
            let reduced = self.reduce(stmt);
            if let Some(Stmt::Local(local)) = &reduced {
                // Bindings inside a tuple pattern turned into `_`.
                if count_wilds(&local.pat) > wilds {
                    self.removed += 1;
                }
            }
            stmts.extend(reduced);
        }
        Block {
            brace_token: block.brace_token,
            stmts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::{render, Compilation, SourceText};

    fn fixpoint(text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..16 {
            let compilation = Compilation::from_sources(&[SourceText::new("t", &current)]).unwrap();
            let model = compilation.bind("t").unwrap();
            let out = remove_unused(&compilation.tree("t").unwrap().file, &model);
            current = render(&out.file);
            if !out.changed {
                break;
            }
        }
        current
    }

    #[test]
    fn test_chains_of_unused_locals_disappear() {
        let text = fixpoint(
            r#"
            fn f(input: u32) -> u32 {
                let a = input + 1;
                let b = a * 2;
                let mut c = 0;
                c += b;
                input
            }
            "#,
        );
        assert_eq!(text, "fn f(input: u32) -> u32 {\n    input\n}\n");
    }

    #[test]
    fn test_side_effects_are_kept() {
        let text = fixpoint(
            r#"
            fn f() {
                let mut x = compute();
                x = compute();
                let _kept = 1;
                let (used, unused) = pair();
                g(used);
            }
            fn compute() -> u8 { 0 }
            fn pair() -> (u8, u8) { (0, 0) }
            fn g(_: u8) {}
            "#,
        );
        assert!(text.contains("fn f() {\n    compute();\n    compute();\n    let _kept = 1;\n"), "{text}");
        assert!(text.contains("let (used, _) = pair();"), "{text}");
    }

    #[test]
    fn test_read_locals_survive() {
        let source = "fn f() -> u8 { let x = 1; let y = x; println!(\"{y}\"); x }";
        let compilation = Compilation::from_sources(&[SourceText::new("t", source)]).unwrap();
        let model = compilation.bind("t").unwrap();
        assert!(unused_locals(&model).is_empty());
    }
}
