//! Broken-statement remover.
//!
//! Facet reduction leaves statements that use members it dropped. Each transient diagnostic
//! (see [`Code::is_transient`](crate::front::Code::is_transient)) removes the innermost
//! statement containing it; anything else is left for the final checkpoint to reject.

use std::collections::BTreeSet;

use syn::{fold::Fold, Block, File};

use super::{token_range, Rewrite};
use crate::front::{Diagnostic, Location, SemanticModel};

pub fn remove_broken(file: &File, model: &SemanticModel) -> Rewrite {
    remove_at(file, model.errors().filter(|diag| diag.code.is_transient()))
}

/// Removes the innermost statement around each of `diagnostics`.
pub fn remove_at<'d>(file: &File, diagnostics: impl IntoIterator<Item = &'d Diagnostic>) -> Rewrite {
    let pending: BTreeSet<Location> = diagnostics.into_iter().map(|diag| diag.location).collect();
    if pending.is_empty() {
        return Rewrite::unchanged(file);
    }
    let mut remover = Remover {
        pending,
        removed: 0,
    };
    let file = remover.fold_file(file.clone());
    tracing::debug!(
        removed = remover.removed,
        unmatched = remover.pending.len(),
        "broken statements"
    );
    Rewrite::new(file, remover.removed > 0)
}

struct Remover {
    pending: BTreeSet<Location>,
    removed: usize,
}

impl Fold for Remover {
    fn fold_block(&mut self, block: Block) -> Block {
        let mut stmts = Vec::with_capacity(block.stmts.len());
        for stmt in block.stmts {
            let Some((start, end)) = token_range(&stmt) else {
                stmts.push(stmt);
                continue;
            };
            let hits: Vec<Location> = self.pending.range(start..=end).copied().collect();
            if hits.is_empty() {
                stmts.push(stmt);
                continue;
            }
            // Nested blocks claim their diagnostics first.
            let stmt = self.fold_stmt(stmt);
            if hits.iter().any(|hit| self.pending.contains(hit)) {
                for hit in &hits {
                    self.pending.remove(hit);
                }
                self.removed += 1;
                continue;
            }
            stmts.push(stmt);
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

    fn run(text: &str) -> String {
        let compilation = Compilation::from_sources(&[SourceText::new("t", text)]).unwrap();
        let model = compilation.bind("t").unwrap();
        render(&remove_broken(&compilation.tree("t").unwrap().file, &model).file)
    }

    #[test]
    fn test_innermost_statement_goes() {
        let text = run(r#"
            struct Tree { count: usize }
            impl Tree {
                fn update(&mut self, grow: bool) {
                    if grow {
                        self.count += 1;
                        self.rank += 1;
                    }
                    self.refresh_rank();
                    let total = self.count;
                }
            }
        "#);
        assert!(text.contains("if grow {\n            self.count += 1;\n        }"), "{text}");
        assert!(!text.contains("rank"));
        assert!(text.contains("let total = self.count;"));
    }

    #[test]
    fn test_non_transient_codes_are_not_consumed() {
        let source = r#"
            trait Shape { fn area(&self) -> u32; }
            struct Square;
            impl Shape for Square {}
            fn f() { let s = Square; }
        "#;
        let compilation = Compilation::from_sources(&[SourceText::new("t", source)]).unwrap();
        let model = compilation.bind("t").unwrap();
        assert!(model.errors().any(|diag| diag.code.as_str() == "E0046"));
        assert!(!remove_broken(&compilation.tree("t").unwrap().file, &model).changed);
    }
}
