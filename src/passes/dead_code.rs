//! Dead-code elimination.
//!
//! One application folds every branch whose condition the model can evaluate:
//!
//! ```text
//! if true { a(); } else { b(); }   ->  a();
//! if false { a(); }                ->  (removed)
//! while false { .. }               ->  (removed)
//! false && x    true || x          ->  false    true
//! { a(); b(); }                    ->  a(); b();      (no bindings inside)
//! ```
//!
//! The orchestrator repeats it until nothing changes.

use syn::{
    fold::{self, Fold},
    BinOp, Block, Expr, ExprBlock, ExprLit, File, Lit, LitBool, Stmt, UnOp,
};

use super::{is_pure, splice, Rewrite};
use crate::front::SemanticModel;

pub fn eliminate(file: &File, model: &SemanticModel) -> Rewrite {
    let mut eliminator = Eliminator { model, changes: 0 };
    let file = eliminator.fold_file(file.clone());
    tracing::trace!(changes = eliminator.changes, "dead-code elimination");
    Rewrite::new(file, eliminator.changes > 0)
}

struct Eliminator<'a> {
    model: &'a SemanticModel,
    changes: usize,
}

fn block_expr(block: Block) -> Expr {
    Expr::Block(ExprBlock {
        attrs: Vec::new(),
        label: None,
        block,
    })
}

fn empty_block() -> Expr {
    block_expr(Block {
        brace_token: Default::default(),
        stmts: Vec::new(),
    })
}

fn bool_lit(value: bool) -> Expr {
    Expr::Lit(ExprLit {
        attrs: Vec::new(),
        lit: Lit::Bool(LitBool::new(value, proc_macro2::Span::call_site())),
    })
}

fn literal_bool(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Bool(b), ..
        }) => Some(b.value),
        Expr::Paren(inner) => literal_bool(&inner.expr),
        Expr::Group(inner) => literal_bool(&inner.expr),
        _ => None,
    }
}

/// A block whose statements can be spliced into the enclosing one without changing scoping.
fn binding_free(block: &Block) -> bool {
    block
        .stmts
        .iter()
        .all(|stmt| !matches!(stmt, Stmt::Local(_) | Stmt::Item(_)))
}

fn is_plain(block: &ExprBlock) -> bool {
    block.attrs.is_empty() && block.label.is_none()
}

impl Eliminator<'_> {
    fn condition(&self, expr: &Expr) -> Option<bool> {
        literal_bool(expr).or_else(|| self.model.eval(expr)?.as_bool())
    }

    fn reduce_if(&mut self, mut expr: syn::ExprIf) -> Expr {
        match self.condition(&expr.cond) {
            Some(true) => {
                self.changes += 1;
                block_expr(expr.then_branch)
            }
            Some(false) => {
                self.changes += 1;
                match expr.else_branch {
                    Some((_, otherwise)) => *otherwise,
                    None => empty_block(),
                }
            }
            None => {
                let empty_else = matches!(
                    expr.else_branch.as_ref().map(|(_, e)| &**e),
                    Some(Expr::Block(b)) if is_plain(b) && b.block.stmts.is_empty()
                );
                if empty_else {
                    expr.else_branch = None;
                    self.changes += 1;
                }
                if expr.then_branch.stmts.is_empty() && expr.else_branch.is_none() && is_pure(&expr.cond) {
                    self.changes += 1;
                    return empty_block();
                }
                Expr::If(expr)
            }
        }
    }

    fn reduce_logic(&mut self, expr: syn::ExprBinary) -> Expr {
        let left = self.condition(&expr.left);
        let right = self.condition(&expr.right);
        let and = match expr.op {
            BinOp::And(_) => true,
            BinOp::Or(_) => false,
            _ => return Expr::Binary(expr),
        };
        // `x && true` is `x`; `x && false` is `false` only when `x` has no effects.
        let reduced = match (and, left, right) {
            (true, Some(true), _) | (false, Some(false), _) => *expr.right,
            (true, _, Some(true)) | (false, _, Some(false)) => *expr.left,
            (_, Some(value), _) => bool_lit(value),
            (_, _, Some(value)) if is_pure(&expr.left) => bool_lit(value),
            _ => return Expr::Binary(expr),
        };
        self.changes += 1;
        reduced
    }
}

impl Fold for Eliminator<'_> {
    fn fold_expr(&mut self, expr: Expr) -> Expr {
        match fold::fold_expr(self, expr) {
            Expr::If(if_expr) => self.reduce_if(if_expr),
            Expr::While(w) if w.label.is_none() && self.condition(&w.cond) == Some(false) => {
                self.changes += 1;
                empty_block()
            }
            Expr::Unary(unary) if matches!(unary.op, UnOp::Not(_)) => match self.condition(&unary.expr) {
                Some(value) => {
                    self.changes += 1;
                    bool_lit(!value)
                }
                None => Expr::Unary(unary),
            },
            Expr::Binary(binary) if matches!(binary.op, BinOp::And(_) | BinOp::Or(_)) => {
                self.reduce_logic(binary)
            }
            other => other,
        }
    }

    fn fold_local(&mut self, local: syn::Local) -> syn::Local {
        let mut local = fold::fold_local(self, local);
        if let Some(init) = &mut local.init {
            let lone = match &*init.expr {
                Expr::Block(block) if is_plain(block) && init.diverge.is_none() => {
                    match block.block.stmts.as_slice() {
                        [Stmt::Expr(inner, None)] => Some(inner.clone()),
                        _ => None,
                    }
                }
                _ => None,
            };
            if let Some(inner) = lone {
                *init.expr = inner;
                self.changes += 1;
            }
        }
        local
    }

    fn fold_block(&mut self, block: Block) -> Block {
        let len = block.stmts.len();
        let mut stmts = Vec::with_capacity(len);
        for (i, stmt) in block.stmts.into_iter().enumerate() {
            let is_last = i + 1 == len;
            match self.fold_stmt(stmt) {
                Stmt::Expr(Expr::Block(inner), semi) if is_plain(&inner) => {
                    if inner.block.stmts.is_empty() {
                        self.changes += 1;
                    } else if binding_free(&inner.block) {
                        self.changes += 1;
                        stmts.extend(splice(inner.block.stmts, is_last && semi.is_none()));
                    } else {
                        stmts.push(Stmt::Expr(Expr::Block(inner), semi));
                    }
                }
                other => stmts.push(other),
            }
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

    fn run(text: &str) -> (String, bool) {
        let compilation = Compilation::from_sources(&[SourceText::new("t", text)]).unwrap();
        let model = compilation.bind("t").unwrap();
        let out = eliminate(&compilation.tree("t").unwrap().file, &model);
        (render(&out.file), out.changed)
    }

    fn fixpoint(text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..16 {
            let (next, changed) = run(&current);
            current = next;
            if !changed {
                break;
            }
        }
        current
    }

    #[test]
    fn test_false_branch_reduces_to_else_body() {
        let text = fixpoint("fn f() { if false { a(); } else { b(); } }\nfn a() {}\nfn b() {}");
        assert!(text.starts_with("fn f() {\n    b();\n}\n"), "{text}");
    }

    #[test]
    fn test_constant_conditions_through_consts() {
        let text = fixpoint(
            r#"
            const LIMIT: u32 = 4;
            fn f(x: u32) -> u32 {
                while LIMIT < 2 { g(); }
                if LIMIT > 3 && x > 1 { return x; }
                let y = if !true { 1 } else { 2 };
                if x > 0 {} else {}
                y
            }
            fn g() {}
            "#,
        );
        assert!(!text.contains("while"));
        assert!(text.contains("if x > 1 {\n        return x;\n    }"), "{text}");
        assert!(text.contains("let y = 2;"), "{text}");
        assert!(!text.contains("if x > 0"));
    }

    #[test]
    fn test_scoped_blocks_are_kept() {
        let text = fixpoint("fn f() { if true { let x = 1; g(x); } }\nfn g(_: u8) {}");
        assert!(text.contains("{\n        let x = 1;\n        g(x);\n    }"), "{text}");
    }

    #[test]
    fn test_short_circuit_literals() {
        let (text, changed) = run(
            r#"
            fn f(c: bool) -> bool {
                let a = c && true;
                let b = false || c;
                let d = c && false;
                let e = g() && false;
                let k = true || g();
                a && b && d && e && k
            }
            fn g() -> bool { true }
            "#,
        );
        assert!(changed);
        assert!(text.contains("let a = c;"), "{text}");
        assert!(text.contains("let b = c;"));
        assert!(text.contains("let d = false;"));
        assert!(text.contains("let e = g() && false;"));
        assert!(text.contains("let k = true;"));
        assert!(text.contains("a && b && d && e && k"));
    }

    #[test]
    fn test_fixpoint_is_idempotent() {
        let once = fixpoint("fn f(c: bool) { if c || false { if true { h(); } } { } }\nfn h() {}");
        assert!(once.contains("if c {\n        h();\n    }"), "{once}");
        let (again, changed) = run(&once);
        assert!(!changed);
        assert_eq!(again, once);
    }
}
