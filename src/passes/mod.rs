//! Rewrite passes
//!
//! Every pass takes the current tree (and, for semantic passes, the model bound against it)
//! and returns a new tree together with whether anything changed. Passes never touch the
//! compilation; the orchestrator decides when to rebind.
//!
//! | Pass | Kind | Module |
//! |------|------|--------|
//! | identifier renamer | syntactic | [`rename`] |
//! | facet selector | syntactic | [`select`] |
//! | numeric width adjusters | syntactic | [`width`] |
//! | constant substitution | semantic | [`constants`] |
//! | dead-code elimination | semantic | [`dead_code`] |
//! | broken-statement remover | diagnostic-driven | [`broken`] |
//! | unused-variable elimination | semantic | [`unused`] |
//! | storage-indirection eliminator | semantic | [`indirection`] |
//! | entry-type melder | syntactic | [`meld`] |
//! | annotation stripper | syntactic | [`strip`] |
//! | documentation propagator | semantic | [`docs`] |

pub mod broken;
pub mod constants;
pub mod dead_code;
pub mod docs;
pub mod indirection;
pub mod meld;
pub mod rename;
pub mod select;
pub mod strip;
pub mod unused;
pub mod width;

use proc_macro2::TokenTree;
use quote::ToTokens;
use syn::{Expr, File, Stmt};

use crate::front::Location;

/// Output of one pass application.
#[derive(Clone, Debug)]
pub struct Rewrite {
    pub file: File,
    pub changed: bool,
}

impl Rewrite {
    pub fn new(file: File, changed: bool) -> Self {
        Rewrite { file, changed }
    }

    pub fn unchanged(file: &File) -> Self {
        Rewrite {
            file: file.clone(),
            changed: false,
        }
    }
}

// =============================================================================
// Source ranges
// =============================================================================

/// First and last position covered by the tokens of `node`.
pub(crate) fn token_range(node: &impl ToTokens) -> Option<(Location, Location)> {
    let tokens: Vec<TokenTree> = node.to_token_stream().into_iter().collect();
    let first = tokens.first()?;
    let last = tokens.last()?;
    Some((Location::of(first.span()), Location::end_of(last.span())))
}

pub(crate) fn covers(range: (Location, Location), location: Location) -> bool {
    range.0 <= location && location <= range.1
}

// =============================================================================
// Expression helpers
// =============================================================================

/// Side-effect free: evaluating and discarding it changes nothing.
pub(crate) fn is_pure(expr: &Expr) -> bool {
    match expr {
        Expr::Lit(_) | Expr::Path(_) => true,
        Expr::Paren(inner) => is_pure(&inner.expr),
        Expr::Group(inner) => is_pure(&inner.expr),
        Expr::Field(field) => is_pure(&field.base),
        Expr::Reference(reference) => is_pure(&reference.expr),
        Expr::Cast(cast) => is_pure(&cast.expr),
        Expr::Unary(unary) => is_pure(&unary.expr),
        Expr::Binary(binary) => {
            !is_assignment(&binary.op) && is_pure(&binary.left) && is_pure(&binary.right)
        }
        Expr::Tuple(tuple) => tuple.elems.iter().all(is_pure),
        Expr::Array(array) => array.elems.iter().all(is_pure),
        Expr::Block(block) => block.block.stmts.is_empty(),
        _ => false,
    }
}

pub(crate) fn is_assignment(op: &syn::BinOp) -> bool {
    use syn::BinOp::*;
    matches!(
        op,
        AddAssign(_)
            | SubAssign(_)
            | MulAssign(_)
            | DivAssign(_)
            | RemAssign(_)
            | BitXorAssign(_)
            | BitAndAssign(_)
            | BitOrAssign(_)
            | ShlAssign(_)
            | ShrAssign(_)
    )
}

/// Expression statement that discards `expr`.
pub(crate) fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(expr, Some(Default::default()))
}

/// Blocks and other brace-terminated expressions need no `;` in statement position.
pub(crate) fn is_block_like(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Block(_)
            | Expr::If(_)
            | Expr::Match(_)
            | Expr::While(_)
            | Expr::Loop(_)
            | Expr::ForLoop(_)
            | Expr::Unsafe(_)
            | Expr::Const(_)
            | Expr::TryBlock(_)
    )
}

/// Splices `stmts` in place of a statement. Unless the statement was the tail of its block,
/// a trailing value expression gets a `;`.
pub(crate) fn splice(stmts: Vec<Stmt>, is_tail: bool) -> Vec<Stmt> {
    let len = stmts.len();
    stmts
        .into_iter()
        .enumerate()
        .map(|(i, stmt)| match stmt {
            Stmt::Expr(expr, None) if (i + 1 < len || !is_tail) && !is_block_like(&expr) => {
                expr_stmt(expr)
            }
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_purity() {
        let pure: Expr = parse_quote!(!(self.count > 0) && LIMIT == 3);
        assert!(is_pure(&pure));
        let call: Expr = parse_quote!(self.count > compute());
        assert!(!is_pure(&call));
        let assign: Expr = parse_quote!(x += 1);
        assert!(!is_pure(&assign));
    }

    #[test]
    fn test_splice_terminates_values() {
        let block: syn::Block = parse_quote!({ a(); b() });
        let spliced = splice(block.stmts.clone(), false);
        assert!(matches!(spliced[1], Stmt::Expr(_, Some(_))));
        let spliced = splice(block.stmts, true);
        assert!(matches!(spliced[1], Stmt::Expr(_, None)));
    }

    #[test]
    fn test_token_range_spans_statement() {
        let file = syn::parse_file("fn f() {\n    let x = {\n        1\n    };\n}\n").unwrap();
        let syn::Item::Fn(f) = &file.items[0] else { panic!() };
        let (start, end) = token_range(&f.block.stmts[0]).unwrap();
        assert_eq!(start.line, 2);
        assert_eq!(end.line, 4);
        assert!(covers((start, end), Location::new(3, 8)));
        assert!(!covers((start, end), Location::new(5, 0)));
    }
}
