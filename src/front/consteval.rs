//! Constant evaluation over expressions.
//!
//! Literals, `!`, unary `-`, `&&`, `||`, comparisons, integer arithmetic, bit operations,
//! integer casts and references to constants. Anything else is "unknown".

use syn::{BinOp, Expr, Lit, UnOp};

#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i128),
    Char(char),
    Str(String),
}

impl ConstValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn from_lit(lit: &Lit) -> Option<Self> {
        match lit {
            Lit::Bool(b) => Some(ConstValue::Bool(b.value)),
            Lit::Int(i) => i.base10_parse::<i128>().ok().map(ConstValue::Int),
            Lit::Char(c) => Some(ConstValue::Char(c.value())),
            Lit::Str(s) => Some(ConstValue::Str(s.value())),
            Lit::Byte(b) => Some(ConstValue::Int(i128::from(b.value()))),
            _ => None,
        }
    }
}

/// Evaluates `expr`, asking `lookup` for the value of every path.
pub fn eval(expr: &Expr, lookup: &dyn Fn(&syn::ExprPath) -> Option<ConstValue>) -> Option<ConstValue> {
    match expr {
        Expr::Lit(lit) => ConstValue::from_lit(&lit.lit),
        Expr::Paren(inner) => eval(&inner.expr, lookup),
        Expr::Group(inner) => eval(&inner.expr, lookup),
        Expr::Path(path) => lookup(path),
        Expr::Cast(cast) => match eval(&cast.expr, lookup)? {
            ConstValue::Int(i) => Some(ConstValue::Int(i)),
            ConstValue::Bool(b) => Some(ConstValue::Int(i128::from(b))),
            _ => None,
        },
        Expr::Unary(unary) => {
            let value = eval(&unary.expr, lookup)?;
            match (&unary.op, value) {
                (UnOp::Not(_), ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
                (UnOp::Not(_), ConstValue::Int(i)) => Some(ConstValue::Int(!i)),
                (UnOp::Neg(_), ConstValue::Int(i)) => i.checked_neg().map(ConstValue::Int),
                _ => None,
            }
        }
        Expr::Binary(binary) => eval_binary(&binary.op, &binary.left, &binary.right, lookup),
        Expr::Block(block) if block.block.stmts.len() == 1 && block.label.is_none() => {
            match &block.block.stmts[0] {
                syn::Stmt::Expr(inner, None) => eval(inner, lookup),
                _ => None,
            }
        }
        _ => None,
    }
}

fn eval_binary(
    op: &BinOp,
    left: &Expr,
    right: &Expr,
    lookup: &dyn Fn(&syn::ExprPath) -> Option<ConstValue>,
) -> Option<ConstValue> {
    // Short-circuit on the left operand even when the right one is unknown.
    match op {
        BinOp::And(_) => {
            return match eval(left, lookup)?.as_bool()? {
                false => Some(ConstValue::Bool(false)),
                true => Some(ConstValue::Bool(eval(right, lookup)?.as_bool()?)),
            };
        }
        BinOp::Or(_) => {
            return match eval(left, lookup)?.as_bool()? {
                true => Some(ConstValue::Bool(true)),
                false => Some(ConstValue::Bool(eval(right, lookup)?.as_bool()?)),
            };
        }
        _ => {}
    }

    let lhs = eval(left, lookup)?;
    let rhs = eval(right, lookup)?;

    if let Some(ordering) = compare(&lhs, &rhs) {
        use std::cmp::Ordering::*;
        let result = match op {
            BinOp::Eq(_) => Some(ordering == Equal),
            BinOp::Ne(_) => Some(ordering != Equal),
            BinOp::Lt(_) => Some(ordering == Less),
            BinOp::Le(_) => Some(ordering != Greater),
            BinOp::Gt(_) => Some(ordering == Greater),
            BinOp::Ge(_) => Some(ordering != Less),
            _ => None,
        };
        if let Some(result) = result {
            return Some(ConstValue::Bool(result));
        }
    }

    match (lhs, rhs) {
        (ConstValue::Int(a), ConstValue::Int(b)) => {
            let value = match op {
                BinOp::Add(_) => a.checked_add(b),
                BinOp::Sub(_) => a.checked_sub(b),
                BinOp::Mul(_) => a.checked_mul(b),
                BinOp::Div(_) => a.checked_div(b),
                BinOp::Rem(_) => a.checked_rem(b),
                BinOp::BitAnd(_) => Some(a & b),
                BinOp::BitOr(_) => Some(a | b),
                BinOp::BitXor(_) => Some(a ^ b),
                BinOp::Shl(_) => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)),
                BinOp::Shr(_) => u32::try_from(b).ok().and_then(|s| a.checked_shr(s)),
                _ => None,
            };
            value.map(ConstValue::Int)
        }
        (ConstValue::Bool(a), ConstValue::Bool(b)) => match op {
            BinOp::BitAnd(_) => Some(ConstValue::Bool(a & b)),
            BinOp::BitOr(_) => Some(ConstValue::Bool(a | b)),
            BinOp::BitXor(_) => Some(ConstValue::Bool(a ^ b)),
            _ => None,
        },
        _ => None,
    }
}

fn compare(lhs: &ConstValue, rhs: &ConstValue) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (ConstValue::Bool(a), ConstValue::Bool(b)) => Some(a.cmp(b)),
        (ConstValue::Int(a), ConstValue::Int(b)) => Some(a.cmp(b)),
        (ConstValue::Char(a), ConstValue::Char(b)) => Some(a.cmp(b)),
        (ConstValue::Str(a), ConstValue::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn no_paths(_: &syn::ExprPath) -> Option<ConstValue> {
        None
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let expr: Expr = parse_quote!((2 + 3) * 4 == 20);
        assert_eq!(eval(&expr, &no_paths), Some(ConstValue::Bool(true)));
        let expr: Expr = parse_quote!(-(7 % 4) as i64);
        assert_eq!(eval(&expr, &no_paths), Some(ConstValue::Int(-3)));
        let expr: Expr = parse_quote!(1 / 0);
        assert_eq!(eval(&expr, &no_paths), None);
    }

    #[test]
    fn test_short_circuit_with_unknown_operand() {
        let expr: Expr = parse_quote!(false && unknown());
        assert_eq!(eval(&expr, &no_paths), Some(ConstValue::Bool(false)));
        let expr: Expr = parse_quote!(true || unknown());
        assert_eq!(eval(&expr, &no_paths), Some(ConstValue::Bool(true)));
        let expr: Expr = parse_quote!(true && unknown());
        assert_eq!(eval(&expr, &no_paths), None);
    }

    #[test]
    fn test_paths_use_lookup() {
        let lookup = |path: &syn::ExprPath| {
            path.path
                .is_ident("HAS_RANK")
                .then_some(ConstValue::Bool(true))
        };
        let expr: Expr = parse_quote!(!HAS_RANK || OTHER);
        assert_eq!(eval(&expr, &lookup), None);
        let expr: Expr = parse_quote!(HAS_RANK && !false);
        assert_eq!(eval(&expr, &lookup), Some(ConstValue::Bool(true)));
    }
}
