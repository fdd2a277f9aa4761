//! Arguments of expression-like macros.
//!
//! `println!`, `assert_eq!`, `vec!` and friends take plain expressions, so their bodies can
//! be resolved and rewritten like any other expression. Other macros stay opaque token
//! streams.

use proc_macro2::{Span, TokenStream};
use quote::ToTokens;
use syn::{parse::ParseStream, punctuated::Punctuated, Expr, Lit, Macro, Token};

const EXPRESSION_MACROS: &[&str] = &[
    "assert", "assert_eq", "assert_ne", "debug_assert", "debug_assert_eq", "debug_assert_ne",
    "dbg", "eprint", "eprintln", "format", "format_args", "panic", "print", "println", "todo",
    "unimplemented", "unreachable", "vec", "write", "writeln",
];

/// Macros whose string literals are format strings with implicit captures.
const FORMAT_MACROS: &[&str] = &[
    "assert", "assert_eq", "assert_ne", "debug_assert", "debug_assert_eq", "debug_assert_ne",
    "eprint", "eprintln", "format", "format_args", "panic", "print", "println", "todo",
    "unimplemented", "unreachable", "write", "writeln",
];

pub enum MacroBody {
    List(Punctuated<Expr, Token![,]>),
    /// `vec![value; count]`
    Repeat {
        value: Expr,
        semi: Token![;],
        count: Expr,
    },
}

pub fn macro_name(mac: &Macro) -> String {
    mac.path
        .segments
        .last()
        .map(|segment| segment.ident.to_string())
        .unwrap_or_default()
}

pub fn parse_body(mac: &Macro) -> Option<MacroBody> {
    if !EXPRESSION_MACROS.contains(&macro_name(mac).as_str()) {
        return None;
    }
    if let Ok(list) = mac.parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated) {
        return Some(MacroBody::List(list));
    }
    mac.parse_body_with(|input: ParseStream| {
        Ok(MacroBody::Repeat {
            value: input.parse()?,
            semi: input.parse()?,
            count: input.parse()?,
        })
    })
    .ok()
}

impl MacroBody {
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            MacroBody::List(list) => list.iter().collect(),
            MacroBody::Repeat { value, count, .. } => vec![value, count],
        }
    }

    pub fn map(self, mut f: impl FnMut(Expr) -> Expr) -> Self {
        match self {
            MacroBody::List(list) => {
                MacroBody::List(list.into_pairs().map(|pair| {
                    let (expr, comma) = pair.into_tuple();
                    syn::punctuated::Pair::new(f(expr), comma)
                })
                .collect())
            }
            MacroBody::Repeat { value, semi, count } => MacroBody::Repeat {
                value: f(value),
                semi,
                count: f(count),
            },
        }
    }

    /// Drops list arguments rejected by `keep`. Repeat bodies are left alone.
    pub fn retain(self, mut keep: impl FnMut(&Expr) -> bool) -> (Self, bool) {
        match self {
            MacroBody::List(list) => {
                let before = list.len();
                let kept: Punctuated<Expr, Token![,]> = list.into_iter().filter(|expr| keep(expr)).collect();
                let changed = kept.len() != before;
                (MacroBody::List(kept), changed)
            }
            repeat => (repeat, false),
        }
    }

    pub fn into_macro(self, mac: &Macro) -> Macro {
        let mut tokens = TokenStream::new();
        match self {
            MacroBody::List(list) => list.to_tokens(&mut tokens),
            MacroBody::Repeat { value, semi, count } => {
                value.to_tokens(&mut tokens);
                semi.to_tokens(&mut tokens);
                count.to_tokens(&mut tokens);
            }
        }
        Macro {
            path: mac.path.clone(),
            bang_token: mac.bang_token,
            delimiter: mac.delimiter.clone(),
            tokens,
        }
    }
}

/// Identifiers captured by `{name}` in the format strings of `mac`.
pub fn format_captures(mac: &Macro, body: &MacroBody) -> Vec<(String, Span)> {
    if !FORMAT_MACROS.contains(&macro_name(mac).as_str()) {
        return Vec::new();
    }
    let mut captures = Vec::new();
    for expr in body.exprs() {
        let Expr::Lit(syn::ExprLit { lit: Lit::Str(text), .. }) = expr else {
            continue;
        };
        let value = text.value();
        let mut rest = value.as_str();
        while let Some(open) = rest.find('{') {
            rest = &rest[open + 1..];
            if let Some(stripped) = rest.strip_prefix('{') {
                rest = stripped;
                continue;
            }
            let end = rest.find(['}', ':']).unwrap_or(rest.len());
            let name = &rest[..end];
            let is_ident = name
                .chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_alphanumeric() || c == '_');
            if is_ident {
                captures.push((name.to_string(), text.span()));
            }
            rest = &rest[end..];
        }
    }
    captures
}
