//! Annotation stripper.
//!
//! Engine annotations mean nothing to a compiler, so they never reach the output. Stripping
//! works on tokens: every `#[...]` whose path is an engine annotation is dropped, at any
//! nesting depth, and the result is reparsed.

use proc_macro2::{Delimiter, Group, TokenStream, TokenTree};
use quote::ToTokens;
use syn::File;

use super::Rewrite;
use crate::error::{Error, Result};
use crate::facet::ANNOTATIONS;

pub fn strip_annotations(file: &File, unit: &str) -> Result<Rewrite> {
    let mut removed = 0;
    let tokens = strip(file.to_token_stream(), &mut removed);
    if removed == 0 {
        return Ok(Rewrite::unchanged(file));
    }
    let file = syn::parse2::<File>(tokens).map_err(|err| Error::Parse {
        unit: unit.to_string(),
        message: err.to_string(),
    })?;
    tracing::debug!(removed, "annotations stripped");
    Ok(Rewrite::new(file, true))
}

fn is_annotation_group(token: &TokenTree) -> bool {
    let TokenTree::Group(group) = token else {
        return false;
    };
    if group.delimiter() != Delimiter::Bracket {
        return false;
    }
    match group.stream().into_iter().next() {
        Some(TokenTree::Ident(ident)) => ANNOTATIONS.iter().any(|name| ident == name),
        _ => false,
    }
}

fn strip(stream: TokenStream, removed: &mut usize) -> TokenStream {
    let tokens: Vec<TokenTree> = stream.into_iter().collect();
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let is_pound = matches!(&tokens[i], TokenTree::Punct(p) if p.as_char() == '#');
        if is_pound && tokens.get(i + 1).is_some_and(is_annotation_group) {
            *removed += 1;
            i += 2;
            continue;
        }
        match &tokens[i] {
            TokenTree::Group(group) => {
                let mut stripped = Group::new(group.delimiter(), strip(group.stream(), removed));
                stripped.set_span(group.span());
                out.push(TokenTree::Group(stripped));
            }
            other => out.push(other.clone()),
        }
        i += 1;
    }
    out.into_iter().collect()
}
