//! Identifier renamer.
//!
//! Whole-token replacement: `Foo -> FooBar` rewrites `Foo` and `Foo::new` but never `FooBaz`.
//! Macro bodies and attribute arguments are rewritten token by token; engine annotations are
//! left alone so facet names can't be renamed by accident.

use proc_macro2::{Group, Ident, TokenStream, TokenTree};
use syn::{fold::Fold, Attribute, File, Macro, Meta};

use super::Rewrite;
use crate::facet;

pub fn rename(file: &File, from: &str, to: &str) -> Rewrite {
    if from == to {
        return Rewrite::unchanged(file);
    }
    let mut renamer = Renamer {
        from,
        to,
        changed: false,
    };
    let file = renamer.fold_file(file.clone());
    Rewrite::new(file, renamer.changed)
}

struct Renamer<'a> {
    from: &'a str,
    to: &'a str,
    changed: bool,
}

impl Renamer<'_> {
    fn tokens(&mut self, stream: TokenStream) -> TokenStream {
        stream
            .into_iter()
            .map(|token| match token {
                TokenTree::Ident(ident) => TokenTree::Ident(self.fold_ident(ident)),
                TokenTree::Group(group) => {
                    let mut renamed = Group::new(group.delimiter(), self.tokens(group.stream()));
                    renamed.set_span(group.span());
                    TokenTree::Group(renamed)
                }
                other => other,
            })
            .collect()
    }
}

impl Fold for Renamer<'_> {
    fn fold_ident(&mut self, ident: Ident) -> Ident {
        if ident == self.from {
            self.changed = true;
            Ident::new(self.to, ident.span())
        } else {
            ident
        }
    }

    fn fold_macro(&mut self, mac: Macro) -> Macro {
        Macro {
            path: self.fold_path(mac.path),
            bang_token: mac.bang_token,
            delimiter: mac.delimiter,
            tokens: self.tokens(mac.tokens),
        }
    }

    fn fold_attribute(&mut self, mut attr: Attribute) -> Attribute {
        if facet::is_annotation(&attr) {
            return attr;
        }
        if let Meta::List(list) = &mut attr.meta {
            let tokens = std::mem::take(&mut list.tokens);
            list.tokens = self.tokens(tokens);
        }
        attr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::render;
    use syn::parse_quote;

    #[test]
    fn test_whole_identifiers_only() {
        let file: File = parse_quote! {
            pub struct SplayTree<K> { root: Option<SplayTreeNode<K>> }
            impl<K> SplayTree<K> {
                pub fn new() -> SplayTree<K> { SplayTree { root: None } }
            }
        };
        let out = rename(&file, "SplayTree", "SplayTreeArrayMap");
        assert!(out.changed);
        let text = render(&out.file);
        assert!(text.contains("struct SplayTreeArrayMap<K>"));
        assert!(text.contains("SplayTreeArrayMap { root: None }"));
        assert!(text.contains("SplayTreeNode<K>"));
    }

    #[test]
    fn test_macro_tokens_are_renamed() {
        let file: File = parse_quote! {
            fn f() { let v = vec![KeyType::default()]; debug_assert!(matches!(v[0], KeyType { .. })); }
        };
        let out = rename(&file, "KeyType", "K");
        assert!(out.changed);
        assert!(!render(&out.file).contains("KeyType"));
    }

    #[test]
    fn test_annotations_untouched_and_reversible() {
        let file: File = parse_quote! {
            #[facet(Storage(Array))]
            #[derive(Clone)]
            struct Array;
        };
        let there = rename(&file, "Array", "Slots");
        let text = render(&there.file);
        assert!(text.contains("#[facet(Storage(Array))]"));
        assert!(text.contains("struct Slots;"));
        let back = rename(&there.file, "Slots", "Array");
        assert_eq!(render(&back.file), render(&file));
        assert!(!rename(&back.file, "Missing", "Other").changed);
    }
}
