//! Numeric width adjusters.
//!
//! Only declared types change: `#[count]` declarations narrow to the count width and
//! `#[widen]` declarations widen to the rank width. Every integer primitive inside the
//! declared type is rewritten, so `Vec<usize>` becomes `Vec<u32>`.

use proc_macro2::Span;
use syn::{fold::Fold, Attribute, File, Ident, ReturnType, Type};

use super::Rewrite;
use crate::config::is_integer_type;
use crate::facet;

/// Rewrites the declared types of declarations carrying `marker` to `width`.
pub fn adjust(file: &File, marker: &str, width: &str) -> Rewrite {
    let mut adjuster = Adjuster {
        marker,
        width: Ident::new(width, Span::call_site()),
        changed: false,
    };
    let file = adjuster.fold_file(file.clone());
    Rewrite::new(file, adjuster.changed)
}

struct Adjuster<'a> {
    marker: &'a str,
    width: Ident,
    changed: bool,
}

impl Adjuster<'_> {
    fn marked(&self, attrs: &[Attribute]) -> bool {
        facet::has_marker(attrs, self.marker)
    }

    fn retype(&mut self, ty: Type) -> Type {
        let mut integers = IntegerRewriter {
            width: &self.width,
            changed: false,
        };
        let ty = integers.fold_type(ty);
        self.changed |= integers.changed;
        ty
    }

    fn retype_output(&mut self, output: ReturnType) -> ReturnType {
        match output {
            ReturnType::Type(arrow, ty) => ReturnType::Type(arrow, Box::new(self.retype(*ty))),
            ReturnType::Default => ReturnType::Default,
        }
    }
}

struct IntegerRewriter<'a> {
    width: &'a Ident,
    changed: bool,
}

impl Fold for IntegerRewriter<'_> {
    fn fold_type_path(&mut self, mut path: syn::TypePath) -> syn::TypePath {
        if path.qself.is_none() && path.path.segments.len() == 1 {
            let segment = &mut path.path.segments[0];
            let name = segment.ident.to_string();
            if is_integer_type(&name) && segment.arguments.is_empty() {
                if segment.ident != *self.width {
                    segment.ident = Ident::new(&self.width.to_string(), segment.ident.span());
                    self.changed = true;
                }
                return path;
            }
        }
        syn::fold::fold_type_path(self, path)
    }
}

impl Fold for Adjuster<'_> {
    fn fold_field(&mut self, mut field: syn::Field) -> syn::Field {
        if self.marked(&field.attrs) {
            field.ty = self.retype(field.ty);
        }
        field
    }

    fn fold_pat_type(&mut self, mut pat: syn::PatType) -> syn::PatType {
        if self.marked(&pat.attrs) {
            pat.ty = Box::new(self.retype(*pat.ty));
        }
        syn::fold::fold_pat_type(self, pat)
    }

    fn fold_local(&mut self, mut local: syn::Local) -> syn::Local {
        if self.marked(&local.attrs) {
            if let syn::Pat::Type(pat) = &mut local.pat {
                let ty = std::mem::replace(&mut *pat.ty, Type::Verbatim(Default::default()));
                *pat.ty = self.retype(ty);
            }
        }
        syn::fold::fold_local(self, local)
    }

    fn fold_item_fn(&mut self, mut item: syn::ItemFn) -> syn::ItemFn {
        if self.marked(&item.attrs) {
            item.sig.output = self.retype_output(item.sig.output);
        }
        syn::fold::fold_item_fn(self, item)
    }

    fn fold_impl_item_fn(&mut self, mut item: syn::ImplItemFn) -> syn::ImplItemFn {
        if self.marked(&item.attrs) {
            item.sig.output = self.retype_output(item.sig.output);
        }
        syn::fold::fold_impl_item_fn(self, item)
    }

    fn fold_trait_item_fn(&mut self, mut item: syn::TraitItemFn) -> syn::TraitItemFn {
        if self.marked(&item.attrs) {
            item.sig.output = self.retype_output(item.sig.output);
        }
        syn::fold::fold_trait_item_fn(self, item)
    }

    fn fold_item_const(&mut self, mut item: syn::ItemConst) -> syn::ItemConst {
        if self.marked(&item.attrs) {
            item.ty = Box::new(self.retype(*item.ty));
        }
        syn::fold::fold_item_const(self, item)
    }

    fn fold_impl_item_const(&mut self, mut item: syn::ImplItemConst) -> syn::ImplItemConst {
        if self.marked(&item.attrs) {
            item.ty = self.retype(item.ty);
        }
        syn::fold::fold_impl_item_const(self, item)
    }

    fn fold_item_static(&mut self, mut item: syn::ItemStatic) -> syn::ItemStatic {
        if self.marked(&item.attrs) {
            item.ty = Box::new(self.retype(*item.ty));
        }
        syn::fold::fold_item_static(self, item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::render;
    use syn::parse_quote;

    #[test]
    fn test_only_marked_field_narrows() {
        let file: File = parse_quote! {
            struct Tree {
                #[count]
                count: usize,
                depth: usize,
                weights: Vec<u64>,
            }
            fn total(#[count] n: usize, m: usize) -> usize { n + m }
        };
        let out = adjust(&file, facet::COUNT, "u32");
        assert!(out.changed);
        let text = render(&out.file);
        assert!(text.contains("count: u32"));
        assert!(text.contains("depth: usize"));
        assert!(text.contains("weights: Vec<u64>"));
        assert!(text.contains("n: u32, m: usize) -> usize"));
    }

    #[test]
    fn test_widen_nested_and_return_types() {
        let file: File = parse_quote! {
            impl Tree {
                #[widen]
                fn rank(&self) -> Option<i32> { None }
                fn other(&self) -> i32 {
                    #[widen]
                    let r: (i32, bool) = (0, true);
                    r.0
                }
            }
        };
        let text = render(&adjust(&file, facet::WIDEN, "i64").file);
        assert!(text.contains("fn rank(&self) -> Option<i64>"));
        assert!(text.contains("let r: (i64, bool)"));
        assert!(text.contains("fn other(&self) -> i32"));
    }

    #[test]
    fn test_already_narrow_is_unchanged() {
        let file: File = parse_quote! {
            struct S { #[count] n: u32 }
        };
        assert!(!adjust(&file, facet::COUNT, "u32").changed);
    }
}
