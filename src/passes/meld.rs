//! Entry-type melder.
//!
//! Every specialization of one template iterates with the same entry shape, so the private
//! `<Output>Entry` becomes the shared `Entry<Specialization>`. The first specialization to be
//! generated owns the shared declaration; later ones drop theirs and reuse it.

use syn::{File, Item};

use super::{rename::rename, Rewrite};
use crate::front::type_name;

pub fn meld(file: &File, private: &str, shared: &str, shared_exists: bool) -> Rewrite {
    let mut file = file.clone();
    let mut dropped = 0;
    if shared_exists {
        let before = file.items.len();
        file.items.retain(|item| !declares(item, private));
        dropped = before - file.items.len();
    }
    let renamed = rename(&file, private, shared);
    tracing::debug!(private, shared, dropped, "entry meld");
    Rewrite::new(renamed.file, renamed.changed || dropped > 0)
}

/// Declaration of `name` or an impl block for it.
fn declares(item: &Item, name: &str) -> bool {
    match item {
        Item::Struct(item) => item.ident == name,
        Item::Enum(item) => item.ident == name,
        Item::Union(item) => item.ident == name,
        Item::Type(item) => item.ident == name,
        Item::Impl(item) => type_name(&item.self_ty).is_some_and(|ty| ty == name),
        _ => false,
    }
}
