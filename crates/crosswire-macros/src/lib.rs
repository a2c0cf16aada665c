//! Procedural macros for the crosswire object model.
//!
//! This crate provides `#[derive(Object)]`, which implements
//! `crosswire_core::Object` by forwarding to an embedded base field.
//!
//! # Attributes
//!
//! ## `#[object(base)]`
//!
//! Marks the field holding the object's base. The field's type must
//! implement `AsObjectBase` (`ObjectBase` and `ThreadObject` do). Without
//! the attribute, a field named `base` is used.
//!
//! ```ignore
//! #[derive(Object)]
//! struct Worker {
//!     #[object(base)]
//!     inner: ThreadObject,
//! }
//! ```
//!
//! ## `#[signal]`
//!
//! Marks a field as a signal. Marked fields are listed, in declaration
//! order, by `Object::signal_names`.
//!
//! ```ignore
//! #[signal]
//! clicked: Signal<()>,
//!
//! #[signal]
//! text_changed: Signal<(String,)>,
//! ```
//!
//! ## `#[object(crate = path)]`
//!
//! Struct-level override for the path to the core crate, for code that
//! reaches it through a re-export:
//!
//! ```ignore
//! #[derive(Object)]
//! #[object(crate = crosswire)]
//! struct Label {
//!     base: ObjectBase,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Field, Fields, Ident, LitStr, Path, parse_macro_input};

/// Derive the `Object` trait.
///
/// # Example
///
/// ```ignore
/// use crosswire_core::{ObjectBase, Signal};
/// use crosswire_macros::Object;
///
/// #[derive(Object)]
/// struct Button {
///     base: ObjectBase,
///
///     #[signal]
///     clicked: Signal<()>,
/// }
/// ```
#[proc_macro_derive(Object, attributes(object, signal))]
pub fn derive_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_derive_object(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed struct-level object attributes.
struct ObjectAttrs {
    krate: Path,
}

fn impl_derive_object(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let object_attrs = parse_object_attrs(&input.attrs)?;
    let krate = &object_attrs.krate;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Object derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Object derive only supports structs",
            ));
        }
    };

    let base_field = find_base_field(fields.iter())?.ok_or_else(|| {
        syn::Error::new_spanned(
            input,
            "Object derive requires a `base` field or a field marked `#[object(base)]`",
        )
    })?;

    let mut signal_names = Vec::new();
    for field in fields {
        if let Some(name) = parse_signal_field(field)? {
            signal_names.push(LitStr::new(&name.to_string(), name.span()));
        }
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::Object for #struct_name #ty_generics #where_clause {
            fn object_base(&self) -> &#krate::ObjectBase {
                #krate::AsObjectBase::as_object_base(&self.#base_field)
            }

            fn signal_names(&self) -> &'static [&'static str] {
                &[#(#signal_names),*]
            }
        }
    })
}

/// Parse struct-level #[object(...)] attributes.
fn parse_object_attrs(attrs: &[Attribute]) -> syn::Result<ObjectAttrs> {
    let mut result = ObjectAttrs {
        krate: syn::parse_quote!(::crosswire_core),
    };

    for attr in attrs {
        if !attr.path().is_ident("object") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                result.krate = meta.value()?.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported object attribute, expected `crate = path`"))
            }
        })?;
    }

    Ok(result)
}

/// Whether `field` carries `#[object(base)]`.
fn is_marked_base(field: &Field) -> syn::Result<bool> {
    let mut marked = false;
    for attr in &field.attrs {
        if !attr.path().is_ident("object") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("base") {
                marked = true;
                Ok(())
            } else {
                Err(meta.error("unsupported object field attribute, expected `base`"))
            }
        })?;
    }
    Ok(marked)
}

/// Locate the base field: the one marked `#[object(base)]`, else `base`.
fn find_base_field<'a>(fields: impl Iterator<Item = &'a Field>) -> syn::Result<Option<Ident>> {
    let mut marked: Option<&Field> = None;
    let mut named_base = None;

    for field in fields {
        let Some(name) = &field.ident else {
            continue;
        };
        if is_marked_base(field)? {
            if marked.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "only one field may be marked `#[object(base)]`",
                ));
            }
            marked = Some(field);
        }
        if name == "base" {
            named_base = Some(name.clone());
        }
    }

    Ok(marked.and_then(|field| field.ident.clone()).or(named_base))
}

/// Parse a field with #[signal] attribute.
fn parse_signal_field(field: &Field) -> syn::Result<Option<Ident>> {
    let Some(signal_attr) = field.attrs.iter().find(|attr| attr.path().is_ident("signal")) else {
        return Ok(None);
    };
    signal_attr.meta.require_path_only()?;

    if !is_signal_type(&field.ty) {
        return Err(syn::Error::new_spanned(
            &field.ty,
            "#[signal] fields must have type `Signal<Args>`",
        ));
    }
    Ok(field.ident.clone())
}

fn is_signal_type(ty: &syn::Type) -> bool {
    match ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Signal"),
        _ => false,
    }
}
