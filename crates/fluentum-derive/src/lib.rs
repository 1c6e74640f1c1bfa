//! Derive macro for fluentum components.
//!
//! `#[derive(Component)]` turns a struct holding a `FluentElement` into a
//! component type: it implements `FromHandleWithContext` and `Component` so
//! the struct can be registered with a `ComponentFactory` and used as a list
//! member.
//!
//! ```ignore
//! use fluentum::{Component, FluentElement};
//!
//! #[derive(Component)]
//! struct SearchBox {
//!     element: FluentElement,
//!     submitted: std::sync::atomic::AtomicBool,
//! }
//!
//! #[derive(Component)]
//! struct Badge(#[component(element)] FluentElement);
//! ```
//!
//! The element field is the single field of type `FluentElement`, or the one
//! marked `#[component(element)]`. Every other field starts from
//! `Default::default()`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, Index, Type};

/// Derive `FromHandleWithContext` and `Component` for a struct.
///
/// # Attributes
///
/// - `#[component(element)]` on a field selects it as the element field.
///   Required when the type alone does not identify a single field.
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_component(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_component(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "Component can only be derived for structs",
        ));
    };
    let element = element_field(&data.fields, name)?;

    let (construct, accessor) = match &data.fields {
        Fields::Named(fields) => {
            let inits = fields.named.iter().enumerate().map(|(i, field)| {
                let ident = &field.ident;
                if i == element {
                    quote!(#ident: ::fluentum::FluentElement::new(handle, context))
                } else {
                    quote!(#ident: ::core::default::Default::default())
                }
            });
            let ident = &fields.named[element].ident;
            (quote!(Self { #(#inits),* }), quote!(&self.#ident))
        }
        Fields::Unnamed(fields) => {
            let inits = (0..fields.unnamed.len()).map(|i| {
                if i == element {
                    quote!(::fluentum::FluentElement::new(handle, context))
                } else {
                    quote!(::core::default::Default::default())
                }
            });
            let index = Index::from(element);
            (quote!(Self(#(#inits),*)), quote!(&self.#index))
        }
        Fields::Unit => {
            return Err(syn::Error::new_spanned(
                name,
                "Component needs a FluentElement field",
            ))
        }
    };

    Ok(quote! {
        impl #impl_generics ::fluentum::FromHandleWithContext for #name #ty_generics #where_clause {
            fn from_handle_with_context(
                handle: ::fluentum::Handle,
                context: ::fluentum::ComponentContext,
            ) -> ::fluentum::FluentResult<Self> {
                ::core::result::Result::Ok(#construct)
            }
        }

        impl #impl_generics ::fluentum::Component for #name #ty_generics #where_clause {
            fn element(&self) -> &::fluentum::FluentElement {
                #accessor
            }
        }
    })
}

/// Position of the element field
fn element_field(fields: &Fields, name: &syn::Ident) -> syn::Result<usize> {
    let mut marked = Vec::new();
    let mut typed = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        if is_marked(field)? {
            marked.push(i);
        }
        if is_element_type(&field.ty) {
            typed.push(i);
        }
    }
    match (marked.as_slice(), typed.as_slice()) {
        ([i], _) | ([], [i]) => Ok(*i),
        ([], []) => Err(syn::Error::new_spanned(
            name,
            "Component needs a FluentElement field",
        )),
        ([], _) => Err(syn::Error::new_spanned(
            name,
            "several FluentElement fields: mark one with #[component(element)]",
        )),
        _ => Err(syn::Error::new_spanned(
            name,
            "only one field may be marked #[component(element)]",
        )),
    }
}

fn is_marked(field: &Field) -> syn::Result<bool> {
    let mut marked = false;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("component")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("element") {
                marked = true;
                Ok(())
            } else {
                Err(meta.error("unsupported component attribute, expected `element`"))
            }
        })?;
    }
    Ok(marked)
}

fn is_element_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) if path.qself.is_none() => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "FluentElement" && segment.arguments.is_none()),
        _ => false,
    }
}
