//! Procedural macros for the docbind project.
//!
//! Provides `#[derive(Document)]` and `#[derive(Mapped)]`, which generate the
//! static mapping metadata (type descriptor) the codec layer drives on, plus
//! the collection binding for top-level documents.
//!
//! # Attributes
//!
//! Container level:
//! - `#[document(collection = "name")]` - collection binding (Document only;
//!   defaults to the lower-cased type name)
//! - `#[document(crate = path)]` - path to the docbind crate in scope
//!   (defaults to `::docbind`)
//!
//! Field level:
//! - `#[document(id)]` - this field maps to the store's `_id`
//! - `#[document(object_id)]` - convert between the declared representation
//!   and the canonical 12-byte object identifier (representation inferred
//!   from the field type: `String` is hex, `Vec<u8>` is raw bytes)
//! - `#[document(embed)]` - the field's value (directly, through `Option`,
//!   or as sequence elements) is itself a mapped type

#[allow(unused_extern_crates)]
extern crate self as docbind_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Fields, GenericArgument, Ident, LitStr, Path, PathArguments,
    Result, Type, parse_macro_input,
};

/// Derives the collection binding and mapping metadata for a top-level
/// document type.
#[proc_macro_derive(Document, attributes(document))]
pub fn derive_document(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input, true)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

/// Derives mapping metadata only, for embedded and query-result types that
/// carry no collection binding.
#[proc_macro_derive(Mapped, attributes(document))]
pub fn derive_mapped(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input, false)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

struct ContainerMeta {
    collection: Option<String>,
    krate: Path,
}

struct FieldMeta {
    ident: Ident,
    ty: Type,
    is_id: bool,
    convert: bool,
    embed: bool,
}

fn expand(input: DeriveInput, with_collection: bool) -> Result<TokenStream2> {
    let container = parse_container_meta(&input)?;
    if !with_collection && container.collection.is_some() {
        return Err(Error::new_spanned(
            &input.ident,
            "the `collection` attribute is only valid with #[derive(Document)]",
        ));
    }

    let Data::Struct(data) = &input.data else {
        return Err(Error::new_spanned(
            &input.ident,
            "mapped documents must be structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(Error::new_spanned(
            &input.ident,
            "mapped documents must have named fields",
        ));
    };

    let fields = fields
        .named
        .iter()
        .map(parse_field_meta)
        .collect::<Result<Vec<_>>>()?;

    let mut id_fields = fields.iter().filter(|field| field.is_id);
    let id_field = id_fields.next();
    if let Some(extra) = id_fields.next() {
        return Err(Error::new_spanned(
            &extra.ident,
            "only one field may carry #[document(id)]",
        ));
    }

    let krate = &container.krate;
    let ident = &input.ident;
    let type_name = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let id_tokens = match id_field {
        Some(field) => {
            let entry = id_field_tokens(krate, field);
            quote!(Some(#entry))
        }
        None => quote!(None),
    };

    let converted_tokens: Vec<TokenStream2> = fields
        .iter()
        .filter(|field| field.convert && !field.is_id)
        .map(|field| id_field_tokens(krate, field))
        .collect();

    let embedded_tokens: Vec<TokenStream2> = fields
        .iter()
        .filter(|field| field.embed)
        .map(|field| {
            let name = field.ident.to_string();
            let inner = unwrap_containers(&field.ty);
            quote! {
                #krate::document::EmbeddedField {
                    name: #name,
                    descriptor: <#inner as #krate::document::Mapped>::descriptor,
                }
            }
        })
        .collect();

    let mapped_impl = quote! {
        #[automatically_derived]
        impl #impl_generics #krate::document::Mapped for #ident #ty_generics #where_clause {
            fn descriptor() -> &'static #krate::document::TypeDescriptor {
                static DESCRIPTOR: #krate::document::TypeDescriptor =
                    #krate::document::TypeDescriptor {
                        type_name: #type_name,
                        id: #id_tokens,
                        converted: &[#(#converted_tokens),*],
                        embedded: &[#(#embedded_tokens),*],
                    };
                &DESCRIPTOR
            }
        }
    };

    if !with_collection {
        return Ok(mapped_impl);
    }

    let collection = container
        .collection
        .unwrap_or_else(|| type_name.to_lowercase());

    Ok(quote! {
        #mapped_impl

        #[automatically_derived]
        impl #impl_generics #krate::document::Document for #ident #ty_generics #where_clause {
            fn collection_name() -> &'static str {
                #collection
            }
        }
    })
}

fn parse_container_meta(input: &DeriveInput) -> Result<ContainerMeta> {
    let mut collection = None;
    let mut krate: Path = syn::parse_quote!(::docbind);

    for attr in &input.attrs {
        if !attr.path().is_ident("document") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                collection = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("crate") {
                let value = meta.value()?;
                krate = if value.peek(LitStr) {
                    value.parse::<LitStr>()?.parse()?
                } else {
                    value.parse()?
                };
                Ok(())
            } else {
                Err(meta.error("unknown container attribute, expected `collection` or `crate`"))
            }
        })?;
    }

    Ok(ContainerMeta { collection, krate })
}

fn parse_field_meta(field: &syn::Field) -> Result<FieldMeta> {
    let ident = field
        .ident
        .clone()
        .expect("named fields checked by caller");
    let mut meta = FieldMeta {
        ident,
        ty: field.ty.clone(),
        is_id: false,
        convert: false,
        embed: false,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("document") {
            continue;
        }
        attr.parse_nested_meta(|nested| {
            if nested.path.is_ident("id") {
                meta.is_id = true;
                Ok(())
            } else if nested.path.is_ident("object_id") {
                meta.convert = true;
                Ok(())
            } else if nested.path.is_ident("embed") {
                meta.embed = true;
                Ok(())
            } else {
                Err(nested.error("unknown field attribute, expected `id`, `object_id` or `embed`"))
            }
        })?;
    }

    if meta.embed && (meta.is_id || meta.convert) {
        return Err(Error::new_spanned(
            &meta.ident,
            "`embed` cannot be combined with `id` or `object_id`",
        ));
    }

    Ok(meta)
}

fn id_field_tokens(krate: &Path, field: &FieldMeta) -> TokenStream2 {
    let name = field.ident.to_string();
    let repr = id_repr_tokens(krate, &field.ty);
    let convert = field.convert;
    quote! {
        #krate::document::IdField {
            name: #name,
            repr: #repr,
            convert: #convert,
        }
    }
}

/// Infers the identifier representation from the declared field type,
/// looking through `Option`.
fn id_repr_tokens(krate: &Path, ty: &Type) -> TokenStream2 {
    let inner = unwrap_option(ty);

    if let Type::Path(type_path) = inner {
        if let Some(segment) = type_path.path.segments.last() {
            let name = segment.ident.to_string();
            match name.as_str() {
                "String" => return quote!(#krate::document::IdRepr::Hex),
                "ObjectId" => return quote!(#krate::document::IdRepr::ObjectId),
                "Vec" if generic_argument_is(segment, "u8") => {
                    return quote!(#krate::document::IdRepr::Bytes);
                }
                _ => {}
            }
        }
    }

    let declared = quote!(#inner).to_string();
    quote!(#krate::document::IdRepr::Other(#declared))
}

fn generic_argument_is(segment: &syn::PathSegment, expected: &str) -> bool {
    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return false;
    };
    arguments.args.iter().any(|argument| {
        matches!(
            argument,
            GenericArgument::Type(Type::Path(path)) if path.path.is_ident(expected)
        )
    })
}

fn unwrap_option(ty: &Type) -> &Type {
    unwrap_named(ty, &["Option"])
}

/// Strips `Option`, `Vec`, and `Box` wrappers to find the mapped element
/// type of an embedded field.
fn unwrap_containers(ty: &Type) -> &Type {
    let mut current = ty;
    loop {
        let next = unwrap_named(current, &["Option", "Vec", "Box"]);
        if std::ptr::eq(next, current) {
            return current;
        }
        current = next;
    }
}

fn unwrap_named<'a>(ty: &'a Type, wrappers: &[&str]) -> &'a Type {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if wrappers.iter().any(|w| segment.ident == w) {
                if let PathArguments::AngleBracketed(arguments) = &segment.arguments {
                    for argument in &arguments.args {
                        if let GenericArgument::Type(inner) = argument {
                            return inner;
                        }
                    }
                }
            }
        }
    }
    ty
}
