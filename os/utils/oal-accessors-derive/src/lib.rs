//! # Accessor Derive
//!
//! Generates read accessors and consuming builders for plain descriptor
//! structs such as region descriptors and allocator limits.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, parse_macro_input, spanned::Spanned};

/// Derive `const fn <field>(&self)` getters and `const fn with_<field>(mut self, value) -> Self`
/// builders for each **named** field.
///
/// Getters return the field by value, so field types must be `Copy`.
///
/// - `#[accessors(skip)]`: generate nothing for the field
/// - `#[accessors(by_ref)]`: getter returns `&Ty` instead of a copy
/// - `#[accessors(no_with)]`: getter only
///
/// # Example
///
/// ```
/// use oal_accessors_derive::Accessors;
///
/// #[derive(Accessors, Default)]
/// struct Limits {
///     max_regions: usize,
///     #[accessors(no_with)]
///     page_shift: u32,
///     #[accessors(skip)]
///     _private: (),
/// }
///
/// let l = Limits::default().with_max_regions(4);
/// assert_eq!(l.max_regions(), 4);
/// assert_eq!(l.page_shift(), 0);
/// ```
#[proc_macro_derive(Accessors, attributes(accessors))]
pub fn derive_accessors(input: TokenStream) -> TokenStream {
    let DeriveInput {
        ident,
        generics,
        data,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let fields = match data {
        Data::Struct(s) => match s.fields {
            Fields::Named(n) => n.named,
            Fields::Unnamed(u) => {
                return syn::Error::new(u.span(), "Accessors only supports named fields")
                    .to_compile_error()
                    .into();
            }
            Fields::Unit => {
                return syn::Error::new(ident.span(), "Accessors does not apply to unit structs")
                    .to_compile_error()
                    .into();
            }
        },
        _ => {
            return syn::Error::new(ident.span(), "Accessors can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut methods = Vec::new();

    for field in fields {
        let Some(fname) = &field.ident else { continue };
        let opts = match FieldOptions::parse(&field.attrs) {
            Ok(o) => o,
            Err(e) => return e.to_compile_error().into(),
        };
        if opts.skip {
            continue;
        }

        let ty = &field.ty;
        let getter = if opts.by_ref {
            quote! {
                #[inline]
                #[must_use]
                pub const fn #fname(&self) -> &#ty {
                    &self.#fname
                }
            }
        } else {
            quote! {
                #[inline]
                #[must_use]
                pub const fn #fname(&self) -> #ty {
                    self.#fname
                }
            }
        };
        methods.push(getter);

        if !opts.no_with {
            let with_name = format_ident!("with_{}", fname);
            methods.push(quote! {
                #[inline]
                #[must_use]
                pub const fn #with_name(mut self, value: #ty) -> Self {
                    self.#fname = value;
                    self
                }
            });
        }
    }

    let expanded = quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            #(#methods)*
        }
    };

    TokenStream::from(expanded)
}

#[derive(Default)]
struct FieldOptions {
    skip: bool,
    by_ref: bool,
    no_with: bool,
}

impl FieldOptions {
    fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut opts = Self::default();
        for attr in attrs {
            if !attr.path().is_ident("accessors") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    opts.skip = true;
                } else if meta.path.is_ident("by_ref") {
                    opts.by_ref = true;
                } else if meta.path.is_ident("no_with") {
                    opts.no_with = true;
                } else {
                    return Err(meta.error("expected `skip`, `by_ref` or `no_with`"));
                }
                Ok(())
            })?;
        }
        Ok(opts)
    }
}
