//! Procedural macros for SQLCrud.
//!
//! `sqlcrud-macros` is the **compile-time codegen layer**. `#[derive(Record)]`
//! turns a struct into a record type: a static field table in declaration
//! order, a binding encoder, a typed decoder and one typed field handle per
//! field.
//!
//! Generated code refers to `::sqlcrud_core`, so crates deriving `Record`
//! depend on `sqlcrud-core` directly.

use proc_macro::TokenStream;
use quote::{format_ident, quote};

mod infer;
mod parse;
mod validate;

use infer::FieldShape;
use parse::{FieldDef, RecordDef, parse_record};

/// Derive macro for the `Record` trait.
///
/// # Attributes
///
/// - `#[crud(table = "name")]` - Override the table name (defaults to the
///   snake_case struct name)
/// - `#[crud(primary_key)]` - Mark the primary key column (defaults to a
///   field named `id`)
///
/// Field kinds follow the Rust type: `Option<T>` is optional and `Vec<R>`
/// for a record type `R` is a collection filled by joins.
///
/// # Example
///
/// ```ignore
/// use sqlcrud::prelude::*;
///
/// #[derive(Record)]
/// struct Parent {
///     id: i64,
///     name: String,
///     children: Vec<Child>,
/// }
///
/// // generated: Parent::ID, Parent::NAME, Parent::CHILDREN
/// ```
#[proc_macro_derive(Record, attributes(crud))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let record = match parse_record(&input) {
        Ok(r) => r,
        Err(e) => return e.to_compile_error().into(),
    };

    if let Err(e) = validate::validate_record(&record) {
        return e.to_compile_error().into();
    }

    generate_record_impl(&record).into()
}

fn generate_record_impl(record: &RecordDef) -> proc_macro2::TokenStream {
    let name = &record.name;
    let table_name = &record.table_name;
    let field_consts = record.fields.iter().map(generate_field_const);
    let field_infos: Vec<_> = record.fields.iter().map(generate_field_info).collect();
    let field_count = field_infos.len();
    let to_values = record.columns().map(|field| {
        let ident = &field.name;
        let column = &field.column_name;
        quote! {
            (#column, ::sqlcrud_core::Value::from(::core::clone::Clone::clone(&self.#ident)))
        }
    });
    let decoders = record.fields.iter().map(generate_decoder);

    quote! {
        #[automatically_derived]
        impl #name {
            #(#field_consts)*
        }

        #[automatically_derived]
        impl ::sqlcrud_core::Record for #name {
            const TABLE_NAME: &'static str = #table_name;

            fn fields() -> &'static [::sqlcrud_core::FieldInfo] {
                static FIELDS: [::sqlcrud_core::FieldInfo; #field_count] = [
                    #(#field_infos),*
                ];
                &FIELDS
            }

            fn to_values(&self) -> ::std::vec::Vec<(&'static str, ::sqlcrud_core::Value)> {
                ::std::vec![#(#to_values),*]
            }

            fn from_reader(
                reader: &::sqlcrud_core::RecordReader<'_>,
            ) -> ::sqlcrud_core::Result<Self> {
                ::core::result::Result::Ok(Self {
                    #(#decoders),*
                })
            }
        }
    }
}

/// `pub const PARENT_ID: Field<Self, i64> = Field::new("parent_id");`
fn generate_field_const(field: &FieldDef) -> proc_macro2::TokenStream {
    let const_name = format_ident!("{}", field.column_name.to_uppercase());
    let column = &field.column_name;
    let ty = &field.ty;
    quote! {
        pub const #const_name: ::sqlcrud_core::Field<Self, #ty> =
            ::sqlcrud_core::Field::new(#column);
    }
}

fn generate_field_info(field: &FieldDef) -> proc_macro2::TokenStream {
    let column = &field.column_name;
    let optional = field.shape.optional();
    let primary_key = field.primary_key;
    let kind = match &field.shape {
        FieldShape::Column { kind, .. } => {
            let variant = format_ident!("{}", kind);
            quote! { ::sqlcrud_core::FieldKind::#variant }
        }
        FieldShape::Collection { item, .. } => {
            quote! {
                ::sqlcrud_core::FieldKind::Collection(
                    <#item as ::sqlcrud_core::Record>::record_type
                )
            }
        }
    };
    quote! {
        ::sqlcrud_core::FieldInfo::new(#column, #kind)
            .optional(#optional)
            .primary_key(#primary_key)
    }
}

fn generate_decoder(field: &FieldDef) -> proc_macro2::TokenStream {
    let ident = &field.name;
    let column = &field.column_name;
    match &field.shape {
        FieldShape::Column { .. } => quote! { #ident: reader.get(#column)? },
        FieldShape::Collection {
            item,
            optional: false,
        } => quote! { #ident: reader.collection::<#item>(#column)? },
        FieldShape::Collection {
            item,
            optional: true,
        } => quote! { #ident: reader.optional_collection::<#item>(#column)? },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::{DeriveInput, parse_quote};

    fn expand(input: DeriveInput) -> String {
        let record = parse_record(&input).unwrap();
        generate_record_impl(&record).to_string()
    }

    #[test]
    fn test_generates_field_constants() {
        let out = expand(parse_quote! {
            struct Child {
                parent_id: i64,
                name: String,
            }
        });
        assert!(out.contains("pub const PARENT_ID"));
        assert!(out.contains("pub const NAME"));
        assert!(out.contains("\"child\""));
    }

    #[test]
    fn test_collection_excluded_from_values() {
        let out = expand(parse_quote! {
            struct Parent {
                id: i64,
                children: Vec<Child>,
                tags: Option<Vec<Tag>>,
            }
        });
        assert!(out.contains("FieldKind :: Collection"));
        assert!(out.contains("reader . collection :: < Child >"));
        assert!(out.contains("reader . optional_collection :: < Tag >"));
        assert!(!out.contains("self . children"));
    }

    #[test]
    fn test_primary_key_flag() {
        let out = expand(parse_quote! {
            struct Tag {
                #[crud(primary_key)]
                code: String,
            }
        });
        assert!(out.contains(". primary_key (true)"));
    }
}
