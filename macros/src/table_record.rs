//! TableRecord derive macro implementation
//!
//! Generates the Arrow schema and the `RecordBatch` to record conversion for
//! a struct describing one row of an EHR table.

use darling::{ast, FromDeriveInput, FromField};
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

use crate::utils;

/// Receiver for the struct that derives `TableRecord`
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(table), supports(struct_named))]
struct TableRecordReceiver {
    /// The struct identifier
    ident: syn::Ident,
    /// Table name from the #[table(name = "...")] attribute
    #[darling(default)]
    name: Option<String>,
    /// The struct data with parsed fields
    data: ast::Data<(), ColumnReceiver>,
}

/// Receiver for the fields in the struct
#[derive(Debug, FromField)]
#[darling(attributes(column))]
struct ColumnReceiver {
    /// The field identifier
    ident: Option<syn::Ident>,
    /// The field type
    ty: syn::Type,
    /// Source column name
    #[darling(default)]
    name: Option<String>,
    /// Use `Default::default()` for missing or null values
    #[darling(default)]
    or_default: bool,
    /// Column name prefix of a slot array
    #[darling(default)]
    prefix: Option<String>,
    /// Number of slots in a slot array
    #[darling(default)]
    count: Option<usize>,
    /// Index of the first slot (defaults to 1)
    #[darling(default)]
    start: Option<usize>,
}

/// Process the TableRecord derive macro
pub fn process_derive_table_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let receiver = match TableRecordReceiver::from_derive_input(&input) {
        Ok(receiver) => receiver,
        Err(err) => return err.write_errors().into(),
    };

    match generate_table_record_impl(&receiver) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Generate the `TableRecord` implementation
fn generate_table_record_impl(
    receiver: &TableRecordReceiver,
) -> syn::Result<proc_macro2::TokenStream> {
    let struct_name = &receiver.ident;
    let table_name = receiver
        .name
        .clone()
        .unwrap_or_else(|| struct_name.to_string().to_lowercase());

    let ast::Data::Struct(fields) = &receiver.data else {
        unreachable!("Darling ensures this is a struct")
    };

    let mut initialisers = Vec::new();
    let mut schema_fields = Vec::new();

    for field in fields.iter() {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let ty = &field.ty;

        // Fixed-length slot arrays, e.g. diagnosis_01..diagnosis_24
        if let Some(prefix) = &field.prefix {
            let count = field
                .count
                .ok_or_else(|| syn::Error::new_spanned(ident, "`prefix` requires `count`"))?;
            let inner = utils::slot_array_inner_type(ty).ok_or_else(|| {
                syn::Error::new_spanned(ty, "slot columns must be declared as `[Option<T>; N]`")
            })?;
            let names = utils::slot_column_names(prefix, field.start.unwrap_or(1), count);

            initialisers.push(quote! {
                #ident: {
                    let mut slots: #ty = ::core::default::Default::default();
                    for (slot, column) in slots.iter_mut().zip([#(#names),*]) {
                        *slot = <#inner as crate::tables::extract::ColumnValue>::extract(
                            batch, row, column, false,
                        )?;
                    }
                    slots
                }
            });

            for name in &names {
                schema_fields.push(quote! {
                    fields.push(::arrow::datatypes::Field::new(
                        #name,
                        <#inner as crate::tables::extract::ColumnValue>::data_type(),
                        true,
                    ));
                });
            }
            continue;
        }

        let column = field.name.clone().unwrap_or_else(|| ident.to_string());

        if let Some(inner) = utils::option_inner_type(ty) {
            initialisers.push(quote! {
                #ident: <#inner as crate::tables::extract::ColumnValue>::extract(
                    batch, row, #column, false,
                )?
            });
            schema_fields.push(quote! {
                fields.push(::arrow::datatypes::Field::new(
                    #column,
                    <#inner as crate::tables::extract::ColumnValue>::data_type(),
                    true,
                ));
            });
        } else if field.or_default {
            initialisers.push(quote! {
                #ident: <#ty as crate::tables::extract::ColumnValue>::extract(
                    batch, row, #column, false,
                )?
                .unwrap_or_default()
            });
            schema_fields.push(quote! {
                fields.push(::arrow::datatypes::Field::new(
                    #column,
                    <#ty as crate::tables::extract::ColumnValue>::data_type(),
                    true,
                ));
            });
        } else {
            initialisers.push(quote! {
                #ident: <#ty as crate::tables::extract::ColumnValue>::extract(
                    batch, row, #column, true,
                )?
                .ok_or_else(|| crate::error::DatasetError::missing_value(#table_name, #column, row))?
            });
            schema_fields.push(quote! {
                fields.push(::arrow::datatypes::Field::new(
                    #column,
                    <#ty as crate::tables::extract::ColumnValue>::data_type(),
                    false,
                ));
            });
        }
    }

    Ok(quote! {
        impl crate::tables::TableRecord for #struct_name {
            const TABLE_NAME: &'static str = #table_name;

            fn schema() -> ::arrow::datatypes::SchemaRef {
                let mut fields: ::std::vec::Vec<::arrow::datatypes::Field> = ::std::vec::Vec::new();
                #(#schema_fields)*
                ::std::sync::Arc::new(::arrow::datatypes::Schema::new(fields))
            }

            fn from_batch(
                batch: &::arrow::record_batch::RecordBatch,
            ) -> crate::error::Result<::std::vec::Vec<Self>> {
                let mut records = ::std::vec::Vec::with_capacity(batch.num_rows());
                for row in 0..batch.num_rows() {
                    records.push(Self {
                        #(#initialisers),*
                    });
                }
                Ok(records)
            }
        }
    })
}
