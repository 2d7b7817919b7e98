//! Utility functions for procedural macros
//!
//! Type inspection helpers used when generating column extraction code.

use syn::Type;

/// Return `T` for a type written as `Option<T>`
pub fn option_inner_type(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(syn::GenericArgument::Type(inner)) => Some(inner),
        _ => None,
    }
}

/// Return the element type `T` for a slot array written as `[Option<T>; N]`
pub fn slot_array_inner_type(ty: &Type) -> Option<&Type> {
    let Type::Array(array) = ty else {
        return None;
    };
    option_inner_type(&array.elem)
}

/// Build the column names of a slot array: `prefix` followed by a two-digit index
pub fn slot_column_names(prefix: &str, start: usize, count: usize) -> Vec<String> {
    (start..start + count)
        .map(|index| format!("{prefix}{index:02}"))
        .collect()
}
