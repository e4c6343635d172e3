mod decode_field;
mod decode_model;
mod record_trait;

use decode_model::decode_model;
use proc_macro::TokenStream;
use record_trait::record_trait;
use syn::{ItemStruct, parse_macro_input};

/// Derives `orca::Record` and `orca::Model` for a struct with named fields.
///
/// Struct attributes: `#[orca(table = "name")]`, the snake case struct name by default.
///
/// Field attributes, inside `#[orca(..)]`:
/// - `column = "name"`: column or document key, the field name by default;
/// - `primary_key`, `auto_increment`, `auto_now`, `auto_now_add`, `null`;
/// - `default = "literal"`: used by `set_default` cascades and empty json values;
/// - `field_type = Text`: overrides the type inferred from the Rust type;
/// - `foreign_key`, `one_to_one`, `reverse_one` on `Option<Box<Model>>` fields and
///   `reverse_many` on `Vec<Model>` fields;
/// - `on_delete = "cascade" | "set_null" | "set_default" | "no_action"` on forward relations.
///
/// `Option<T>` columns are nullable.
#[proc_macro_derive(Model, attributes(orca))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as ItemStruct);
    match decode_model(item) {
        Ok(model) => record_trait(&model).into(),
        Err(error) => error.to_compile_error().into(),
    }
}
