use crate::decode_field::{FieldMetadata, decode_field};
use convert_case::{Case, Casing};
use syn::{Error, Fields, ItemStruct, LitStr, Result, parse::ParseBuffer, spanned::Spanned};

pub(crate) struct ModelMetadata {
    pub(crate) item: ItemStruct,
    pub(crate) table: String,
    pub(crate) fields: Vec<FieldMetadata>,
}

pub(crate) fn decode_model(item: ItemStruct) -> Result<ModelMetadata> {
    if !item.generics.params.is_empty() {
        return Err(Error::new(
            item.generics.span(),
            "Models cannot have generic parameters",
        ));
    }
    let Fields::Named(named) = &item.fields else {
        return Err(Error::new(
            item.span(),
            "Models must be structs with named fields",
        ));
    };
    let fields = named
        .named
        .iter()
        .map(decode_field)
        .collect::<Result<Vec<_>>>()?;
    let mut table = item.ident.to_string().to_case(Case::Snake);
    if table.starts_with('_') {
        table.remove(0);
    }
    for attr in item.attrs.iter().filter(|v| v.path().is_ident("orca")) {
        attr.parse_nested_meta(|arg| {
            if arg.path.is_ident("table") {
                let value = arg
                    .value()
                    .and_then(ParseBuffer::parse::<LitStr>)
                    .map_err(|_| {
                        arg.error(
                            "Error while parsing `table`, use it like: `#[orca(table = \"my_table\")]`",
                        )
                    })?;
                table = value.value();
                Ok(())
            } else {
                Err(arg.error("Unknown attribute inside orca macro, expected `table`"))
            }
        })?;
    }
    if fields.iter().filter(|f| f.primary_key).count() > 1 {
        return Err(Error::new(
            item.ident.span(),
            "Only one field can be marked `primary_key`",
        ));
    }
    Ok(ModelMetadata {
        item,
        table,
        fields,
    })
}
