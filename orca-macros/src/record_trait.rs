use crate::{
    decode_field::{FieldKind, encode_field_def},
    decode_model::ModelMetadata,
};
use proc_macro2::TokenStream;
use quote::quote;

/// `Record` and `Model` implementations of a decoded model.
pub(crate) fn record_trait(model: &ModelMetadata) -> TokenStream {
    let name = &model.item.ident;
    let table = &model.table;
    let field_defs = model.fields.iter().map(encode_field_def);
    let get_arms = model.fields.iter().map(|f| {
        let (key, ident) = (&f.name, &f.ident);
        match f.kind {
            FieldKind::Column => quote! {
                #key => Ok(::orca::AsValue::as_value(self.#ident.clone())),
            },
            FieldKind::ReverseMany => quote! {
                #key => Ok(::orca::Value::Null),
            },
            _ => quote! {
                #key => match &self.#ident {
                    Some(related) => ::orca::Record::primary_key_value(related.as_ref()),
                    None => Ok(::orca::Value::Null),
                },
            },
        }
    });
    let set_arms = model.fields.iter().map(|f| {
        let (key, ident, ty) = (&f.name, &f.ident, &f.ty);
        match (f.kind, &f.related) {
            (FieldKind::Column, _) | (_, None) => quote! {
                #key => self.#ident = <#ty as ::orca::AsValue>::try_from_value(value)?,
            },
            (FieldKind::ReverseMany, Some(..)) => quote! {
                #key => {
                    return Err(::orca::OrmError::usage(format!(
                        "The reverse many field `{}` of `{}` cannot be assigned a value",
                        field,
                        DEFINITION.name
                    )));
                }
            },
            (_, Some(related)) => quote! {
                #key => {
                    if value.is_null() {
                        self.#ident = None;
                    } else {
                        let mut related = <#related as ::orca::Model>::zeroed();
                        ::orca::Record::set_primary_key(&mut related, value)?;
                        self.#ident = Some(Box::new(related));
                    }
                }
            },
        }
    });
    let single = model
        .fields
        .iter()
        .filter(|f| f.kind.is_relation() && f.kind != FieldKind::ReverseMany)
        .filter_map(|f| f.related.as_ref().map(|related| (f, related)))
        .collect::<Vec<_>>();
    let related_arms = single.iter().map(|(f, _)| {
        let (key, ident) = (&f.name, &f.ident);
        quote! {
            #key => self.#ident.as_deref().map(|v| v as &dyn ::orca::Record),
        }
    });
    let related_mut_arms = single.iter().map(|(f, related)| {
        let (key, ident) = (&f.name, &f.ident);
        quote! {
            #key => Some(
                self.#ident
                    .get_or_insert_with(|| Box::new(<#related as ::orca::Model>::zeroed()))
                    .as_mut() as &mut dyn ::orca::Record,
            ),
        }
    });
    let zeroed = model.fields.iter().map(|f| {
        let (ident, ty) = (&f.ident, &f.ty);
        match f.kind {
            FieldKind::Column => quote!(#ident: <#ty as ::orca::AsValue>::zero()),
            FieldKind::ReverseMany => quote!(#ident: Vec::new()),
            _ => quote!(#ident: None),
        }
    });
    quote! {
        const _: () = {
            static DEFINITION: ::orca::ModelDef = ::orca::ModelDef {
                name: concat!(module_path!(), "::", stringify!(#name)),
                table: #table,
                fields: &[#(#field_defs),*],
            };

            impl ::orca::Record for #name {
                fn model_def(&self) -> &'static ::orca::ModelDef {
                    &DEFINITION
                }

                fn get_value(&self, field: &str) -> ::orca::Result<::orca::Value> {
                    match field {
                        #(#get_arms)*
                        _ => Err(::orca::unknown_field_error(DEFINITION.name, field)),
                    }
                }

                fn set_value(&mut self, field: &str, value: ::orca::Value) -> ::orca::Result<()> {
                    match field {
                        #(#set_arms)*
                        _ => return Err(::orca::unknown_field_error(DEFINITION.name, field)),
                    }
                    Ok(())
                }

                #[allow(unused_variables)]
                fn related(&self, field: &str) -> Option<&dyn ::orca::Record> {
                    match field {
                        #(#related_arms)*
                        _ => None,
                    }
                }

                #[allow(unused_variables)]
                fn related_mut(&mut self, field: &str) -> Option<&mut dyn ::orca::Record> {
                    match field {
                        #(#related_mut_arms)*
                        _ => None,
                    }
                }
            }

            impl ::orca::Model for #name {
                fn definition() -> &'static ::orca::ModelDef {
                    &DEFINITION
                }

                fn zeroed() -> Self {
                    Self {
                        #(#zeroed),*
                    }
                }
            }
        };
    }
}
