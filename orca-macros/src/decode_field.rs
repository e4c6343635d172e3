use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{
    Error, Field, GenericArgument, Ident, LitStr, PathArguments, Result, Type, parse::ParseBuffer,
    spanned::Spanned,
};

/// How a field is stored, decides the accessors generated for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Column,
    ForeignKey,
    OneToOne,
    ReverseOne,
    ReverseMany,
}

impl FieldKind {
    pub(crate) fn is_relation(&self) -> bool {
        *self != FieldKind::Column
    }
}

pub(crate) struct FieldMetadata {
    pub(crate) ident: Ident,
    pub(crate) ty: Type,
    pub(crate) name: String,
    pub(crate) column: String,
    pub(crate) kind: FieldKind,
    /// `orca::FieldType` variant name.
    pub(crate) field_type: Ident,
    /// The model type behind a relation field.
    pub(crate) related: Option<Type>,
    pub(crate) nullable: bool,
    pub(crate) primary_key: bool,
    pub(crate) auto_increment: bool,
    pub(crate) auto_now: bool,
    pub(crate) auto_now_add: bool,
    pub(crate) default: Option<String>,
    pub(crate) on_delete: Ident,
}

/// The single generic argument of `ty` when its last segment is `wrapper`.
fn peel<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn last_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|v| v.ident.to_string()),
        _ => None,
    }
}

/// Field type of a plain column, from its Rust type.
fn decode_type(ty: &Type) -> Option<&'static str> {
    if peel(ty, "Vec").and_then(last_ident).as_deref() == Some("u8") {
        return Some("Blob");
    }
    Some(match last_ident(ty)?.as_str() {
        "bool" => "Boolean",
        "String" => "VarChar",
        "i8" => "Int8",
        "i16" => "Int16",
        "i32" => "Int32",
        "i64" => "Int64",
        "u8" => "UInt8",
        "u16" => "UInt16",
        "u32" => "UInt32",
        "u64" => "UInt64",
        "f32" => "Float32",
        "f64" => "Float64",
        "Decimal" => "Decimal",
        "Date" => "Date",
        "Time" => "Time",
        "OffsetDateTime" => "DateTime",
        "Value" => "Json",
        _ => return None,
    })
}

fn decode_on_delete(value: &LitStr) -> Result<&'static str> {
    Ok(match value.value().as_str() {
        "cascade" => "Cascade",
        "set_null" => "SetNull",
        "set_default" => "SetDefault",
        "no_action" | "do_nothing" => "NoAction",
        other => {
            return Err(Error::new(
                value.span(),
                format!(
                    "Unknown `on_delete` policy `{}`, expected one of: cascade, set_null, set_default, no_action",
                    other
                ),
            ));
        }
    })
}

fn flag(arg: &syn::meta::ParseNestedMeta, name: &str) -> Result<()> {
    if arg.input.peek(syn::Token![=]) {
        return Err(arg.error(format!(
            "Error while parsing `{}`, use it like: `#[orca({})]`",
            name, name
        )));
    }
    Ok(())
}

pub(crate) fn decode_field(field: &Field) -> Result<FieldMetadata> {
    let Some(ident) = field.ident.clone() else {
        return Err(Error::new(field.span(), "Model fields must be named"));
    };
    let mut name = ident.to_string();
    if let Some(raw) = name.strip_prefix("r#") {
        name = raw.into();
    }
    let mut column = name.trim_start_matches('_').to_string();
    let mut kind = FieldKind::Column;
    let mut field_type = None;
    let mut nullable = false;
    let mut primary_key = false;
    let mut auto_increment = false;
    let mut auto_now = false;
    let mut auto_now_add = false;
    let mut default = None;
    let mut on_delete = None;
    for attr in field.attrs.iter().filter(|v| v.path().is_ident("orca")) {
        attr.parse_nested_meta(|arg| {
            let Some(key) = arg.path.get_ident().map(|v| v.to_string()) else {
                return Err(arg.error("Expected an attribute name"));
            };
            match key.as_str() {
                "column" => {
                    let value = arg.value().and_then(ParseBuffer::parse::<LitStr>).map_err(|_| {
                        arg.error("Error while parsing `column`, use it like: `#[orca(column = \"my_column\")]`")
                    })?;
                    column = value.value();
                }
                "field_type" => {
                    let value = arg.value().and_then(ParseBuffer::parse::<Ident>).map_err(|_| {
                        arg.error("Error while parsing `field_type`, use it like: `#[orca(field_type = Text)]`")
                    })?;
                    field_type = Some(value);
                }
                "default" => {
                    let value = arg.value().and_then(ParseBuffer::parse::<LitStr>).map_err(|_| {
                        arg.error("Error while parsing `default`, use it like: `#[orca(default = \"0\")]`")
                    })?;
                    default = Some(value.value());
                }
                "on_delete" => {
                    let value = arg.value().and_then(ParseBuffer::parse::<LitStr>).map_err(|_| {
                        arg.error("Error while parsing `on_delete`, use it like: `#[orca(on_delete = \"cascade\")]`")
                    })?;
                    on_delete = Some(decode_on_delete(&value)?);
                }
                "primary_key" => {
                    flag(&arg, &key)?;
                    primary_key = true;
                }
                "auto_increment" => {
                    flag(&arg, &key)?;
                    auto_increment = true;
                }
                "auto_now" => {
                    flag(&arg, &key)?;
                    auto_now = true;
                }
                "auto_now_add" => {
                    flag(&arg, &key)?;
                    auto_now_add = true;
                }
                "null" => {
                    flag(&arg, &key)?;
                    nullable = true;
                }
                "foreign_key" | "one_to_one" | "reverse_one" | "reverse_many" => {
                    flag(&arg, &key)?;
                    if kind != FieldKind::Column {
                        return Err(arg.error("A field can declare only one relation"));
                    }
                    kind = match key.as_str() {
                        "foreign_key" => FieldKind::ForeignKey,
                        "one_to_one" => FieldKind::OneToOne,
                        "reverse_one" => FieldKind::ReverseOne,
                        _ => FieldKind::ReverseMany,
                    };
                }
                _ => {
                    return Err(arg.error(format!(
                        "Unknown attribute `{}` inside orca macro",
                        arg.path.to_token_stream()
                    )));
                }
            }
            Ok(())
        })?;
    }
    let ty = field.ty.clone();
    let (field_type, related) = match kind {
        FieldKind::Column => {
            let inner = match peel(&ty, "Option") {
                Some(inner) => {
                    nullable = true;
                    inner
                }
                None => &ty,
            };
            let field_type = match field_type {
                Some(v) => v,
                None => {
                    let Some(decoded) = decode_type(inner) else {
                        return Err(Error::new(
                            ty.span(),
                            format!(
                                "Cannot infer the field type of `{}`, declare it with `#[orca(field_type = ..)]`",
                                name
                            ),
                        ));
                    };
                    Ident::new(decoded, ty.span())
                }
            };
            (field_type, None)
        }
        FieldKind::ReverseMany => {
            let Some(inner) = peel(&ty, "Vec") else {
                return Err(Error::new(
                    ty.span(),
                    format!("The reverse many field `{}` must be a `Vec<Model>`", name),
                ));
            };
            (Ident::new("ReverseMany", ty.span()), Some(inner.clone()))
        }
        _ => {
            let Some(inner) = peel(&ty, "Option").and_then(|v| peel(v, "Box")) else {
                return Err(Error::new(
                    ty.span(),
                    format!("The relation field `{}` must be an `Option<Box<Model>>`", name),
                ));
            };
            let variant = match kind {
                FieldKind::ForeignKey => "ForeignKey",
                FieldKind::OneToOne => "OneToOne",
                _ => "ReverseOne",
            };
            (Ident::new(variant, ty.span()), Some(inner.clone()))
        }
    };
    if on_delete.is_some() && !matches!(kind, FieldKind::ForeignKey | FieldKind::OneToOne) {
        return Err(Error::new(
            field.span(),
            "`on_delete` applies only to `foreign_key` and `one_to_one` fields",
        ));
    }
    if primary_key && nullable {
        return Err(Error::new(field.span(), "A primary key cannot be nullable"));
    }
    Ok(FieldMetadata {
        ident,
        ty,
        name,
        column,
        kind,
        field_type,
        related,
        nullable,
        primary_key,
        auto_increment,
        auto_now,
        auto_now_add,
        default,
        on_delete: Ident::new(on_delete.unwrap_or("NoAction"), field.span()),
    })
}

/// `orca::FieldDef` literal of a decoded field.
pub(crate) fn encode_field_def(field: &FieldMetadata) -> TokenStream {
    let FieldMetadata {
        name,
        column,
        field_type,
        nullable,
        primary_key,
        auto_increment,
        auto_now,
        auto_now_add,
        on_delete,
        ..
    } = field;
    let default = match &field.default {
        Some(v) => quote!(Some(#v)),
        None => quote!(None),
    };
    let related = match &field.related {
        Some(ty) => quote! {
            Some((|| <#ty as ::orca::Model>::definition()) as ::orca::ModelDefFn)
        },
        None => quote!(None),
    };
    quote! {
        ::orca::FieldDef {
            name: #name,
            column: #column,
            field_type: ::orca::FieldType::#field_type,
            nullable: #nullable,
            primary_key: #primary_key,
            auto_increment: #auto_increment,
            auto_now: #auto_now,
            auto_now_add: #auto_now_add,
            default: #default,
            related: #related,
            on_delete: ::orca::Action::#on_delete,
        }
    }
}
