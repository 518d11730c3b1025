use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, Fields, Ident, Type};

#[proc_macro_derive(ClosureTableModel, attributes(closure_table))]
pub fn derive_closure_table_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_closure_table_model(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct Options {
    id_field: Option<String>,
    id_type: Option<Type>,
    sort_field: Option<String>,
    entity_name: Option<String>,
    closure_table: Option<String>,
    ancestor_column: Option<String>,
    descendant_column: Option<String>,
    depth_column: Option<String>,
    root_column: Option<String>,
}

fn impl_closure_table_model(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_ident = &input.ident;

    let data_struct = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "ClosureTableModel can only be derived for structs",
            ))
        }
    };

    let mut options = Options::default();
    let mut table_name: Option<String> = None;

    for attr in &input.attrs {
        if attr.path().is_ident("closure_table") {
            parse_closure_table_attr(attr, &mut options)?;
        }

        if attr.path().is_ident("sea_orm") {
            if let Some(name) = parse_sea_orm_table_name(attr)? {
                table_name = Some(name);
            }
        }
    }

    let id_field_name = options.id_field.unwrap_or_else(|| "id".to_string());
    let sort_field_name = options
        .sort_field
        .unwrap_or_else(|| id_field_name.clone());

    let id_field_ident = Ident::new(&id_field_name, struct_ident.span());
    let sort_field_ident = Ident::new(&sort_field_name, struct_ident.span());

    let mut id_field_type: Option<Type> = options.id_type.clone();
    let mut sort_field_found = false;

    if let Fields::Named(ref fields) = data_struct.fields {
        for field in &fields.named {
            if let Some(ident) = &field.ident {
                if ident == &id_field_ident && id_field_type.is_none() {
                    id_field_type = Some(field.ty.clone());
                }
                if ident == &sort_field_ident {
                    sort_field_found = true;
                }
            }
        }
    } else {
        return Err(syn::Error::new(
            data_struct.fields.span(),
            "ClosureTableModel requires named fields",
        ));
    }

    let id_type = id_field_type.ok_or_else(|| {
        syn::Error::new(
            struct_ident.span(),
            "Unable to determine id field type; specify `id_type = ...` in #[closure_table]",
        )
    })?;

    if !sort_field_found {
        return Err(syn::Error::new(
            struct_ident.span(),
            format!("sort field `{sort_field_name}` is not a field of this struct"),
        ));
    }

    let entity_name = options
        .entity_name
        .unwrap_or_else(|| struct_ident.unraw().to_string());
    let base_table = table_name.unwrap_or_else(|| struct_ident.unraw().to_string());

    let id_column_variant = format_ident!("{}", to_pascal_case(&id_field_name));
    let sort_column_variant = format_ident!("{}", to_pascal_case(&sort_field_name));

    let entity_name_literal = syn::LitStr::new(&entity_name, struct_ident.span());
    let table_literal = syn::LitStr::new(&base_table, struct_ident.span());

    let overrides = [
        ("closure_table", options.closure_table),
        ("ancestor_column", options.ancestor_column),
        ("descendant_column", options.descendant_column),
        ("depth_column", options.depth_column),
        ("root_column", options.root_column),
    ]
    .into_iter()
    .filter_map(|(setter, value)| {
        value.map(|value| {
            let setter = format_ident!("{}", setter);
            let literal = syn::LitStr::new(&value, struct_ident.span());
            quote! { .#setter(#literal) }
        })
    })
    .collect::<Vec<_>>();

    let generated = quote! {
        impl ::closure_table::ClosureTableModel for #struct_ident {
            type Entity = Entity;
            type Id = #id_type;

            fn closure_table_config() -> &'static ::closure_table::ClosureTableConfig {
                static CONFIG: ::closure_table::__private::Lazy<::closure_table::ClosureTableConfig> =
                    ::closure_table::__private::Lazy::new(|| {
                        let base = ::closure_table::ClosureTableConfig::new(
                            #entity_name_literal,
                            #table_literal,
                        );
                        ::closure_table::ClosureTableOptions::default()
                            #(#overrides)*
                            .apply(base)
                    });
                &CONFIG
            }

            fn id(&self) -> Self::Id {
                self.#id_field_ident.clone()
            }

            fn id_to_value(id: &Self::Id) -> ::sea_orm::Value {
                ::sea_orm::Value::from(id.clone())
            }

            fn id_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#id_column_variant
            }

            fn sort_value(&self) -> ::sea_orm::Value {
                ::sea_orm::Value::from(self.#sort_field_ident.clone())
            }

            fn sort_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#sort_column_variant
            }
        }
    };

    Ok(generated.into())
}

fn parse_closure_table_attr(attr: &Attribute, options: &mut Options) -> syn::Result<()> {
    attr.parse_nested_meta(|meta| {
        let ident = meta
            .path
            .get_ident()
            .ok_or_else(|| syn::Error::new(meta.path.span(), "Invalid option key"))?
            .to_string();

        if ident == "id_type" {
            let ty: Type = meta.value()?.parse()?;
            options.id_type = Some(ty);
            return Ok(());
        }

        let slot = match ident.as_str() {
            "id_field" => &mut options.id_field,
            "sort_field" => &mut options.sort_field,
            "entity_name" => &mut options.entity_name,
            "closure_table" => &mut options.closure_table,
            "ancestor_column" => &mut options.ancestor_column,
            "descendant_column" => &mut options.descendant_column,
            "depth_column" => &mut options.depth_column,
            "root_column" => &mut options.root_column,
            other => {
                return Err(syn::Error::new(
                    meta.path.span(),
                    format!("Unsupported closure_table option `{other}`"),
                ));
            }
        };
        let value: syn::LitStr = meta.value()?.parse()?;
        *slot = Some(value.value());

        Ok(())
    })
}

fn parse_sea_orm_table_name(attr: &Attribute) -> syn::Result<Option<String>> {
    let mut table_name: Option<String> = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("table_name") {
            let value: syn::LitStr = meta.value()?.parse()?;
            table_name = Some(value.value());
        } else if meta.input.peek(syn::Token![=]) {
            let _: syn::Expr = meta.value()?.parse()?;
        }
        Ok(())
    })?;
    Ok(table_name)
}

fn to_pascal_case(value: &str) -> String {
    value
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
