use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

mod element_meta;
use element_meta::{parse_element_info, parse_properties};

/// Derives `streamctl::factory::ElementType` and submits the element's
/// metadata to the inventory so the factory registry can discover it.
///
/// The struct must implement `Default` and `streamctl::core::Element`.
#[proc_macro_derive(StreamElement, attributes(element_meta, property))]
pub fn derive_stream_element(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let element_info = match parse_element_info(&input) {
        Ok(info) => info,
        Err(e) => return e.write_errors().into(),
    };

    let properties = match parse_properties(&input) {
        Ok(props) => props,
        Err(e) => return e.write_errors().into(),
    };

    let struct_name = &input.ident;
    let type_name = &element_info.type_name;
    let description = element_info.description.as_deref().unwrap_or("");

    let sink_template = match &element_info.sink {
        Some(caps) => quote! { Some(#caps.to_string()) },
        None => quote! { None },
    };
    let src_template = match &element_info.src {
        Some(caps) => quote! { Some(#caps.to_string()) },
        None => quote! { None },
    };

    let property_schemas = properties.iter().filter_map(|p| {
        let name = p.property_name()?;
        let kind = property_kind(&p.ty);
        let default_val = p.default.as_deref().unwrap_or("null");
        let min = option_tokens(p.min);
        let max = option_tokens(p.max);

        Some(quote! {
            ::streamctl::factory::PropertySchema::new(
                #name,
                ::streamctl::factory::PropertyKind::#kind,
                #default_val,
                #min,
                #max,
            )
        })
    });

    let mod_name = syn::Ident::new(
        &format!("__element_registration_{}", struct_name.to_string().to_lowercase()),
        struct_name.span(),
    );

    let factory_fn_name = syn::Ident::new(
        &format!("create_metadata_{}", struct_name.to_string().to_lowercase()),
        struct_name.span(),
    );

    let expanded = quote! {
        impl ::streamctl::factory::ElementType for #struct_name {
            fn metadata() -> ::streamctl::factory::ElementMetadata {
                ::streamctl::factory::ElementMetadata {
                    type_name: #type_name.to_string(),
                    description: #description.to_string(),
                    sink_template: #sink_template,
                    src_template: #src_template,
                    properties: vec![#(#property_schemas),*],
                    factory: || -> ::std::boxed::Box<dyn ::streamctl::core::Element> {
                        ::std::boxed::Box::new(<#struct_name as ::core::default::Default>::default())
                    },
                }
            }
        }

        #[doc(hidden)]
        mod #mod_name {
            use super::*;

            fn #factory_fn_name() -> ::streamctl::factory::ElementMetadata {
                <#struct_name as ::streamctl::factory::ElementType>::metadata()
            }

            ::streamctl::factory::inventory::submit! {
                ::streamctl::factory::ElementRegistration(#factory_fn_name)
            }
        }
    };

    TokenStream::from(expanded)
}

fn option_tokens(value: Option<f64>) -> proc_macro2::TokenStream {
    match value {
        Some(v) => quote! { Some(#v) },
        None => quote! { None },
    }
}

fn property_kind(ty: &syn::Type) -> proc_macro2::TokenStream {
    let type_str = quote!(#ty).to_string();

    if type_str.contains("f64") || type_str.contains("f32") {
        quote! { Number }
    } else if type_str.contains("u32") || type_str.contains("i32")
        || type_str.contains("u64") || type_str.contains("i64")
        || type_str.contains("usize") || type_str.contains("isize") {
        quote! { Integer }
    } else if type_str.contains("String") || type_str.contains("str") {
        quote! { String }
    } else if type_str.contains("bool") {
        quote! { Boolean }
    } else {
        quote! { Any }
    }
}
