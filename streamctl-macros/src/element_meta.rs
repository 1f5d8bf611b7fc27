use darling::{FromAttributes, FromField};
use syn::{DeriveInput, Fields};

/// Parsed attributes from #[element_meta(...)]
#[derive(Debug, FromAttributes)]
#[darling(attributes(element_meta))]
pub struct ElementMetaArgs {
    pub type_name: String,

    #[darling(default)]
    pub description: Option<String>,

    /// Caps template accepted on the input side; absent for sources
    #[darling(default)]
    pub sink: Option<String>,

    /// Caps template produced on the output side; absent for sinks
    #[darling(default)]
    pub src: Option<String>,
}

/// Parsed attributes from #[property(...)]
#[derive(Debug, FromField)]
#[darling(attributes(property))]
pub struct PropertyField {
    pub ident: Option<syn::Ident>,
    pub ty: syn::Type,

    #[darling(default)]
    pub default: Option<String>,

    #[darling(default)]
    pub min: Option<f64>,

    #[darling(default)]
    pub max: Option<f64>,
}

impl PropertyField {
    /// Property names use dashes, like `frame-size` for `frame_size`
    pub fn property_name(&self) -> Option<String> {
        self.ident
            .as_ref()
            .map(|ident| ident.to_string().trim_start_matches('_').replace('_', "-"))
    }
}

pub fn parse_element_info(input: &DeriveInput) -> darling::Result<ElementMetaArgs> {
    ElementMetaArgs::from_attributes(&input.attrs)
}

pub fn parse_properties(input: &DeriveInput) -> darling::Result<Vec<PropertyField>> {
    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => return Ok(Vec::new()),
        },
        _ => {
            return Err(darling::Error::custom("StreamElement can only be derived for structs")
                .with_span(&input.ident))
        }
    };

    fields
        .iter()
        .filter(|f| f.attrs.iter().any(|attr| attr.path().is_ident("property")))
        .map(PropertyField::from_field)
        .collect()
}
