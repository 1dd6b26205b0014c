use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Generates `changed_fields()` listing every `Option` field that is `Some`,
/// used to report what a partial update actually touches.
#[proc_macro_derive(ChangedFields)]
pub fn changed_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let struct_name = &input.ident;

    let fields = match &input.data {
        syn::Data::Struct(syn::DataStruct { fields: syn::Fields::Named(fields), .. }) => fields,
        _ => {
            return syn::Error::new_spanned(struct_name, "ChangedFields supports structs with named fields only")
                .to_compile_error()
                .into();
        }
    };

    let checks = fields.named.iter().filter_map(|field| {
        let field_name = field.ident.as_ref()?;
        let syn::Type::Path(type_path) = &field.ty else {
            return None;
        };
        if type_path.path.segments.last()?.ident != "Option" {
            return None;
        }
        Some(quote! {
            if self.#field_name.is_some() {
                fields.push(stringify!(#field_name));
            }
        })
    });

    let expanded = quote! {
        impl #struct_name {
            pub fn changed_fields(&self) -> Vec<&'static str> {
                let mut fields = Vec::new();
                #(#checks)*
                fields
            }
        }
    };

    TokenStream::from(expanded)
}
