use proc_macro::TokenStream;
use proc_macro_crate::{FoundCrate, crate_name};
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{FnArg, ItemFn, Pat, ReturnType, Type, parse_macro_input};

mod args;

use args::TraceArgs;

const RUNTIME_PACKAGE: &str = "mlflow-entities";

/// Records every call of the annotated function as a span.
///
/// Arguments are captured as span inputs by name (minus `self` and anything
/// listed in `skip(..)`), the return value becomes the span output, and the span
/// nests under whatever span is active on the calling thread or task.
///
/// ```ignore
/// #[trace(span_type = SpanType::Llm, name = "completion", skip(client))]
/// async fn complete(client: &Client, prompt: &str) -> anyhow::Result<String> { .. }
/// ```
///
/// Functions returning a type named `Result` record `Err` values as span
/// errors; panics are recorded and then resumed either way.
#[proc_macro_attribute]
pub fn trace(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as TraceArgs);
    let function = parse_macro_input!(item as ItemFn);

    expand_trace(args, function)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Absolute path of the runtime crate at the expansion site. Within the runtime
/// crate itself this relies on its `extern crate self as mlflow_entities`.
fn runtime_crate() -> syn::Result<syn::Path> {
    let found = crate_name(RUNTIME_PACKAGE).map_err(|err| {
        syn::Error::new(
            Span::call_site(),
            format!("`#[trace]` needs `{RUNTIME_PACKAGE}` as a dependency: {err}"),
        )
    })?;
    let name = match found {
        FoundCrate::Itself => RUNTIME_PACKAGE.replace('-', "_"),
        FoundCrate::Name(name) => name.replace('-', "_"),
    };
    let ident = syn::Ident::new(&name, Span::call_site());
    Ok(syn::parse_quote!(::#ident))
}

fn expand_trace(args: TraceArgs, function: ItemFn) -> syn::Result<TokenStream2> {
    let runtime = runtime_crate()?;
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = function;

    let options = span_options(&runtime, &sig.ident, &args);
    let inputs = captured_inputs(&runtime, &sig.inputs, &args.skip)?;

    let returns_result = match &sig.output {
        ReturnType::Type(_, ty) => is_result_type(ty),
        ReturnType::Default => false,
    };
    let runner = match (sig.asyncness.is_some(), returns_result) {
        (false, false) => format_ident!("traced"),
        (false, true) => format_ident!("traced_result"),
        (true, false) => format_ident!("traced_async"),
        (true, true) => format_ident!("traced_async_result"),
    };

    let call = if sig.asyncness.is_some() {
        let body = match &sig.output {
            ReturnType::Type(_, ty) if !contains_impl_trait(ty) => quote! {
                let __mlflow_output: #ty = #block;
                __mlflow_output
            },
            _ => quote! { #block },
        };
        quote! {
            #runtime::trace::#runner(__mlflow_options, __mlflow_inputs, async move { #body }).await
        }
    } else {
        let closure = match &sig.output {
            ReturnType::Type(_, ty) if !contains_impl_trait(ty) => quote! { move || -> #ty #block },
            _ => quote! { move || #block },
        };
        quote! {
            #runtime::trace::#runner(__mlflow_options, __mlflow_inputs, #closure)
        }
    };

    Ok(quote! {
        #(#attrs)*
        #vis #sig {
            let __mlflow_options = #options;
            let __mlflow_inputs = #inputs;
            #call
        }
    })
}

fn span_options(runtime: &syn::Path, ident: &syn::Ident, args: &TraceArgs) -> TokenStream2 {
    let function_name = ident.unraw().to_string();
    let mut options = quote! { #runtime::trace::SpanOptions::for_function(#function_name) };

    if let Some(name) = &args.name {
        options = quote! { #options.with_name(#name) };
    }
    if let Some(span_type) = &args.span_type {
        options = quote! { #options.with_span_type(#span_type) };
    }
    if let Some(attributes) = &args.attributes {
        options = quote! { #options.with_attributes(#attributes) };
    }
    options
}

fn captured_inputs(
    runtime: &syn::Path,
    inputs: &syn::punctuated::Punctuated<FnArg, syn::Token![,]>,
    skip: &[syn::Ident],
) -> syn::Result<TokenStream2> {
    for skipped in skip {
        let known = inputs.iter().any(|arg| match arg {
            FnArg::Typed(pat_type) => {
                matches!(&*pat_type.pat, Pat::Ident(pat) if pat.ident == *skipped)
            }
            FnArg::Receiver(_) => false,
        });
        if !known {
            return Err(syn::Error::new_spanned(
                skipped,
                format!("`{skipped}` is not an argument of this function"),
            ));
        }
    }

    let entries: Vec<TokenStream2> = inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pat_type) => match &*pat_type.pat {
                Pat::Ident(pat) if !skip.contains(&pat.ident) => Some(&pat.ident),
                _ => None,
            },
            FnArg::Receiver(_) => None,
        })
        .map(|ident| {
            let key = ident.unraw().to_string();
            quote! {
                __mlflow_fields.insert(
                    ::std::string::String::from(#key),
                    #runtime::trace::ToTraceValue::to_trace_value(&#ident),
                );
            }
        })
        .collect();

    Ok(quote! {{
        #[allow(unused_mut)]
        let mut __mlflow_fields = #runtime::trace::TraceFields::new();
        #(#entries)*
        __mlflow_fields
    }})
}

fn is_result_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Result"),
        Type::Group(group) => is_result_type(&group.elem),
        Type::Paren(paren) => is_result_type(&paren.elem),
        _ => false,
    }
}

fn contains_impl_trait(ty: &Type) -> bool {
    match ty {
        Type::ImplTrait(_) => true,
        Type::Group(group) => contains_impl_trait(&group.elem),
        Type::Paren(paren) => contains_impl_trait(&paren.elem),
        Type::Reference(reference) => contains_impl_trait(&reference.elem),
        Type::Tuple(tuple) => tuple.elems.iter().any(contains_impl_trait),
        Type::Path(path) => path.path.segments.iter().any(|segment| {
            matches!(&segment.arguments, syn::PathArguments::AngleBracketed(generic)
                if generic.args.iter().any(|arg| {
                    matches!(arg, syn::GenericArgument::Type(inner) if contains_impl_trait(inner))
                }))
        }),
        _ => false,
    }
}
