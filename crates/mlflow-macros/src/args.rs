use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Expr, Ident, Meta, Token};

/// Options accepted by `#[trace(...)]`.
#[derive(Default)]
pub(crate) struct TraceArgs {
    pub name: Option<Expr>,
    pub span_type: Option<Expr>,
    pub attributes: Option<Expr>,
    pub skip: Vec<Ident>,
}

impl Parse for TraceArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = TraceArgs::default();
        let metas = Punctuated::<Meta, Token![,]>::parse_terminated(input)?;

        for meta in metas {
            match meta {
                Meta::NameValue(nv) if nv.path.is_ident("name") => {
                    set_once(&mut args.name, nv.value, &nv.path)?;
                }
                Meta::NameValue(nv) if nv.path.is_ident("span_type") => {
                    set_once(&mut args.span_type, nv.value, &nv.path)?;
                }
                Meta::NameValue(nv) if nv.path.is_ident("attributes") => {
                    set_once(&mut args.attributes, nv.value, &nv.path)?;
                }
                Meta::List(list) if list.path.is_ident("skip") => {
                    let idents =
                        list.parse_args_with(Punctuated::<Ident, Token![,]>::parse_terminated)?;
                    args.skip.extend(idents);
                }
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "unknown `trace` option; expected `name = ..`, `span_type = ..`, `attributes = ..` or `skip(..)`",
                    ));
                }
            }
        }

        Ok(args)
    }
}

fn set_once(slot: &mut Option<Expr>, value: Expr, path: &syn::Path) -> syn::Result<()> {
    if slot.is_some() {
        return Err(syn::Error::new_spanned(path, "duplicate `trace` option"));
    }
    *slot = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_options() {
        let args: TraceArgs = syn::parse_str(
            r#"name = "custom", span_type = SpanType::Llm, attributes = attrs(), skip(client, cache)"#,
        )
        .unwrap();
        assert!(args.name.is_some());
        assert!(args.span_type.is_some());
        assert!(args.attributes.is_some());
        assert_eq!(args.skip.len(), 2);
    }

    #[test]
    fn empty_arguments_are_allowed() {
        let args: TraceArgs = syn::parse_str("").unwrap();
        assert!(args.name.is_none() && args.skip.is_empty());
    }

    #[test]
    fn rejects_unknown_and_duplicate_options() {
        assert!(syn::parse_str::<TraceArgs>("level = 3").is_err());
        assert!(syn::parse_str::<TraceArgs>(r#"name = "a", name = "b""#).is_err());
    }
}
