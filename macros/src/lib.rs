use proc_macro::TokenStream;
use quote::quote;
use syn::{parse::Parse, parse::ParseStream, parse_macro_input, Expr, FnArg, ItemFn, Lit, Pat, Token, Type};

struct MacroArgs {
    cache_name: String,
    ttl: Option<u64>,
    key_params: Vec<String>,
}

impl Parse for MacroArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut cache_name = None;
        let mut ttl = None;
        let mut key_params = Vec::new();

        while !input.is_empty() {
            let ident: syn::Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            match ident.to_string().as_str() {
                "name" => {
                    let lit: Lit = input.parse()?;
                    if let Lit::Str(s) = lit {
                        cache_name = Some(s.value());
                    } else {
                        return Err(syn::Error::new(lit.span(), "name must be a string literal"));
                    }
                }
                "ttl" => {
                    let lit: Lit = input.parse()?;
                    if let Lit::Int(i) = lit {
                        ttl = Some(i.base10_parse()?);
                    } else {
                        return Err(syn::Error::new(lit.span(), "ttl must be an integer"));
                    }
                }
                "key" => {
                    let expr: Expr = input.parse()?;
                    match expr {
                        Expr::Path(ref path) if path.path.get_ident().is_some() => {
                            key_params.push(path.path.get_ident().unwrap().to_string());
                        }
                        _ => {
                            return Err(syn::Error::new_spanned(
                                expr,
                                "key must be a parameter name",
                            ));
                        }
                    }
                }
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!(
                            "unknown attribute `{}`, expected `name`, `ttl`, or `key`",
                            other
                        ),
                    ));
                }
            }

            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }

        let cache_name = cache_name
            .ok_or_else(|| syn::Error::new(input.span(), "missing required attribute `name`"))?;

        Ok(MacroArgs {
            cache_name,
            ttl,
            key_params,
        })
    }
}

/// Returns true when `ty` is `&CacheOrchestrator` (any path ending in that name).
fn is_orchestrator_ref(ty: &Type) -> bool {
    if let Type::Reference(reference) = ty {
        if let Type::Path(path) = &*reference.elem {
            return path
                .path
                .segments
                .last()
                .is_some_and(|seg| seg.ident == "CacheOrchestrator");
        }
    }
    false
}

/// Caches the `Ok` result of an async function through a `CacheOrchestrator`.
///
/// The function must take a `&CacheOrchestrator` parameter. Keys are built as
/// `"{name}:{key}"`; with several `key` params the tuple's debug form is used.
///
/// ```ignore
/// #[cached(name = "user", ttl = 300, key = id)]
/// async fn load_user(cache: &CacheOrchestrator, db: &Db, id: u64) -> Result<User, AppError> {
///     db.find_user(id).await
/// }
/// ```
#[proc_macro_attribute]
pub fn cached(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as MacroArgs);
    let input_fn = parse_macro_input!(input as ItemFn);

    let cache_name = args.cache_name;
    let fn_name = &input_fn.sig.ident;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;
    let fn_inputs = &input_fn.sig.inputs;
    let fn_output = &input_fn.sig.output;
    let fn_body = &input_fn.block;

    if input_fn.sig.asyncness.is_none() {
        return syn::Error::new_spanned(&input_fn.sig, "#[cached] requires an async fn")
            .to_compile_error()
            .into();
    }

    let mut cache_ident = None;
    let mut param_names = Vec::new();
    for arg in &input_fn.sig.inputs {
        if let FnArg::Typed(pat_type) = arg {
            if let Pat::Ident(pat_ident) = &*pat_type.pat {
                if cache_ident.is_none() && is_orchestrator_ref(&pat_type.ty) {
                    cache_ident = Some(pat_ident.ident.clone());
                } else {
                    param_names.push(pat_ident.ident.clone());
                }
            }
        }
    }

    let Some(cache_ident) = cache_ident else {
        return syn::Error::new_spanned(
            &input_fn.sig,
            "#[cached] functions need a `&CacheOrchestrator` parameter",
        )
        .to_compile_error()
        .into();
    };

    let key_idents: Vec<_> = if args.key_params.is_empty() {
        param_names.clone()
    } else {
        let mut idents = Vec::new();
        for name in &args.key_params {
            match param_names.iter().find(|p| **p == name.as_str()) {
                Some(ident) => idents.push(ident.clone()),
                None => {
                    return syn::Error::new_spanned(
                        &input_fn.sig,
                        format!("key `{}` is not a parameter of this function", name),
                    )
                    .to_compile_error()
                    .into();
                }
            }
        }
        idents
    };

    let cache_key_expr = match key_idents.len() {
        0 => quote! { ::std::string::String::from(#cache_name) },
        1 => {
            let key = &key_idents[0];
            quote! { format!("{}:{}", #cache_name, #key) }
        }
        _ => quote! { format!("{}:{}", #cache_name, format!("{:?}", (#(&#key_idents),*))) },
    };

    let ttl_expr = match args.ttl {
        Some(ttl_val) => quote! { Some(#ttl_val) },
        None => quote! { None },
    };

    let expanded = quote! {
        #(#fn_attrs)*
        #fn_vis async fn #fn_name(#fn_inputs) #fn_output {
            let cache_key = #cache_key_expr;
            let tier_options = ::tiercache::cache::TierOptions::default();

            if let Ok(Some(value)) = #cache_ident.get(&cache_key, tier_options).await {
                return Ok(value);
            }

            let result = (|| async #fn_body)().await;

            if let Ok(ref value) = result {
                let _ = #cache_ident.set(&cache_key, value, #ttl_expr, tier_options).await;
            }

            result
        }
    };

    TokenStream::from(expanded)
}
