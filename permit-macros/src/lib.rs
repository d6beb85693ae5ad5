use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, quote_spanned};
use syn::spanned::Spanned;
use syn::{parse_macro_input, FnArg, ImplItem, ImplItemFn, ItemImpl};

/// Declares outcome handlers on an owner type and generates its `HandlerTable`.
///
/// # Usage
///
/// ```ignore
/// #[outcome_handlers]
/// impl CameraScreen {
///     #[permit(request = 7, outcome = granted)]
///     fn open_camera(&mut self) {
///         // ...
///     }
///
///     #[permit(request = 7, outcome = denied)]
///     #[permit(request = 7, outcome = permanently_blocked)]
///     fn camera_refused(&mut self, event: &permit::OutcomeEvent) -> anyhow::Result<()> {
///         // ...
///         Ok(())
///     }
/// }
/// ```
///
/// `outcome` is one of `granted`, `denied`, `explain` (alias `rationale`) or
/// `permanently_blocked` (alias `never_ask_again`). Handler methods take
/// `&self` or `&mut self`, optionally followed by `&OutcomeEvent`, and return
/// `()` or a `Result<(), E>` convertible into `anyhow::Error`.
///
/// This will generate, next to the impl block:
///
/// ```ignore
/// impl permit::HandlerTable for CameraScreen {
///     fn register_handlers(registry: &permit::OutcomeRegistry) {
///         registry.register::<Self, _, _>(7, permit::OutcomeKind::Granted, |owner, _event| {
///             Self::open_camera(owner)
///         });
///         // ...
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn outcome_handlers(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return syn::Error::new(
            TokenStream2::from(args).span(),
            "#[outcome_handlers] takes no arguments",
        )
        .to_compile_error()
        .into();
    }

    let mut item = parse_macro_input!(input as ItemImpl);

    if let Some((_, path, _)) = &item.trait_ {
        return syn::Error::new(
            path.span(),
            "#[outcome_handlers] goes on an inherent impl block",
        )
        .to_compile_error()
        .into();
    }

    let mut registrations = Vec::new();
    let mut errors = Vec::new();

    for impl_item in item.items.iter_mut() {
        if let ImplItem::Fn(method) = impl_item {
            match extract_bindings(method) {
                Ok(bindings) => {
                    for binding in bindings {
                        match registration(method, &binding) {
                            Ok(tokens) => registrations.push(tokens),
                            Err(e) => errors.push(e.to_compile_error()),
                        }
                    }
                }
                Err(e) => errors.push(e.to_compile_error()),
            }
        }
    }

    let self_ty = &item.self_ty;
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    let expanded = quote! {
        #item

        impl #impl_generics ::permit::HandlerTable for #self_ty #where_clause {
            fn register_handlers(registry: &::permit::OutcomeRegistry) {
                #(#registrations)*
            }
        }

        #(#errors)*
    };

    TokenStream::from(expanded)
}

/// One `#[permit(request = .., outcome = ..)]` on a method
struct Binding {
    request: syn::Expr,
    outcome: syn::Ident,
    span: proc_macro2::Span,
}

/// Pull every `#[permit(...)]` off a method, leaving its other attributes alone
fn extract_bindings(method: &mut ImplItemFn) -> syn::Result<Vec<Binding>> {
    let mut bindings = Vec::new();
    let mut kept = Vec::with_capacity(method.attrs.len());

    for attr in method.attrs.drain(..) {
        if !attr.path().is_ident("permit") {
            kept.push(attr);
            continue;
        }

        let mut request = None;
        let mut outcome = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("request") {
                request = Some(meta.value()?.parse::<syn::Expr>()?);
                Ok(())
            } else if meta.path.is_ident("outcome") {
                outcome = Some(meta.value()?.parse::<syn::Ident>()?);
                Ok(())
            } else {
                Err(meta.error("expected `request` or `outcome`"))
            }
        })?;

        let span = attr.span();
        let missing = |what: &str| syn::Error::new(span, format!("missing `{}`", what));
        let request = request.ok_or_else(|| missing("request = <id>"))?;
        let outcome = outcome.ok_or_else(|| missing("outcome = <kind>"))?;
        bindings.push(Binding {
            request,
            outcome,
            span,
        });
    }

    method.attrs = kept;
    Ok(bindings)
}

/// Map an outcome identifier to its `OutcomeKind` variant
fn outcome_variant(outcome: &syn::Ident) -> syn::Result<syn::Ident> {
    let variant = match outcome.to_string().as_str() {
        "granted" => "Granted",
        "denied" => "Denied",
        "explain" | "rationale" => "Explain",
        "permanently_blocked" | "never_ask_again" => "PermanentlyBlocked",
        other => {
            return Err(syn::Error::new(
                outcome.span(),
                format!(
                    "unknown outcome `{}`, expected granted, denied, explain or permanently_blocked",
                    other
                ),
            ))
        }
    };
    Ok(syn::Ident::new(variant, outcome.span()))
}

/// Generate the `registry.register(..)` call for one binding
fn registration(method: &ImplItemFn, binding: &Binding) -> syn::Result<TokenStream2> {
    let name = &method.sig.ident;
    let request = &binding.request;
    let variant = outcome_variant(&binding.outcome)?;

    let mut inputs = method.sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() => {}
        _ => {
            return Err(syn::Error::new(
                method.sig.span(),
                "outcome handlers take `&self` or `&mut self`",
            ))
        }
    }

    let call = match inputs.len() {
        0 => quote! { Self::#name(owner) },
        1 => quote! { Self::#name(owner, event) },
        _ => {
            return Err(syn::Error::new(
                method.sig.inputs.span(),
                "outcome handlers take at most one argument besides the receiver: `&OutcomeEvent`",
            ))
        }
    };

    Ok(quote_spanned! {binding.span=>
        registry.register::<Self, _, _>(
            #request,
            ::permit::OutcomeKind::#variant,
            |owner: &mut Self, event: &::permit::OutcomeEvent| {
                let _ = &event;
                #call
            },
        );
    })
}
