mod args;

use args::RuntimeArgs;

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Error, Expr, ItemFn, Token, parse_macro_input};

/// Runs an `async fn main` on a Braid runtime.
///
/// ```rust,ignore
/// #[braid::main(blocking_threads = 2)]
/// async fn main() {
///     let sum = task::spawn_blocking(|| (1..=100u64).sum::<u64>()).await;
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = RuntimeArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return Error::new_spanned(input.sig.fn_token, "#[braid::main] must be used on an async function")
            .to_compile_error()
            .into();
    }

    wrap(input, &args, quote!()).into()
}

/// Runs an `async fn` test on a fresh Braid runtime.
///
/// Accepts the same options as [`macro@main`].
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = RuntimeArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return Error::new_spanned(input.sig.fn_token, "#[braid::test] must be used on an async function")
            .to_compile_error()
            .into();
    }

    wrap(input, &args, quote!(#[::core::prelude::v1::test])).into()
}

/// Turns `async fn f() -> T { body }` into `fn f() -> T` blocking on `body`.
fn wrap(mut input: ItemFn, args: &RuntimeArgs, extra: proc_macro2::TokenStream) -> proc_macro2::TokenStream {
    input.sig.asyncness = None;

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let builder = args.builder();

    quote! {
        #extra
        #(#attrs)*
        #vis #sig {
            let runtime = #builder;
            runtime.block_on(async move #block)
        }
    }
}

/// Awaits every future concurrently and returns their outputs as a tuple.
///
/// ```rust,ignore
/// let (a, b) = join!(fetch(1), fetch(2));
/// ```
#[proc_macro]
pub fn join(input: TokenStream) -> TokenStream {
    let futures = parse_macro_input!(input with Punctuated::<Expr, Token![,]>::parse_terminated);
    let futures: Vec<_> = futures.into_iter().collect();

    match futures.as_slice() {
        [] => return quote!(()).into(),
        [single] => return quote!((#single).await).into(),
        _ => {}
    }

    let slots: Vec<_> = (0..futures.len()).map(|i| format_ident!("__braid_future{i}")).collect();
    let outputs: Vec<_> = (0..futures.len()).map(|i| format_ident!("__braid_output{i}")).collect();

    quote! {{
        #(
            let mut #slots = ::std::boxed::Box::pin(#futures);
            let mut #outputs = ::core::option::Option::None;
        )*

        ::std::future::poll_fn(move |cx| {
            use ::std::future::Future;
            use ::std::task::Poll;

            #(
                if #outputs.is_none() {
                    if let Poll::Ready(output) = #slots.as_mut().poll(cx) {
                        #outputs = ::core::option::Option::Some(output);
                    }
                }
            )*

            if true #(&& #outputs.is_some())* {
                Poll::Ready((#(
                    match #outputs.take() {
                        ::core::option::Option::Some(output) => output,
                        ::core::option::Option::None => ::core::unreachable!(),
                    },
                )*))
            } else {
                Poll::Pending
            }
        })
        .await
    }}
    .into()
}

struct Branch {
    future: Expr,
    handler: Expr,
}

struct Branches(Vec<Branch>);

impl Parse for Branches {
    /// Parses `future => handler` branches separated by commas.
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut branches = Vec::new();

        while !input.is_empty() {
            let future = input.parse()?;
            input.parse::<Token![=>]>()?;
            let handler = input.parse()?;

            branches.push(Branch { future, handler });

            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }

        Ok(Branches(branches))
    }
}

/// Awaits the first future to complete and applies its handler.
///
/// The other futures are dropped. Futures are polled in branch order, so
/// an earlier branch wins when several are ready together.
///
/// ```rust,ignore
/// let outcome = select! {
///     queue.get() => |item| Some(item),
///     sleep(Duration::from_secs(1)) => |_| None,
/// };
/// ```
#[proc_macro]
pub fn select(input: TokenStream) -> TokenStream {
    let Branches(branches) = parse_macro_input!(input as Branches);

    if branches.is_empty() {
        return quote!(()).into();
    }

    let futures: Vec<_> = branches.iter().map(|branch| &branch.future).collect();
    let handlers: Vec<_> = branches.iter().map(|branch| &branch.handler).collect();
    let slots: Vec<_> = (0..branches.len()).map(|i| format_ident!("__braid_future{i}")).collect();
    let variants: Vec<_> = (0..branches.len()).map(|i| format_ident!("Branch{i}")).collect();
    let generics: Vec<_> = (0..branches.len()).map(|i| format_ident!("T{i}")).collect();

    quote! {{
        enum __BraidSelected<#(#generics),*> {
            #(#variants(#generics),)*
        }

        // Gives the handler its argument type up front.
        fn __braid_apply<T, R>(output: T, handler: impl ::core::ops::FnOnce(T) -> R) -> R {
            handler(output)
        }

        #(let mut #slots = ::std::boxed::Box::pin(#futures);)*

        let selected = ::std::future::poll_fn(|cx| {
            use ::std::future::Future;
            use ::std::task::Poll;

            #(
                if let Poll::Ready(output) = #slots.as_mut().poll(cx) {
                    return Poll::Ready(__BraidSelected::#variants(output));
                }
            )*

            Poll::Pending
        })
        .await;

        match selected {
            #(__BraidSelected::#variants(output) => __braid_apply(output, #handlers),)*
        }
    }}
    .into()
}
