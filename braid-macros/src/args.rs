use proc_macro2::TokenStream;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::{Ident, LitInt, Result};

/// Options accepted by `#[braid::main]` and `#[braid::test]`.
///
/// ```text
/// #[braid::main(blocking_threads = 4, completion_mode = strict)]
/// ```
#[derive(Default)]
pub(crate) struct RuntimeArgs {
    blocking_threads: Option<LitInt>,
    completion_mode: Option<Ident>,
}

impl RuntimeArgs {
    pub(crate) fn parse(&mut self, meta: ParseNestedMeta) -> Result<()> {
        if meta.path.is_ident("blocking_threads") {
            let threads: LitInt = meta.value()?.parse()?;
            if threads.base10_parse::<usize>()? == 0 {
                return Err(meta.error("blocking_threads must be > 0"));
            }

            self.blocking_threads = Some(threads);
            return Ok(());
        }

        if meta.path.is_ident("completion_mode") {
            let mode: Ident = meta.value()?.parse()?;
            if mode != "strict" && mode != "lenient" {
                return Err(meta.error("completion_mode must be `strict` or `lenient`"));
            }

            self.completion_mode = Some(mode);
            return Ok(());
        }

        Err(meta.error("unsupported runtime option"))
    }

    /// Expression building the configured runtime.
    pub(crate) fn builder(&self) -> TokenStream {
        let mut builder = quote!(::braid::RuntimeBuilder::new());

        if let Some(threads) = &self.blocking_threads {
            builder = quote!(#builder.blocking_threads(#threads));
        }

        if let Some(mode) = &self.completion_mode {
            let mode = if mode == "strict" {
                quote!(::braid::promise::CompletionMode::Strict)
            } else {
                quote!(::braid::promise::CompletionMode::Lenient)
            };
            builder = quote!(#builder.completion_mode(#mode));
        }

        quote!(#builder.build())
    }
}
