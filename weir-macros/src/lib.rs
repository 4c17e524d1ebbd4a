//! Helper macro for developing weir transforms.
//!
//! The weir [`config::Callback`](../weir/config/type.Callback.html) requires a return signature
//! of `std::pin::Pin<Box<dyn core::future::Future<Output = Result<ExecutionType, Error>> + Send>>`.
//! This attribute accepts a plain `Fn(conf: Value) -> Result<ExecutionType, Error>` and rewrites
//! it into the pinned-future shape the registry expects, so factory bodies can be written as
//! ordinary synchronous-looking functions (even though most do perform `.await`s internally).
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, ReturnType};

/// Rewrites `fn name(conf: Value) -> Result<ExecutionType, Error> { body }` into
/// `fn name(conf: Value) -> Pin<Box<dyn Future<...> + Send>> { Box::pin(async move { body }) }`.
///
/// Mutates the parsed [`ItemFn`] in place rather than re-assembling its
/// pieces token by token, so the original item's visibility, attributes, and
/// generics carry over untouched.
#[proc_macro_attribute]
pub fn transform_registration_func(_attr: TokenStream, input: TokenStream) -> TokenStream {
    let mut func = parse_macro_input!(input as ItemFn);

    if let Some(asyncness) = func.sig.asyncness {
        return syn::Error::new_spanned(
            asyncness,
            "transform_registration_func: body is wrapped in an async block by this attribute; \
             declare it as a plain `fn`, not `async fn`",
        )
        .to_compile_error()
        .into();
    }

    let body = *func.block;
    func.sig.output = pinned_future_return_type();
    func.block = Box::new(syn::parse_quote!({ Box::pin(async move #body) }));

    quote!(#func).into()
}

fn pinned_future_return_type() -> ReturnType {
    syn::parse_str("-> std::pin::Pin<Box<dyn core::future::Future<Output = Result<ExecutionType, Error>> + Send>>")
        .expect("pinned future return type is valid Rust syntax")
}
