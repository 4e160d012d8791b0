//! `#[triggers]` attribute implementation.
//!
//! # Overview
//!
//! Applied to an inherent `impl` block, the attribute:
//!
//! 1. strips the marker attributes below from every method, and
//! 2. generates `impl Declare for Type` that replays them as `Markers` calls,
//!    in the order they appear.
//!
//! # Trigger attributes
//!
//! | Attribute | Positional | Descriptor |
//! |-----------|------------|------------|
//! | `#[command("name")]` | command name | `TriggerDescriptor::command` |
//! | `#[text("regex")]` | pattern | `TriggerDescriptor::text` |
//! | `#[callback("regex")]` | pattern | `TriggerDescriptor::callback` |
//! | `#[membership(joined)]` | `joined` / `left` / `any` | `TriggerDescriptor::membership` |
//! | `#[inline_query]`, `#[inline_query("regex")]` | optional pattern | `TriggerDescriptor::inline_query` |
//! | `#[catch_all]` | none | `TriggerDescriptor::catch_all` |
//! | `#[shared(expr)]` | `Arc<TriggerDescriptor>` expression | `Markers::mark_shared` |
//!
//! Options shared by trigger attributes:
//!
//! | Key | Effect |
//! |-----|--------|
//! | `entry` / `fallback` / `state = "KEY"` | conversation role |
//! | `admin` | admin-only |
//! | `block = false` | non-blocking |
//! | `other = expr` | forwarded with `.option("other", expr)` |
//!
//! # Other attributes
//!
//! - `#[on_error]`, `#[on_error(block = false)]`: error interceptor.
//! - `#[job(daily = "08:30", days = "mon,fri", name = "...")]`: scheduled job.
//!   Exactly one of `once_after`, `repeating`, `daily`, `monthly`, `custom`.

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{
    Attribute, Expr, Ident, ImplItem, ItemImpl, Lit, LitStr, Path, Token,
    ext::IdentExt,
    parse::{Parse, ParseStream},
    punctuated::Punctuated,
    spanned::Spanned,
};

const TRIGGER_ATTRS: &[&str] = &[
    "command",
    "text",
    "callback",
    "membership",
    "inline_query",
    "catch_all",
    "shared",
];

// ─── Arguments ───────────────────────────────────────────────────────────────

/// `#[triggers(crate = path)]`
pub struct TriggersArgs {
    core: Path,
}

impl Default for TriggersArgs {
    fn default() -> Self {
        Self {
            core: syn::parse_quote!(::switchyard::core),
        }
    }
}

impl Parse for TriggersArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = Self::default();
        if input.is_empty() {
            return Ok(args);
        }
        input.parse::<Token![crate]>()?;
        input.parse::<Token![=]>()?;
        args.core = if input.peek(LitStr) {
            input.parse::<LitStr>()?.parse()?
        } else {
            input.parse()?
        };
        Ok(args)
    }
}

/// One item inside a marker attribute's parentheses.
enum Arg {
    Value(LitStr),
    Flag(Ident),
    Pair(Ident, Expr),
}

impl Parse for Arg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            return Ok(Self::Value(input.parse()?));
        }
        let key: Ident = input.call(Ident::parse_any)?;
        if input.peek(Token![=]) {
            input.parse::<Token![=]>()?;
            Ok(Self::Pair(key, input.parse()?))
        } else {
            Ok(Self::Flag(key))
        }
    }
}

fn parse_args(attr: &Attribute) -> syn::Result<Vec<Arg>> {
    match &attr.meta {
        syn::Meta::Path(_) => Ok(Vec::new()),
        _ => Ok(attr
            .parse_args_with(Punctuated::<Arg, Token![,]>::parse_terminated)?
            .into_iter()
            .collect()),
    }
}

// ─── Descriptor generation ───────────────────────────────────────────────────

/// One `Markers` call to emit.
enum Mark {
    Trigger(TokenStream),
    Shared(Expr),
    Error(TokenStream),
    Job(TokenStream),
}

fn kind_name(attr: &Attribute) -> Option<String> {
    let ident = attr.path().get_ident()?.to_string();
    let known = TRIGGER_ATTRS.contains(&ident.as_str()) || ident == "on_error" || ident == "job";
    known.then_some(ident)
}

fn lit_expr(expr: &Expr) -> Option<&Lit> {
    match expr {
        Expr::Lit(lit) => Some(&lit.lit),
        _ => None,
    }
}

/// `role = entry` / `role = fallback`; states use `state = "KEY"`.
fn role(key: &Ident, expr: &Expr) -> syn::Result<TokenStream> {
    let name = match expr {
        Expr::Path(path) => path.path.get_ident().map(Ident::to_string),
        Expr::Lit(syn::ExprLit { lit: Lit::Str(s), .. }) => Some(s.value()),
        _ => None,
    };
    match name.as_deref() {
        Some("entry") => Ok(quote!(.entry())),
        Some("fallback") => Ok(quote!(.fallback())),
        _ => Err(syn::Error::new(
            key.span(),
            "`role` must be `entry` or `fallback`; use `state = \"KEY\"` for states",
        )),
    }
}

fn trigger(core: &Path, kind: &str, attr: &Attribute) -> syn::Result<Mark> {
    if kind == "shared" {
        return Ok(Mark::Shared(attr.parse_args()?));
    }

    let args = parse_args(attr)?;
    let mut value: Option<&LitStr> = None;
    let mut membership: Option<&Ident> = None;
    let mut modifiers = Vec::new();

    for arg in &args {
        match arg {
            Arg::Value(lit) if value.is_none() => value = Some(lit),
            Arg::Value(lit) => return Err(syn::Error::new(lit.span(), "duplicate pattern")),
            Arg::Flag(flag) => match flag.to_string().as_str() {
                "joined" | "left" | "any" if kind == "membership" => membership = Some(flag),
                "entry" => modifiers.push(quote!(.entry())),
                "fallback" => modifiers.push(quote!(.fallback())),
                "admin" => modifiers.push(quote!(.admin_only())),
                other => {
                    return Err(syn::Error::new(
                        flag.span(),
                        format!("unknown flag `{other}` on #[{kind}]"),
                    ));
                }
            },
            Arg::Pair(key, expr) => match key.to_string().as_str() {
                "state" => modifiers.push(quote!(.state(#expr))),
                "role" => modifiers.push(role(key, expr)?),
                "block" => modifiers.push(quote!(.blocking(#expr))),
                other => modifiers.push(quote!(.option(#other, #expr))),
            },
        }
    }

    let require = |what: &str| {
        value.ok_or_else(|| syn::Error::new(attr.span(), format!("#[{kind}] requires a {what}")))
    };

    let base = match kind {
        "command" => {
            let name = require("command name")?;
            quote!(#core::TriggerDescriptor::command(#name))
        }
        "text" => {
            let pattern = require("pattern")?;
            quote!(#core::TriggerDescriptor::text(#pattern))
        }
        "callback" => {
            let pattern = require("pattern")?;
            quote!(#core::TriggerDescriptor::callback(#pattern))
        }
        "inline_query" => match value {
            Some(pattern) => quote!(
                #core::TriggerDescriptor::inline_query(::std::option::Option::Some(
                    ::std::string::String::from(#pattern)
                ))
            ),
            None => quote!(#core::TriggerDescriptor::inline_query(::std::option::Option::None)),
        },
        "membership" => {
            let filter = match membership.map(Ident::to_string).as_deref() {
                Some("joined") => quote!(Joined),
                Some("left") => quote!(Left),
                _ => quote!(Any),
            };
            quote!(#core::TriggerDescriptor::membership(#core::MembershipFilter::#filter))
        }
        _ => quote!(#core::TriggerDescriptor::catch_all()),
    };

    Ok(Mark::Trigger(quote!(#base #(#modifiers)*)))
}

fn error_marker(core: &Path, attr: &Attribute) -> syn::Result<Mark> {
    let mut descriptor = quote!(#core::ErrorDescriptor::new());
    for arg in parse_args(attr)? {
        match arg {
            Arg::Pair(key, expr) if key == "block" => descriptor = quote!(#descriptor.blocking(#expr)),
            other => {
                return Err(syn::Error::new(
                    arg_span(&other),
                    "#[on_error] only accepts `block = bool`",
                ));
            }
        }
    }
    Ok(Mark::Error(descriptor))
}

fn arg_span(arg: &Arg) -> Span {
    match arg {
        Arg::Value(lit) => lit.span(),
        Arg::Flag(ident) | Arg::Pair(ident, _) => ident.span(),
    }
}

/// Parses `"HH:MM"` or `"HH:MM:SS"` at expansion time.
fn time_of_day(core: &Path, expr: &Expr) -> syn::Result<TokenStream> {
    let Some(Lit::Str(lit)) = lit_expr(expr) else {
        return Err(syn::Error::new(expr.span(), "expected a \"HH:MM\" string"));
    };
    let parts: Vec<u32> = lit
        .value()
        .split(':')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| syn::Error::new(lit.span(), "expected a \"HH:MM\" string"))?;
    let (h, m, s) = match parts.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(syn::Error::new(lit.span(), "expected a \"HH:MM\" string")),
    };
    if h > 23 || m > 59 || s > 59 {
        return Err(syn::Error::new(lit.span(), "time of day out of range"));
    }
    Ok(quote!(
        ::std::option::Option::unwrap_or_default(
            #core::chrono::NaiveTime::from_hms_opt(#h, #m, #s)
        )
    ))
}

fn weekdays(core: &Path, expr: &Expr) -> syn::Result<TokenStream> {
    let Some(Lit::Str(lit)) = lit_expr(expr) else {
        return Err(syn::Error::new(expr.span(), "expected a \"mon,tue,...\" string"));
    };
    let days = lit
        .value()
        .split(',')
        .map(|day| {
            let variant = match day.trim().to_ascii_lowercase().as_str() {
                "mon" => "Mon",
                "tue" => "Tue",
                "wed" => "Wed",
                "thu" => "Thu",
                "fri" => "Fri",
                "sat" => "Sat",
                "sun" => "Sun",
                other => {
                    return Err(syn::Error::new(
                        lit.span(),
                        format!("unknown weekday `{other}`"),
                    ));
                }
            };
            let variant = Ident::new(variant, lit.span());
            Ok(quote!(#core::chrono::Weekday::#variant))
        })
        .collect::<syn::Result<Vec<_>>>()?;
    Ok(quote!([#(#days),*]))
}

fn secs(expr: &Expr) -> TokenStream {
    quote!(::std::time::Duration::from_secs(#expr))
}

fn set_schedule(
    span: Span,
    tokens: TokenStream,
    schedule: &mut Option<TokenStream>,
) -> syn::Result<()> {
    if schedule.replace(tokens).is_some() {
        return Err(syn::Error::new(span, "#[job] takes exactly one schedule"));
    }
    Ok(())
}

fn job_marker(core: &Path, attr: &Attribute) -> syn::Result<Mark> {
    let args = parse_args(attr)?;
    let mut schedule: Option<TokenStream> = None;
    let mut day: Option<&Expr> = None;
    let mut monthly_time: Option<TokenStream> = None;
    let mut modifiers = Vec::new();

    for arg in &args {
        let Arg::Pair(key, expr) = arg else {
            return Err(syn::Error::new(arg_span(arg), "#[job] only accepts `key = value` pairs"));
        };
        match key.to_string().as_str() {
            "once_after" => {
                let delay = secs(expr);
                set_schedule(
                    key.span(),
                    quote!(#core::JobDescriptor::once_after(#delay)),
                    &mut schedule,
                )?
            }
            "repeating" => {
                let interval = secs(expr);
                set_schedule(
                    key.span(),
                    quote!(#core::JobDescriptor::repeating(#interval)),
                    &mut schedule,
                )?
            }
            "daily" => {
                let time = time_of_day(core, expr)?;
                set_schedule(key.span(), quote!(#core::JobDescriptor::daily(#time)), &mut schedule)?
            }
            "monthly" => {
                monthly_time = Some(time_of_day(core, expr)?);
                set_schedule(key.span(), TokenStream::new(), &mut schedule)?
            }
            "custom" => set_schedule(
                key.span(),
                quote!(#core::JobDescriptor::custom(#expr)),
                &mut schedule,
            )?,
            "day" => day = Some(expr),
            "first" => {
                let delay = secs(expr);
                modifiers.push(quote!(.first(#delay)));
            }
            "last" => modifiers.push(quote!(.last(#expr))),
            "days" => {
                let days = weekdays(core, expr)?;
                modifiers.push(quote!(.on_days(#days)));
            }
            "name" => modifiers.push(quote!(.name(#expr))),
            "chat" => modifiers.push(quote!(.chat(#expr))),
            "user" => modifiers.push(quote!(.user(#expr))),
            "data" => modifiers.push(quote!(.data(#expr))),
            other => modifiers.push(quote!(.option(#other, #expr))),
        }
    }

    let base = match (monthly_time, schedule) {
        (Some(time), _) => {
            let day = day.ok_or_else(|| {
                syn::Error::new(attr.span(), "#[job(monthly = ...)] requires `day = N`")
            })?;
            quote!(#core::JobDescriptor::monthly(#time, #day))
        }
        (None, Some(base)) => base,
        (None, None) => {
            return Err(syn::Error::new(
                attr.span(),
                "#[job] requires one of once_after, repeating, daily, monthly, custom",
            ));
        }
    };

    Ok(Mark::Job(quote!(#base #(#modifiers)*)))
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub fn expand(args: TriggersArgs, mut item: ItemImpl) -> syn::Result<TokenStream> {
    if let Some((_, trait_path, _)) = &item.trait_ {
        return Err(syn::Error::new(
            trait_path.span(),
            "#[triggers] goes on an inherent impl block",
        ));
    }
    let core = &args.core;
    let mut calls = Vec::new();

    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let ident = method.sig.ident.clone();
        let name = ident.to_string();

        let mut kept = Vec::with_capacity(method.attrs.len());
        for attr in method.attrs.drain(..) {
            let Some(kind) = kind_name(&attr) else {
                kept.push(attr);
                continue;
            };
            let mark = match kind.as_str() {
                "on_error" => error_marker(core, &attr)?,
                "job" => job_marker(core, &attr)?,
                _ => trigger(core, &kind, &attr)?,
            };
            calls.push(match mark {
                Mark::Trigger(desc) => quote!(markers.mark(#name, Self::#ident, #desc);),
                Mark::Shared(desc) => quote!(markers.mark_shared(#name, Self::#ident, #desc);),
                Mark::Error(desc) => quote!(markers.mark_error(#name, Self::#ident, #desc);),
                Mark::Job(desc) => quote!(markers.mark_job(#name, Self::#ident, #desc);),
            });
        }
        method.attrs = kept;
    }

    let self_ty = &item.self_ty;
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    Ok(quote! {
        #item

        impl #impl_generics #core::Declare for #self_ty #where_clause {
            fn declare(markers: &mut #core::Markers<Self>) {
                #(#calls)*
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_str(item: ItemImpl) -> String {
        let args: TriggersArgs = syn::parse_quote!(crate = ::switchyard_core);
        expand(args, item).unwrap().to_string()
    }

    #[test]
    fn test_strips_markers_and_declares() {
        let out = expand_str(syn::parse_quote! {
            impl Bind {
                #[command("bind", entry)]
                #[callback("^bind:", role = entry, block = false)]
                async fn start(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
                    Ok(Flow::Continue)
                }

                #[text(r"^\d{9}$", state = "UID")]
                #[doc = "kept"]
                async fn uid(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
                    Ok(Flow::End)
                }
            }
        });
        assert!(!out.contains("# [command"));
        assert!(out.contains("# [doc = \"kept\"]"));
        assert!(out.contains("impl :: switchyard_core :: Declare for Bind"));
        assert_eq!(out.matches("markers . mark (\"start\"").count(), 2);
        assert!(out.contains(". state (\"UID\")"));
        assert_eq!(out.matches(". entry ()").count(), 2);
        assert!(out.contains(". blocking (false)"));
    }

    #[test]
    fn test_job_schedules() {
        let out = expand_str(syn::parse_quote! {
            impl Daily {
                #[job(daily = "08:30", days = "mon,fri", name = "digest")]
                async fn digest(self: Arc<Self>, ctx: JobContext) -> Result<(), BoxError> {
                    Ok(())
                }

                #[job(monthly = "09:00", day = 1)]
                async fn ledger(self: Arc<Self>, ctx: JobContext) -> Result<(), BoxError> {
                    Ok(())
                }
            }
        });
        assert!(out.contains("JobDescriptor :: daily"));
        assert!(out.contains("Weekday :: Mon"));
        assert!(out.contains("Weekday :: Fri"));
        assert!(out.contains("JobDescriptor :: monthly"));
        assert!(out.contains("mark_job (\"ledger\""));
    }

    #[test]
    fn test_rejects_bad_input() {
        let args = TriggersArgs::default();
        let err = expand(
            args,
            syn::parse_quote! {
                impl Broken {
                    #[job(daily = "25:00")]
                    async fn never(self: Arc<Self>, ctx: JobContext) -> Result<(), BoxError> {
                        Ok(())
                    }
                }
            },
        );
        assert!(err.is_err());

        let err = expand(
            TriggersArgs::default(),
            syn::parse_quote! {
                impl Broken {
                    #[command]
                    async fn nameless(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
                        Ok(Flow::Continue)
                    }
                }
            },
        );
        assert!(err.is_err());
    }
}
