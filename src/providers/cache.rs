//! Cache breakpoint planning for outbound payloads.
//!
//! Providers cache prefix-wise, so breakpoints go where the stable prefix
//! ends: the system prompt, the last conversation message, and the last tool
//! definition (one marker covers the whole tool block). The provider's
//! documented breakpoint limit is a hard bound and one slot is always left
//! unused for the transport to spend.

use super::{CacheControl, CacheTtl, ModelPayload, ProviderKind};

/// Decorate a copy of `payload` with cache breakpoints for `provider`.
/// Inputs are never mutated. A provider without cache support gets the
/// payload back unchanged.
pub fn annotate_payload(
    provider: ProviderKind,
    payload: &ModelPayload,
    ttl: Option<CacheTtl>,
) -> ModelPayload {
    let mut decorated = payload.clone();
    if !provider.supports_cache_control() {
        return decorated;
    }

    // Reserve one slot below the provider cap.
    let budget = provider.cache_breakpoint_limit().saturating_sub(1);
    let control = CacheControl::ephemeral(ttl);
    let mut used = 0;

    if used < budget {
        decorated.system.cache_control = Some(control);
        used += 1;
    }

    if used < budget {
        if let Some(last) = decorated.messages.last_mut() {
            last.cache_control = Some(control);
            used += 1;
        }
    }

    if used < budget {
        if let Some(last) = decorated.tools.last_mut() {
            *last = last.with_cache_control(control);
        }
    }

    decorated
}

/// Count every breakpoint present in a payload (system + messages + tools).
pub fn count_breakpoints(payload: &ModelPayload) -> usize {
    let system = usize::from(payload.system.cache_control.is_some());
    let messages = payload
        .messages
        .iter()
        .filter(|m| m.cache_control.is_some())
        .count();
    let tools = payload
        .tools
        .iter()
        .filter(|t| t.cache_control().is_some())
        .count();
    system + messages + tools
}
