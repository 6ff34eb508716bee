//! Grant, revoke, renew and inspect consents.

use anyhow::Result;
use consent_kernel::store::Store;
use consent_kernel::{AccessAudit, Category, ConsentKey, Kernel, Principal};
use serde_json::{json, Value};

use super::Context;

#[allow(clippy::too_many_arguments)]
pub async fn grant<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    granter: &Principal,
    grantee: &Principal,
    category: &Category,
    duration: u64,
    notes: Option<String>,
    as_delegate: bool,
) -> Result<Value> {
    let call = ctx.call()?;
    let notes = notes.as_deref();
    let consent = if as_delegate {
        kernel
            .grant_as_delegate(&call, granter, grantee, category, duration, notes)
            .await?
    } else {
        kernel
            .grant(&call, granter, grantee, category, duration, notes)
            .await?
    };
    Ok(serde_json::to_value(consent)?)
}

pub async fn revoke<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    granter: &Principal,
    grantee: &Principal,
    category: &Category,
) -> Result<Value> {
    kernel
        .revoke(&ctx.call()?, granter, grantee, category)
        .await?;
    Ok(json!({ "revoked": true }))
}

pub async fn renew<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    granter: &Principal,
    grantee: &Principal,
    category: &Category,
    extra: u64,
) -> Result<Value> {
    let consent = kernel
        .renew(&ctx.call()?, granter, grantee, category, extra)
        .await?;
    Ok(serde_json::to_value(consent)?)
}

/// Fails with the kernel's error when the consent is not valid at `ctx.at`.
pub async fn check<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    granter: &Principal,
    grantee: &Principal,
    category: &Category,
) -> Result<Value> {
    let consent = kernel.check(granter, grantee, category, ctx.at).await?;
    Ok(json!({ "valid": true, "expiry": consent.expiry }))
}

pub async fn details<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    granter: Principal,
    grantee: Principal,
    category: Category,
) -> Result<Value> {
    let key = ConsentKey::new(granter, grantee, category);
    Ok(serde_json::to_value(kernel.get_details(&key).await)?)
}

pub async fn history<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    granter: Principal,
    grantee: Principal,
    category: Category,
) -> Result<Value> {
    let key = ConsentKey::new(granter, grantee, category);
    Ok(serde_json::to_value(kernel.get_history(&key).await)?)
}

pub async fn verify<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    granter: Option<Principal>,
    grantee: Option<Principal>,
    category: Option<Category>,
) -> Result<Value> {
    let key = match (granter, grantee, category) {
        (Some(granter), Some(grantee), Some(category)) => {
            Some(ConsentKey::new(granter, grantee, category))
        },
        _ => None,
    };
    kernel.verify_history(key.as_ref()).await?;
    Ok(json!({ "verified": true }))
}
