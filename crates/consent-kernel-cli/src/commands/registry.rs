//! Categories and delegates.

use anyhow::Result;
use consent_kernel::store::Store;
use consent_kernel::{AccessAudit, Category, Kernel, Principal};
use serde_json::{json, Value};

use super::Context;

pub async fn add_category<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    category: Category,
) -> Result<Value> {
    kernel.add_category(&ctx.call()?, category.clone()).await?;
    Ok(json!({ "added": category }))
}

pub async fn is_valid_category<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    label: &str,
) -> Result<Value> {
    Ok(json!({ "valid": kernel.is_valid_category(label).await }))
}

pub async fn categories<S: Store, A: AccessAudit>(kernel: &Kernel<S, A>) -> Result<Value> {
    Ok(serde_json::to_value(kernel.categories().await)?)
}

pub async fn add_delegate<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    delegate: Principal,
) -> Result<Value> {
    let call = ctx.call()?;
    kernel.add_delegate(&call, delegate).await?;
    list_delegates(kernel, &call.caller).await
}

pub async fn remove_delegate<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    delegate: &Principal,
) -> Result<Value> {
    let call = ctx.call()?;
    kernel.remove_delegate(&call, delegate).await?;
    list_delegates(kernel, &call.caller).await
}

pub async fn list_delegates<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    granter: &Principal,
) -> Result<Value> {
    let delegates = kernel.list_delegates(granter).await;
    Ok(json!({ "granter": granter, "delegates": delegates }))
}
