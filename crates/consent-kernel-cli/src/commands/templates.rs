//! Templates and batch operations.

use anyhow::Result;
use consent_kernel::store::Store;
use consent_kernel::{AccessAudit, Category, ConsentError, Kernel, KernelError, Principal};
use serde_json::Value;

use super::{report_json, Context};

pub async fn create<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    name: &str,
    categories: Vec<Category>,
    duration: u64,
    description: &str,
) -> Result<Value> {
    let template = kernel
        .create_template(&ctx.call()?, name, categories, duration, description)
        .await?;
    Ok(serde_json::to_value(template)?)
}

pub async fn apply<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    grantee: &Principal,
    name: &str,
) -> Result<Value> {
    let report = kernel.apply_template(&ctx.call()?, grantee, name).await?;
    Ok(report_json(&report))
}

pub async fn get<S: Store, A: AccessAudit>(kernel: &Kernel<S, A>, name: &str) -> Result<Value> {
    let template = kernel
        .get_template(name)
        .await
        .ok_or_else(|| KernelError::from(ConsentError::TemplateNotFound(name.to_owned())))?;
    Ok(serde_json::to_value(template)?)
}

pub async fn batch_grant<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    grantee: &Principal,
    categories: &[Category],
    duration: u64,
    notes: Option<String>,
) -> Result<Value> {
    let report = kernel
        .batch_grant(&ctx.call()?, grantee, categories, duration, notes.as_deref())
        .await?;
    Ok(report_json(&report))
}

pub async fn batch_revoke<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    grantee: &Principal,
    categories: &[Category],
) -> Result<Value> {
    let report = kernel
        .batch_revoke(&ctx.call()?, grantee, categories)
        .await?;
    Ok(report_json(&report))
}
