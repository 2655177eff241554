//! RPC handlers for the settings page.
//!
//! Exposed methods:
//! - `settings.get` — stored key + model, plus the selectable model set
//! - `settings.set` — probe-validated save; rejects bad keys without
//!   touching the stored values

use crate::settings::SUPPORTED_MODELS;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct SetParams {
    #[serde(rename = "apiKey")]
    api_key: String,
    model: String,
}

pub async fn get(_params: Value, ctx: &AppContext) -> Result<Value> {
    let settings = ctx.settings.get().await?;
    Ok(json!({
        "apiKey": settings.api_key,
        "model": settings.model,
        "supportedModels": SUPPORTED_MODELS,
    }))
}

pub async fn set(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: SetParams = serde_json::from_value(params)?;
    ctx.settings
        .set(ctx.provider.as_ref(), &p.api_key, &p.model)
        .await?;
    Ok(json!({ "saved": true }))
}
