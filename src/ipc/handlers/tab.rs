//! RPC handler for active-tab URL reports from the hosting browser.

use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct NavigatedParams {
    url: String,
}

/// `tab.navigated` — record the new active-tab URL. When the analyze
/// affordance flips (into or out of a multiplayer route), every connected
/// client is notified so the trigger and hint swap without a full re-check.
pub async fn navigated(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: NavigatedParams = serde_json::from_value(params)?;
    if let Some(capability) = ctx.tabs.navigated(&p.url) {
        ctx.broadcaster.capability_changed(capability);
    }
    Ok(serde_json::to_value(ctx.tabs.capability())?)
}
