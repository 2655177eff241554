use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn ping(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "pong": true }))
}

pub async fn status(_params: Value, ctx: &AppContext) -> Result<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let view = ctx.panel.view().await;
    let capability = ctx.tabs.capability();
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime,
        "port": ctx.config.port,
        "panelState": view.state,
        "analyzeEnabled": capability.analyze_enabled,
        "activeTab": ctx.tabs.active_url(),
    }))
}
