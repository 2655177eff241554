//! RPC handlers for the side panel.
//!
//! Exposed methods:
//! - `panel.open` — reset to idle on (re)open and return the first view
//! - `panel.state` — current view, for clients that reconnect mid-session
//! - `panel.analyze` — the one capture-and-analyze action
//! - `panel.toggleHidden` — cosmetic blur over the rendered result
//! - `panel.chat` — one follow-up turn against the last analysis
//!
//! Analyze and chat resolve panel-visible failures into the error state and
//! return the updated view; only busy collisions and transport-level
//! problems surface as RPC errors.

use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct ChatParams {
    text: String,
}

pub async fn open(_params: Value, ctx: &AppContext) -> Result<Value> {
    let view = ctx.panel.open().await;
    Ok(json!({ "view": view }))
}

pub async fn state(_params: Value, ctx: &AppContext) -> Result<Value> {
    let view = ctx.panel.view().await;
    Ok(json!({ "view": view }))
}

pub async fn analyze(_params: Value, ctx: &AppContext) -> Result<Value> {
    let view = ctx.panel.analyze().await?;
    Ok(json!({ "view": view }))
}

pub async fn toggle_hidden(_params: Value, ctx: &AppContext) -> Result<Value> {
    let view = ctx.panel.toggle_hidden().await;
    Ok(json!({ "view": view }))
}

pub async fn chat(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ChatParams = serde_json::from_value(params)?;
    let view = ctx.panel.send_chat(&p.text).await?;
    Ok(json!({ "view": view }))
}
