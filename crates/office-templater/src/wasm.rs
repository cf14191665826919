//! WebAssembly bindings for the templating engine via `wasm-bindgen`.
//!
//! This module is only available when the `wasm` feature is enabled. It
//! exports JavaScript-callable functions for rendering `.pptx`/`.xlsx`
//! templates and extracting their required context keys, in browser or
//! Node.js environments. There is no principal/permission support here —
//! the caller is expected to pre-filter context on the server side before
//! handing it to the browser.

use wasm_bindgen::prelude::*;

use crate::config::RenderOptions;
use crate::value::value_from_json;

/// Internal: render a `.pptx` template, returning a `String` error (testable
/// on native) and a JSON-encoded `{ bytes, errors }` result.
fn render_pptx_inner(template: &[u8], context_json: &str) -> Result<Vec<u8>, String> {
    let json: serde_json::Value =
        serde_json::from_str(context_json).map_err(|e| format!("invalid context JSON: {e}"))?;
    let context = value_from_json(&json);
    let now = chrono::Utc::now().naive_utc();
    let (output, errors) =
        crate::render_pptx(template, &context, None, now, &RenderOptions::default())
            .map_err(|e| e.to_string())?;
    match output {
        Some(bytes) => Ok(bytes),
        None => Err(format!(
            "render produced no output: {}",
            errors.unwrap_or_default().join("; ")
        )),
    }
}

/// Internal: render a `.xlsx` template, mirroring [`render_pptx_inner`].
fn render_xlsx_inner(template: &[u8], context_json: &str) -> Result<Vec<u8>, String> {
    let json: serde_json::Value =
        serde_json::from_str(context_json).map_err(|e| format!("invalid context JSON: {e}"))?;
    let context = value_from_json(&json);
    let now = chrono::Utc::now().naive_utc();
    let (output, errors) =
        crate::render_xlsx(template, &context, None, now, &RenderOptions::default())
            .map_err(|e| e.to_string())?;
    match output {
        Some(bytes) => Ok(bytes),
        None => Err(format!(
            "render produced no output: {}",
            errors.unwrap_or_default().join("; ")
        )),
    }
}

/// Internal: statically scan a `.pptx` template for required context keys,
/// returning the fields serialized as JSON.
fn extract_context_keys_inner(template: &[u8]) -> Result<String, String> {
    let fields = crate::extract_context_keys(template, &RenderOptions::default())
        .map_err(|e| e.to_string())?;
    serde_json::to_string(&serde_json::json!({
        "simple_fields": fields.simple_fields,
        "object_fields": fields.object_fields,
    }))
    .map_err(|e| e.to_string())
}

/// Render a `.pptx` template against a JSON-encoded context.
///
/// `template` is the raw bytes of a `.pptx` file; `context_json` is a JSON
/// object whose top-level keys become the context's top-level identifiers.
///
/// Returns the rendered `.pptx` bytes on success, or throws a JS error
/// string on failure (including when the render accumulated unresolved
/// tags — see the error message for details).
#[wasm_bindgen(js_name = "renderPptx")]
pub fn render_pptx_wasm(template: &[u8], context_json: &str) -> Result<Vec<u8>, JsValue> {
    render_pptx_inner(template, context_json).map_err(|e| JsValue::from_str(&e))
}

/// Render a `.xlsx` template against a JSON-encoded context. See
/// [`render_pptx_wasm`] for the context JSON shape and error semantics.
#[wasm_bindgen(js_name = "renderXlsx")]
pub fn render_xlsx_wasm(template: &[u8], context_json: &str) -> Result<Vec<u8>, JsValue> {
    render_xlsx_inner(template, context_json).map_err(|e| JsValue::from_str(&e))
}

/// Statically scan a `.pptx` template and return the context keys it
/// requires, as a JSON string `{ "simple_fields": [...], "object_fields": [...] }`.
#[wasm_bindgen(js_name = "extractContextKeys")]
pub fn extract_context_keys_wasm(template: &[u8]) -> Result<String, JsValue> {
    extract_context_keys_inner(template).map_err(|e| JsValue::from_str(&e))
}
