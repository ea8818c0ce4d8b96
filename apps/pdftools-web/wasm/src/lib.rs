//! WASM bindings for the PDF merge and decrypt workers
//!
//! Each pipeline runs inside its own dedicated Web Worker. The worker script
//! owns one binding object and forwards every `onmessage` payload to it:
//!
//! ```javascript
//! import init, { MergeWorker } from './pkg/pdftools_wasm.js';
//!
//! await init();
//! const worker = new MergeWorker();
//! self.onmessage = (event) => worker.handle(event.data, (msg) => self.postMessage(msg));
//! ```
//!
//! The decrypt worker additionally needs a runner bridging to the
//! Go-compiled `pdfcpu` module; see [`bridge::JsRuntime`].
//!
//! ```javascript
//! import init, { DecryptWorker } from './pkg/pdftools_wasm.js';
//!
//! await init();
//! const worker = new DecryptWorker({
//!     load: () => WebAssembly.compileStreaming(fetch('/pdfcpu.wasm')),
//!     run: (module, argv, files) => runGo(module, argv, files), // -> { output, files }
//! });
//! self.onmessage = (event) => worker.handle(event.data, (msg) => self.postMessage(msg));
//! ```

pub mod bridge;
pub mod sink;
pub mod worker;

use pdftools_core::MeasurementUnit;
use wasm_bindgen::prelude::*;

pub use worker::{DecryptWorker, MergeWorker};

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Convert a length between units (`mm`, `cm`, `in`, `pdf`)
#[wasm_bindgen]
pub fn convert_unit(value: f64, from: &str, to: &str) -> Result<f64, JsValue> {
    let from = parse_unit(from)?;
    let to = parse_unit(to)?;
    Ok(pdftools_core::convert(value, from, to))
}

fn parse_unit(name: &str) -> Result<MeasurementUnit, JsValue> {
    MeasurementUnit::from_name(name)
        .ok_or_else(|| JsValue::from_str(&format!("Unknown unit: {}", name)))
}
