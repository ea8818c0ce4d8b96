//! Posting outbound messages back to the worker script

use js_sys::{Array, Function, Object, Reflect, Uint8Array};
use pdftools_core::{EventSink, WorkerMessage};
use wasm_bindgen::prelude::*;
use web_sys::{Blob, BlobPropertyBag};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    pub(crate) fn warn(s: &str);

    #[wasm_bindgen(js_namespace = console)]
    pub(crate) fn error(s: &str);
}

/// Convert a message to the shape the UI expects
///
/// Success payloads become a `Blob` so the page can hand them straight to
/// `URL.createObjectURL`.
pub fn message_to_js(message: &WorkerMessage) -> Result<JsValue, JsValue> {
    match message {
        WorkerMessage::Success(blob) => {
            let parts = Array::of1(&Uint8Array::from(blob.data.as_slice()));
            let options = BlobPropertyBag::new();
            options.set_type(&blob.mime_type);
            let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;

            let object = Object::new();
            Reflect::set(&object, &"type".into(), &"success".into())?;
            Reflect::set(&object, &"data".into(), &blob)?;
            Ok(object.into())
        }
        other => serde_wasm_bindgen::to_value(other)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e))),
    }
}

/// Forwards every message to a JS callback
pub struct JsSink {
    post: Function,
}

impl JsSink {
    pub fn new(post: Function) -> Self {
        Self { post }
    }
}

impl EventSink for JsSink {
    fn post(&mut self, message: WorkerMessage) {
        let result = message_to_js(&message)
            .and_then(|value| self.post.call1(&JsValue::NULL, &value));
        if let Err(e) = result {
            error(&format!("Failed to post worker message: {:?}", e));
        }
    }
}
