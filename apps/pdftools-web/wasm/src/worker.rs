//! Worker objects exported to the worker scripts

use std::rc::Rc;

use js_sys::{Function, Promise};
use pdftools_core::{worker, WorkerCommand};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::bridge::JsRuntime;
use crate::sink::{warn, JsSink};

/// Parse an inbound `onmessage` payload; unknown or malformed messages
/// become `None` and are answered by the worker's invalid-message error
fn parse_command(message: JsValue) -> Option<WorkerCommand> {
    match serde_wasm_bindgen::from_value(message) {
        Ok(command) => Some(command),
        Err(e) => {
            warn(&format!("Rejected inbound message: {}", e));
            None
        }
    }
}

#[wasm_bindgen]
pub struct MergeWorker {
    inner: worker::MergeWorker,
}

#[wasm_bindgen]
impl MergeWorker {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            inner: worker::MergeWorker::new(),
        }
    }

    /// Run one merge, calling `post` with every outbound message
    pub fn handle(&self, message: JsValue, post: Function) {
        let command = parse_command(message);
        let mut sink = JsSink::new(post);
        self.inner.handle(command.as_ref(), &mut sink);
    }
}

impl Default for MergeWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
pub struct DecryptWorker {
    inner: Rc<worker::DecryptWorker<JsRuntime>>,
}

#[wasm_bindgen]
impl DecryptWorker {
    /// `runner` bridges to the `pdfcpu` module, see [`JsRuntime`]
    #[wasm_bindgen(constructor)]
    pub fn new(runner: JsValue) -> Self {
        Self {
            inner: Rc::new(worker::DecryptWorker::new(JsRuntime::new(runner))),
        }
    }

    /// Run one decrypt; the returned promise settles once the terminal
    /// message has been posted
    pub fn handle(&self, message: JsValue, post: Function) -> Promise {
        let command = parse_command(message);
        let inner = Rc::clone(&self.inner);
        future_to_promise(async move {
            let mut sink = JsSink::new(post);
            inner.handle(command.as_ref(), &mut sink).await;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(getter, js_name = isInitialized)]
    pub fn is_initialized(&self) -> bool {
        self.inner.decryptor().is_initialized()
    }
}
