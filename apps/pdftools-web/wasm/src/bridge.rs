//! JS bridge to the Go-compiled decrypt toolkit
//!
//! The toolkit only runs under Go's `wasm_exec.js` glue, so the worker script
//! provides a runner object:
//! - `load(): Promise<module>` compiles `pdfcpu.wasm` once
//! - `run(module, argv, files): Promise<{ output, files }>` starts a fresh
//!   Go instance with `files` (path -> `Uint8Array`) mounted, and resolves
//!   with the captured stdout/stderr and the filesystem after the run
//!
//! The virtual filesystem itself lives on the Rust side.

use async_trait::async_trait;
use js_sys::{Array, Function, Object, Promise, Reflect, Uint8Array};
use pdftools_core::decrypt::{EngineError, EngineRuntime, InitStage, VirtualFs};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

pub struct JsRuntime {
    runner: JsValue,
}

impl JsRuntime {
    pub fn new(runner: JsValue) -> Self {
        Self { runner }
    }

    fn method(&self, name: &str) -> Result<Function, String> {
        Reflect::get(&self.runner, &JsValue::from_str(name))
            .map_err(|e| format!("{} lookup failed: {:?}", name, e))?
            .dyn_into::<Function>()
            .map_err(|_| format!("{} is not a function", name))
    }
}

async fn await_promise(value: JsValue) -> Result<JsValue, String> {
    let promise: Promise = value
        .dyn_into()
        .map_err(|_| "Not a promise".to_string())?;
    JsFuture::from(promise)
        .await
        .map_err(|e| format!("{:?}", e))
}

#[async_trait(?Send)]
impl EngineRuntime for JsRuntime {
    type Module = JsValue;
    /// Handle to the compiled module for one run
    type Instance = JsValue;

    async fn prepare_filesystem(&self) -> Result<(), EngineError> {
        if !self.runner.is_object() {
            return Err(EngineError::init(
                InitStage::Filesystem,
                "decrypt runner is not an object",
            ));
        }
        Ok(())
    }

    async fn init_runtime(&self) -> Result<(), EngineError> {
        self.method("load")
            .and_then(|_| self.method("run"))
            .map(|_| ())
            .map_err(|e| EngineError::init(InitStage::Runtime, e))
    }

    async fn load_module(&self) -> Result<JsValue, EngineError> {
        let load = self
            .method("load")
            .map_err(|e| EngineError::init(InitStage::Module, e))?;
        let pending = load
            .call0(&self.runner)
            .map_err(|e| EngineError::init(InitStage::Module, format!("{:?}", e)))?;
        await_promise(pending)
            .await
            .map_err(|e| EngineError::init(InitStage::Module, e))
    }

    async fn instantiate(&self, module: &JsValue) -> Result<JsValue, EngineError> {
        // The runner starts a fresh Go instance on every run
        Ok(module.clone())
    }

    async fn run(
        &self,
        module: JsValue,
        argv: &[String],
        fs: &mut VirtualFs,
    ) -> Result<String, EngineError> {
        let run = self.method("run").map_err(EngineError::Run)?;

        let args: Array = argv.iter().map(|a| JsValue::from_str(a)).collect();
        let files = Object::new();
        for path in fs.paths() {
            let content = fs.read_file(path)?;
            Reflect::set(&files, &JsValue::from_str(path), &Uint8Array::from(content))
                .map_err(|e| EngineError::Run(format!("{:?}", e)))?;
        }

        let pending = run
            .call3(&self.runner, &module, &args, &files)
            .map_err(|e| EngineError::Run(format!("{:?}", e)))?;
        let result = await_promise(pending).await.map_err(EngineError::Run)?;

        let output = Reflect::get(&result, &JsValue::from_str("output"))
            .ok()
            .and_then(|v| v.as_string())
            .unwrap_or_default();

        let produced = Reflect::get(&result, &JsValue::from_str("files"))
            .map_err(|e| EngineError::Run(format!("{:?}", e)))?;
        if produced.is_object() {
            for entry in Object::entries(produced.unchecked_ref::<Object>()).iter() {
                let pair: Array = entry.unchecked_into();
                let Some(path) = pair.get(0).as_string() else {
                    continue;
                };
                let Ok(bytes) = pair.get(1).dyn_into::<Uint8Array>() else {
                    continue;
                };
                fs.write_file(&path, bytes.to_vec())?;
            }
        }

        Ok(output)
    }
}
