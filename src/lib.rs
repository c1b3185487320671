// Базовые модули
pub mod consts;
pub mod status;
pub mod error;
pub mod config;
pub mod metrics;
pub mod util;   // src/util/mod.rs

// Граница с нативным движком
pub mod native; // src/native/mod.rs (trait NativeApi)
pub mod sim;    // src/sim/{mod,machine,mem}.rs - встроенный эталонный движок

// Жизненный цикл
pub mod registry; // NativeHandle -> Engine (weak)
pub mod hooks;    // таблица хуков + trampoline
pub mod engine;   // src/engine/{mod,core,emu,mem,reg,hook}.rs
pub mod context;  // uc_context

// Удобные реэкспорты
pub use config::{BridgeConfig, CloseFailurePolicy};
pub use context::Context;
pub use engine::Engine;
pub use error::{bridge_error, BridgeError};
pub use hooks::{HookCallback, HookSpec};
pub use native::{
    MemRegion, NativeApi, NativeContext, NativeHandle, NativeHookFn, NativeHookId, NativeResult,
};
pub use sim::{NativeCall, SimBackend};
pub use status::{strerror, UcErr};
