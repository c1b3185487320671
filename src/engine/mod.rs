//! engine - host-facing Engine object (v0.3)
//!
//! Разделение по подмодулям:
//! - core.rs - Engine/EngineInner, create/open, resolve_handle, close, Drop-финализация
//! - emu.rs  - errno/query/emu_start/emu_stop
//! - mem.rs  - mem_map/mem_unmap/mem_protect/mem_read/mem_write/mem_regions
//! - reg.rs  - reg_read/reg_write (+ batch)
//! - hook.rs - hook_add/hook_del (таблица хуков - crate::hooks)
//!
//! Контексты (context_save/context_restore) - crate::context.

pub mod core;
pub mod emu;
pub mod hook;
pub mod mem;
pub mod reg;

pub use self::core::{Engine, EngineInner};
