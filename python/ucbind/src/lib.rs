use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyWeakrefMethods, PyWeakrefReference};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use ucbind_core as core;
use core::util::lock;
use core::{BridgeConfig, HookSpec, NativeApi, NativeHandle, NativeHookId, SimBackend};

fn pyerr<E: std::fmt::Display>(e: E) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

fn pyerr_any(e: anyhow::Error) -> PyErr {
    PyRuntimeError::new_err(format!("{:#}", e))
}

// Один эталонный движок на процесс интерпретатора.
static SIM: OnceLock<Arc<SimBackend>> = OnceLock::new();

fn backend() -> Arc<dyn NativeApi> {
    SIM.get_or_init(SimBackend::new).clone()
}

// NativeHandle -> слабая ссылка на Python-объект Engine, который им владеет.
// Хук получает тот же объект, что вернул конструктор.
static HOST_OBJECTS: OnceLock<Mutex<HashMap<NativeHandle, Py<PyWeakrefReference>>>> =
    OnceLock::new();

fn host_objects() -> &'static Mutex<HashMap<NativeHandle, Py<PyWeakrefReference>>> {
    HOST_OBJECTS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn host_register(handle: NativeHandle, obj: &Bound<'_, PyEngine>) -> PyResult<()> {
    let py = obj.py();
    let mut map = lock(host_objects());
    let live = map
        .get(&handle)
        .is_some_and(|w| w.bind(py).upgrade().is_some());
    if !live {
        map.insert(handle, PyWeakrefReference::new(obj.as_any())?.unbind());
    }
    Ok(())
}

fn host_lookup<'py>(py: Python<'py>, handle: NativeHandle) -> Option<Bound<'py, PyAny>> {
    lock(host_objects())
        .get(&handle)
        .and_then(|w| w.bind(py).upgrade())
}

fn host_unregister(handle: NativeHandle) {
    lock(host_objects()).remove(&handle);
}

/// Drop the entry only if its object is gone (weakrefs are cleared before dealloc).
fn host_unregister_dead(py: Python<'_>, handle: NativeHandle) {
    let mut map = lock(host_objects());
    if map.get(&handle).is_some_and(|w| w.bind(py).upgrade().is_none()) {
        map.remove(&handle);
    }
}

/// Emulator instance. Closed by close(), by `with` exit, or when garbage collected.
#[pyclass(name = "Engine", weakref)]
struct PyEngine {
    inner: core::Engine,
}

/// Saved CPU/memory state; independent of the engine that produced it.
#[pyclass(name = "Context")]
struct PyContext {
    inner: core::Context,
}

#[pymethods]
impl PyContext {
    #[getter]
    fn raw(&self) -> u64 {
        self.inner.raw().0
    }

    fn same_as(&self, other: &PyContext) -> bool {
        self.inner.same_as(&other.inner)
    }
}

#[pymethods]
impl PyEngine {
    /// Engine(arch, mode) with configuration from UCB_* env vars.
    /// Example: Engine(ucbind.ARCH_X86, ucbind.MODE_64, trace_native=True)
    #[new]
    #[pyo3(signature = (arch, mode, trace_native=None))]
    fn new(arch: i32, mode: i32, trace_native: Option<bool>) -> PyResult<Self> {
        let mut cfg = BridgeConfig::from_env();
        if let Some(v) = trace_native { cfg.trace_native_calls = v; }
        let inner = core::Engine::open_with_config(backend(), arch, mode, cfg).map_err(pyerr_any)?;
        Ok(Self { inner })
    }

    #[getter]
    fn handle(&self) -> PyResult<u64> {
        Ok(self.inner.resolve_handle().map_err(pyerr_any)?.0)
    }

    #[getter]
    fn closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn close(&self) -> PyResult<()> {
        if let Ok(h) = self.inner.resolve_handle() {
            host_unregister(h);
        }
        self.inner.close().map_err(pyerr_any)
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    fn __exit__(
        &self,
        _exc_type: Option<Bound<'_, PyAny>>,
        _exc: Option<Bound<'_, PyAny>>,
        _tb: Option<Bound<'_, PyAny>>,
    ) -> PyResult<bool> {
        self.close()?;
        Ok(false)
    }

    fn errno(&self) -> PyResult<i32> {
        Ok(self.inner.errno().map_err(pyerr_any)?.code())
    }

    fn query(&self, kind: i32) -> PyResult<usize> {
        self.inner.query(kind).map_err(pyerr_any)
    }

    /// Runs without the GIL; hooks re-acquire it.
    #[pyo3(signature = (begin, until, timeout=0, count=0))]
    fn emu_start(&self, py: Python<'_>, begin: u64, until: u64, timeout: u64, count: usize) -> PyResult<()> {
        let eng = self.inner.clone();
        py.detach(move || eng.emu_start(begin, until, timeout, count))
            .map_err(pyerr_any)
    }

    fn emu_stop(&self) -> PyResult<()> {
        self.inner.emu_stop().map_err(pyerr_any)
    }

    #[pyo3(signature = (address, size, perms=core::consts::PROT_ALL))]
    fn mem_map(&self, address: u64, size: usize, perms: u32) -> PyResult<()> {
        self.inner.mem_map(address, size, perms).map_err(pyerr_any)
    }

    fn mem_unmap(&self, address: u64, size: usize) -> PyResult<()> {
        self.inner.mem_unmap(address, size).map_err(pyerr_any)
    }

    fn mem_protect(&self, address: u64, size: usize, perms: u32) -> PyResult<()> {
        self.inner.mem_protect(address, size, perms).map_err(pyerr_any)
    }

    fn mem_read<'py>(&self, py: Python<'py>, address: u64, size: usize) -> PyResult<Bound<'py, PyBytes>> {
        let v = self.inner.mem_read(address, size).map_err(pyerr_any)?;
        Ok(PyBytes::new(py, &v))
    }

    fn mem_write(&self, address: u64, data: &[u8]) -> PyResult<()> {
        self.inner.mem_write(address, data).map_err(pyerr_any)
    }

    /// -> List[(begin, end, perms)], end inclusive.
    fn mem_regions(&self) -> PyResult<Vec<(u64, u64, u32)>> {
        let regions = self.inner.mem_regions().map_err(pyerr_any)?;
        Ok(regions.into_iter().map(|r| (r.begin, r.end, r.perms)).collect())
    }

    fn reg_read(&self, regid: i32) -> PyResult<u64> {
        self.inner.reg_read(regid).map_err(pyerr_any)
    }

    fn reg_write(&self, regid: i32, value: u64) -> PyResult<()> {
        self.inner.reg_write(regid, value).map_err(pyerr_any)
    }

    fn reg_read_batch(&self, regids: Vec<i32>) -> PyResult<Vec<u64>> {
        self.inner.reg_read_batch(&regids).map_err(pyerr_any)
    }

    fn reg_write_batch(&self, regs: Vec<(i32, u64)>) -> PyResult<()> {
        self.inner.reg_write_batch(&regs).map_err(pyerr_any)
    }

    /// Code hook: callback(engine, address, size). Returns the hook id.
    #[pyo3(signature = (callback, begin=1, end=0))]
    fn hook_add(slf: &Bound<'_, Self>, callback: Py<PyAny>, begin: u64, end: u64) -> PyResult<u64> {
        let this = slf.borrow();
        let handle = this.inner.resolve_handle().map_err(pyerr_any)?;
        host_register(handle, slf)?;
        let spec = HookSpec::code().with_range(begin, end);
        let id = this
            .inner
            .hook_add(spec, move |eng: &core::Engine, address: u64, size: u32| {
                Python::attach(|py| {
                    let res = host_engine(py, eng)
                        .and_then(|obj| callback.call1(py, (obj, address, size)));
                    if let Err(e) = res {
                        // исключение из колбэка не может пересечь нативный движок
                        log::warn!("hook at {:#x}: python callback raised: {}", address, e);
                        e.print(py);
                    }
                });
            })
            .map_err(pyerr_any)?;
        Ok(id.0)
    }

    fn hook_del(&self, id: u64) -> PyResult<()> {
        self.inner.hook_del(NativeHookId(id)).map_err(pyerr_any)
    }

    /// Saves into `ctx` when given and returns that same object, else a new Context.
    #[pyo3(signature = (ctx=None))]
    fn context_save(&self, py: Python<'_>, ctx: Option<Py<PyContext>>) -> PyResult<Py<PyContext>> {
        match ctx {
            Some(obj) => {
                let inner = obj.borrow(py).inner.clone();
                self.inner.context_save(Some(inner)).map_err(pyerr_any)?;
                Ok(obj)
            }
            None => {
                let inner = self.inner.context_save(None).map_err(pyerr_any)?;
                Py::new(py, PyContext { inner })
            }
        }
    }

    fn context_restore(&self, ctx: PyRef<'_, PyContext>) -> PyResult<()> {
        self.inner.context_restore(&ctx.inner).map_err(pyerr_any)
    }

    fn same_as(&self, other: &PyEngine) -> bool {
        self.inner.same_as(&other.inner)
    }
}

impl Drop for PyEngine {
    fn drop(&mut self) {
        if let Ok(h) = self.inner.resolve_handle() {
            Python::attach(|py| host_unregister_dead(py, h));
        }
    }
}

/// Python object for the engine a hook fired on: the registered owner when it
/// is still alive, otherwise a fresh wrapper around the same engine.
fn host_engine<'py>(py: Python<'py>, eng: &core::Engine) -> PyResult<Bound<'py, PyAny>> {
    if let Some(obj) = eng.resolve_handle().ok().and_then(|h| host_lookup(py, h)) {
        return Ok(obj);
    }
    log::debug!("no live host object for {:?}, wrapping", eng);
    Ok(Bound::new(py, PyEngine { inner: eng.clone() })?.into_any())
}

/// Message for a UC_ERR_* code.
#[pyfunction]
fn strerror(code: i32) -> &'static str {
    core::strerror(code)
}

/// Bridge counters as a JSON object string.
#[pyfunction]
fn metrics() -> PyResult<String> {
    serde_json::to_string(&core::metrics::snapshot()).map_err(pyerr)
}

#[pymodule]
fn ucbind(m: &Bound<'_, PyModule>) -> PyResult<()> {
    use core::consts::*;
    m.add_class::<PyEngine>()?;
    m.add_class::<PyContext>()?;
    m.add_function(wrap_pyfunction!(strerror, m)?)?;
    m.add_function(wrap_pyfunction!(metrics, m)?)?;
    m.add("version", env!("CARGO_PKG_VERSION"))?;

    m.add("ARCH_ARM", ARCH_ARM)?;
    m.add("ARCH_ARM64", ARCH_ARM64)?;
    m.add("ARCH_MIPS", ARCH_MIPS)?;
    m.add("ARCH_X86", ARCH_X86)?;
    m.add("ARCH_RISCV", ARCH_RISCV)?;
    m.add("MODE_16", MODE_16)?;
    m.add("MODE_32", MODE_32)?;
    m.add("MODE_64", MODE_64)?;
    m.add("MODE_ARM", MODE_ARM)?;
    m.add("MODE_THUMB", MODE_THUMB)?;
    m.add("MODE_BIG_ENDIAN", MODE_BIG_ENDIAN)?;
    m.add("PROT_READ", PROT_READ)?;
    m.add("PROT_WRITE", PROT_WRITE)?;
    m.add("PROT_EXEC", PROT_EXEC)?;
    m.add("PROT_ALL", PROT_ALL)?;
    m.add("QUERY_MODE", QUERY_MODE)?;
    m.add("QUERY_PAGE_SIZE", QUERY_PAGE_SIZE)?;
    m.add("QUERY_ARCH", QUERY_ARCH)?;
    m.add("QUERY_TIMEOUT", QUERY_TIMEOUT)?;
    Ok(())
}
