use anyhow::Result;

use ucbind::{metrics, registry};

pub fn exec(json: bool) -> Result<()> {
    let ms = metrics::snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&ms)?);
        return Ok(());
    }
    print_text(&ms);
    Ok(())
}

pub fn print_text(ms: &metrics::MetricsSnapshot) {
    println!("Metrics:");
    println!("  engines_opened        = {}", ms.engines_opened);
    println!("  engines_closed        = {}", ms.engines_closed);
    println!("  engines_finalized     = {}", ms.engines_finalized);
    println!("  engine_close_failures = {}", ms.engine_close_failures);
    println!("  engines_live          = {}", ms.engines_live());
    println!("  hooks_added           = {}", ms.hooks_added);
    println!("  hooks_deleted         = {}", ms.hooks_deleted);
    println!("  hooks_drained         = {}", ms.hooks_drained_on_close);
    println!("  hook_teardown_fail    = {}", ms.hook_teardown_failures);
    println!("  hook_dispatches       = {}", ms.hook_dispatches);
    println!("  hook_dispatch_misses  = {}", ms.hook_dispatch_misses);
    println!("  contexts_allocated    = {}", ms.contexts_allocated);
    println!("  contexts_freed        = {}", ms.contexts_freed);
    println!("  native_errors         = {}", ms.native_errors);
    println!("  registry_entries      = {}", registry::len());
}
