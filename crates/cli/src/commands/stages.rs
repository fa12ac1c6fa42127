//! Stages command: list the registered stage types

use anyhow::Result;
use vidgraph_core::StageRegistry;

pub fn list_stages() -> Result<()> {
    let mut registry = StageRegistry::new();
    vidgraph_sim::register_builtin(&mut registry);

    println!("Registered stage types ({}):", registry.len());
    for type_id in registry.type_ids() {
        if let Some(kind) = registry.get(type_id) {
            println!("  {:<16} {}", type_id, kind.descriptor().description);
        }
    }
    Ok(())
}
