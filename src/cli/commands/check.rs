use std::path::Path;

use anyhow::Context;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::policy::load_registry;

pub fn handle(policies: &Path, output_format: OutputFormat) -> anyhow::Result<()> {
    let registry = load_registry(policies).with_context(|| format!("invalid policy file {}", policies.display()))?;

    match output_format {
        OutputFormat::Json => {
            let bindings: Vec<_> = registry
                .policies()
                .iter()
                .map(|p| {
                    json!({
                        "binding": p.binding(),
                        "allow": p.allowed().to_string(),
                        "filters": p.filters().len(),
                        "connection": p.connection(),
                    })
                })
                .collect();
            let output = json!({
                "file": policies.display().to_string(),
                "default_connection": registry.default_connection(),
                "policies": bindings,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("{}: {} policies", policies.display(), registry.len());
            for policy in registry.policies() {
                println!(
                    "  {:<30} allow={:<20} filters={} connection={}",
                    policy.binding(),
                    policy.allowed().to_string(),
                    policy.filters().len(),
                    policy.connection().or(registry.default_connection()).unwrap_or("(default)")
                );
            }
        }
    }

    Ok(())
}
