use anyhow::Context;

use crate::{
    cmd::gather_command::GatherCommands,
    common::{GatherConfig, Role, config::default_max_depth},
    scan::{self, RunSummary},
};

/// Turn a subcommand into the configuration a pass runs with.
pub fn gather_config(command: GatherCommands) -> anyhow::Result<GatherConfig> {
    let cfg = match command {
        GatherCommands::Mds {
            device_root,
            mds_db,
            read_only,
            max_depth,
        } => GatherConfig {
            role: Role::Mds,
            device_root,
            mds_db,
            ost_db: None,
            read_only,
            max_depth: max_depth.unwrap_or_else(default_max_depth),
        },
        GatherCommands::Ost {
            device_root,
            mds_db,
            ost_db,
            read_only,
        } => GatherConfig {
            role: Role::Ost,
            device_root,
            mds_db,
            ost_db: Some(ost_db),
            read_only,
            max_depth: default_max_depth(),
        },
        GatherCommands::Run { config } => {
            return GatherConfig::from_file(&config).with_context(|| format!("loading {}", config));
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

pub fn handle_gather_command(command: GatherCommands) -> anyhow::Result<RunSummary> {
    let cfg = gather_config(command)?;
    tracing::debug!("Loaded config: {:?}", cfg);
    let summary = scan::run(&cfg).with_context(|| format!("{} pass on {}", cfg.role, cfg.device_root.display()))?;
    print_summary(&summary);
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    println!("{} pass {}{}", summary.role, summary.state, if summary.read_only { " (read-only)" } else { "" });
    match summary.role {
        Role::Mds => {
            println!("  namespace entries: {}", summary.dir_entries);
            println!("  layouts:           {}", summary.layouts);
            println!("  stripes:           {} ({} skipped)", summary.stripes, summary.skipped_stripes);
            println!("  targets:           {}", summary.targets);
        }
        Role::Ost => {
            println!("  objects:           {}", summary.objects);
            println!("  max object id:     {}", summary.max_object_id);
            if let Some(last_id) = summary.last_id {
                println!("  LAST_ID on disk:   {}", last_id);
            }
            if let Some(next_id) = summary.next_id {
                let note = if summary.last_id_written { "written" } else { "not written" };
                println!("  next object id:    {} ({})", next_id, note);
            }
        }
    }
}
