use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum GatherCommands {
    /// Gather namespace and stripe tables from a metadata target
    Mds {
        /// Mount point of the metadata target's backing filesystem
        #[arg(value_name = "DEVICE_ROOT")]
        device_root: PathBuf,

        /// Base path of the MDS tables (e.g., /tmp/mdsdb)
        #[arg(long, value_name = "PATH")]
        mds_db: PathBuf,

        /// Scan without touching the device
        #[arg(short = 'n', long)]
        read_only: bool,

        /// Abort when the namespace is deeper than this
        #[arg(long, value_name = "LEVELS")]
        max_depth: Option<usize>,
    },

    /// Gather the object table of one storage target
    Ost {
        /// Mount point of the storage target's backing filesystem
        #[arg(value_name = "DEVICE_ROOT")]
        device_root: PathBuf,

        /// Base path of the MDS tables written by an earlier `mds` run
        #[arg(long, value_name = "PATH")]
        mds_db: PathBuf,

        /// Base path of the OST tables (e.g., /tmp/ostdb)
        #[arg(long, value_name = "PATH")]
        ost_db: PathBuf,

        /// Scan without touching the device; LAST_ID is not updated
        #[arg(short = 'n', long)]
        read_only: bool,
    },

    /// Run the pass described by a TOML configuration file
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "gather.toml")]
        config: String,
    },
}
