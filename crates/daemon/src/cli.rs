//! Command-line surface (§6). Unlike the teacher's HTTP-client `Op`
//! subcommands, this daemon has no remote control surface: the process is
//! started once by systemd/init with a config root and runs until signalled.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sourcemerged")]
#[command(about = "Reconciles manga-chapter libraries across download backends into a unified mergerfs mount")]
pub struct Args {
    /// Directory containing sourcemerge.toml (and, by default, the
    /// single-instance lockfile).
    #[arg(long, env = "SOURCEMERGE_CONFIG_ROOT", default_value = "/etc/sourcemerge")]
    pub config_root: PathBuf,

    /// Override the configured log filter (e.g. "debug", "sourcemerge_daemon=trace").
    #[arg(long, env = "SOURCEMERGE_LOG_FILTER")]
    pub log_filter: Option<String>,
}
