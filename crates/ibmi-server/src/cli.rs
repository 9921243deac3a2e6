//! CLI flags. Every flag overrides its corresponding environment variable
//! (see [`crate::env_config::EnvConfig`]).

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ibmi-server", version, about = "MCP tool gateway for IBM i / Db2 for i")]
pub struct Cli {
    /// Path, directory, or glob of tool/source YAML to load. Overrides
    /// `TOOLS_YAML_PATH`.
    #[arg(long)]
    pub tools: Option<String>,

    /// Comma-separated toolset allow-list. Overrides `SELECTED_TOOLSETS`.
    #[arg(long)]
    pub toolsets: Option<String>,

    /// Transport to serve over. Overrides `MCP_TRANSPORT_TYPE`.
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,

    /// Print the configured toolsets and exit without starting a server.
    #[arg(long, default_value_t = false)]
    pub list_toolsets: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
}
