use clap::Parser;
use pytables_config::ConfigArgs;

/// Command line of the `pytables-server` binary.
#[derive(Debug, Parser)]
#[command(
    name = "pytables-server",
    version,
    about = "Serve the pytables rule sets over Unix domain sockets"
)]
pub(crate) struct ServerCli {
    #[command(flatten)]
    pub(crate) config: ConfigArgs,
    /// Stay attached to the terminal instead of daemonising.
    #[arg(long)]
    pub(crate) foreground: bool,
}
