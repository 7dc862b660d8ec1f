use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "quay", version, about = "dual-pane FTP/SFTP file manager core")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a server and list a remote directory.
    Connect {
        /// user@host[:port]
        target: String,
        #[arg(long, value_enum, default_value_t = ProtocolArg::Sftp)]
        protocol: ProtocolArg,
        /// Remote directory to list after connecting.
        #[arg(long, default_value = "/")]
        path: String,
        /// Use the simulated backend instead of a real server.
        #[arg(long)]
        simulate: bool,
    },
    Config {
        #[arg(long)]
        init: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolArg {
    Ftp,
    Sftp,
}
