use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "challenz-server", about = "Challenz admin dashboard backend")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/challenz.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Print an argon2 hash for `auth.admin_password_hash`
    HashPassword {
        password: String,
    },
}
