use clap::Parser;
use std::path::PathBuf;

/// Serve a directory, optionally running a dev task and exposing the server
/// through a public tunnel.
#[derive(Debug, Parser)]
#[command(
    name = "gangway",
    version,
    about = "Local development server with process supervision and public tunnels"
)]
pub struct Cli {
    /// Directory to serve.
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Redirect every non-root path to /#<path> for hash-based SPA routing.
    #[arg(long)]
    pub spa: bool,

    /// Like --spa, but paths with a file extension are still served as files.
    #[arg(long, conflicts_with = "spa")]
    pub spa_ignore_assets: bool,

    /// Run an npm script from the served directory's package.json.
    #[arg(long, value_name = "SCRIPT", conflicts_with_all = ["exec", "pm2"])]
    pub run: Option<String>,

    /// Run an arbitrary shell command as the supervised process.
    #[arg(long, value_name = "COMMAND", conflicts_with = "pm2")]
    pub exec: Option<String>,

    /// Delegate the run to PM2 (`npm ...` targets are rewritten to
    /// `npm -- run <script>`).
    #[arg(long, value_name = "TARGET")]
    pub pm2: Option<String>,

    /// PM2 app name.
    #[arg(long)]
    pub name: Option<String>,

    /// Ask PM2 to watch for file changes.
    #[arg(long)]
    pub watch: bool,

    /// Expose the server publicly via a tunnel provider
    /// (localtunnel, cloudflared, ngrok, pinggy, localtonet, tunnelto).
    #[arg(
        long,
        value_name = "PROVIDER",
        num_args = 0..=1,
        default_missing_value = "localtunnel"
    )]
    pub tunnel: Option<String>,

    /// Requested tunnel subdomain (localtunnel).
    #[arg(long)]
    pub subdomain: Option<String>,

    /// Tunnel auth token (ngrok).
    #[arg(long)]
    pub authtoken: Option<String>,

    /// Append one JSON line per request to this file.
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "gangway.log"
    )]
    pub log_file: Option<PathBuf>,

    /// Rate-limit requests per client IP (100 requests per minute).
    #[arg(long)]
    pub rate_limit: bool,

    /// Accept multipart file uploads on POST /upload.
    #[arg(long)]
    pub upload: bool,

    /// Enable additional debug logs.
    #[arg(short, long)]
    pub verbose: bool,

    /// Silence all logs except errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
