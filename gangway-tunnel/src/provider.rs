//! The provider registry: names, aliases, backend commands, and the
//! per-provider URL matcher.
//!
//! URL scraping over heterogeneous subprocess output is the one inherently
//! fragile boundary in this crate, so each provider's matcher is an isolated
//! regex tested against literal sample output.

use regex::Regex;
use std::sync::LazyLock;

/// Endpoint that serves the LocalTunnel public-access password.
pub const LOCALTUNNEL_PASSWORD_URL: &str = "https://loca.lt/mytunnelpassword";

static LOCALTUNNEL_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://[^\s]+\.loca\.lt").unwrap());
static CLOUDFLARED_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://[^\s]+\.trycloudflare\.com").unwrap());
static NGROK_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https://[^\s"]+\.ngrok[^\s"]*"#).unwrap());
static PINGGY_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+\.pinggy\.io").unwrap());
static LOCALTONET_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").unwrap());
static TUNNELTO_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+\.tunnelto\.dev").unwrap());

/// A pluggable tunnel backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// No signup needed; the default.
    LocalTunnel,
    Cloudflared,
    Ngrok,
    /// SSH-based, no client install needed.
    Pinggy,
    Localtonet,
    Tunnelto,
}

/// Free-form options a provider may consume.
#[derive(Debug, Clone, Default)]
pub struct TunnelOptions {
    /// Requested subdomain (LocalTunnel).
    pub subdomain: Option<String>,
    /// Auth token (ngrok).
    pub authtoken: Option<String>,
}

impl Provider {
    /// Resolve a provider name or alias. Unknown or absent names fall back
    /// to LocalTunnel.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("localtunnel") | Some("lt") => Self::LocalTunnel,
            Some("cloudflared") | Some("cloudflare") | Some("cf") => Self::Cloudflared,
            Some("ngrok") => Self::Ngrok,
            Some("pinggy") => Self::Pinggy,
            Some("localtonet") => Self::Localtonet,
            Some("tunnelto") => Self::Tunnelto,
            _ => Self::LocalTunnel,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalTunnel => "localtunnel",
            Self::Cloudflared => "cloudflared",
            Self::Ngrok => "ngrok",
            Self::Pinggy => "pinggy",
            Self::Localtonet => "localtonet",
            Self::Tunnelto => "tunnelto",
        }
    }

    /// The backend command for tunneling `port`.
    pub fn command(&self, port: u16, options: &TunnelOptions) -> (String, Vec<String>) {
        match self {
            Self::LocalTunnel => {
                let mut args = vec!["--port".to_string(), port.to_string()];
                if let Some(subdomain) = &options.subdomain {
                    args.push("--subdomain".to_string());
                    args.push(subdomain.clone());
                }
                ("lt".to_string(), args)
            }
            Self::Cloudflared => (
                "cloudflared".to_string(),
                vec![
                    "tunnel".to_string(),
                    "--url".to_string(),
                    format!("http://localhost:{port}"),
                ],
            ),
            Self::Ngrok => {
                let mut args = vec![
                    "http".to_string(),
                    port.to_string(),
                    "--log".to_string(),
                    "stdout".to_string(),
                    "--log-format".to_string(),
                    "logfmt".to_string(),
                ];
                if let Some(token) = &options.authtoken {
                    args.push("--authtoken".to_string());
                    args.push(token.clone());
                }
                ("ngrok".to_string(), args)
            }
            Self::Pinggy => (
                "ssh".to_string(),
                vec![
                    "-p".to_string(),
                    "443".to_string(),
                    format!("-R0:localhost:{port}"),
                    "-o".to_string(),
                    "StrictHostKeyChecking=no".to_string(),
                    "-o".to_string(),
                    "ServerAliveInterval=30".to_string(),
                    "a.pinggy.io".to_string(),
                ],
            ),
            Self::Localtonet => (
                "localtonet".to_string(),
                vec!["http".to_string(), "--port".to_string(), port.to_string()],
            ),
            Self::Tunnelto => (
                "tunnelto".to_string(),
                vec!["--port".to_string(), port.to_string()],
            ),
        }
    }

    /// Match this provider's public URL shape out of one output line.
    pub fn match_url(&self, line: &str) -> Option<String> {
        let pattern: &Regex = match self {
            Self::LocalTunnel => &LOCALTUNNEL_URL,
            Self::Cloudflared => &CLOUDFLARED_URL,
            Self::Ngrok => &NGROK_URL,
            Self::Pinggy => &PINGGY_URL,
            Self::Localtonet => &LOCALTONET_URL,
            Self::Tunnelto => &TUNNELTO_URL,
        };
        pattern.find(line).map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn aliases_resolve_to_the_same_provider() {
        assert_eq!(Provider::from_name(Some("lt")), Provider::LocalTunnel);
        assert_eq!(Provider::from_name(Some("cf")), Provider::Cloudflared);
        assert_eq!(
            Provider::from_name(Some("cloudflare")),
            Provider::Cloudflared
        );
        assert_eq!(Provider::from_name(Some("ngrok")), Provider::Ngrok);
    }

    #[test]
    fn unknown_or_absent_name_falls_back_to_localtunnel() {
        assert_eq!(Provider::from_name(None), Provider::LocalTunnel);
        assert_eq!(Provider::from_name(Some("serveo")), Provider::LocalTunnel);
        // Lookup is case-sensitive.
        assert_eq!(Provider::from_name(Some("Ngrok")), Provider::LocalTunnel);
    }

    #[test]
    fn cloudflared_matcher_finds_url_in_noise() {
        let provider = Provider::Cloudflared;
        assert_eq!(provider.match_url("connecting..."), None);
        assert_eq!(
            provider.match_url("2024-01-01 INF |  https://abc123.trycloudflare.com ready"),
            Some("https://abc123.trycloudflare.com".to_string())
        );
    }

    #[test]
    fn localtunnel_matcher_reads_the_client_banner() {
        assert_eq!(
            Provider::LocalTunnel.match_url("your url is: https://shiny-otter-12.loca.lt"),
            Some("https://shiny-otter-12.loca.lt".to_string())
        );
    }

    #[test]
    fn ngrok_matcher_reads_logfmt_output() {
        let line = r#"t=2024-01-01T00:00:00+0000 lvl=info msg="started tunnel" obj=tunnels name=command_line addr=http://localhost:8080 url=https://f00d.ngrok-free.app"#;
        assert_eq!(
            Provider::Ngrok.match_url(line),
            Some("https://f00d.ngrok-free.app".to_string())
        );
    }

    #[test]
    fn pinggy_matcher_accepts_http_and_https() {
        assert_eq!(
            Provider::Pinggy.match_url("http://ab12.a.pinggy.io"),
            Some("http://ab12.a.pinggy.io".to_string())
        );
        assert_eq!(
            Provider::Pinggy.match_url("https://ab12.a.pinggy.io"),
            Some("https://ab12.a.pinggy.io".to_string())
        );
    }

    #[test]
    fn tunnelto_matcher_requires_its_domain() {
        assert_eq!(Provider::Tunnelto.match_url("https://example.com"), None);
        assert_eq!(
            Provider::Tunnelto.match_url("==> https://myapp.tunnelto.dev"),
            Some("https://myapp.tunnelto.dev".to_string())
        );
    }

    #[test]
    fn commands_carry_port_and_options() {
        let (program, args) = Provider::LocalTunnel.command(
            3000,
            &TunnelOptions {
                subdomain: Some("myapp".to_string()),
                authtoken: None,
            },
        );
        assert_eq!(program, "lt");
        assert_eq!(args, vec!["--port", "3000", "--subdomain", "myapp"]);

        let (program, args) = Provider::Cloudflared.command(8080, &TunnelOptions::default());
        assert_eq!(program, "cloudflared");
        assert_eq!(args, vec!["tunnel", "--url", "http://localhost:8080"]);
    }
}
