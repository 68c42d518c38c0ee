use std::net::SocketAddr;

use clap::Args;
use duelboard_netproto::RuleVariant;

pub const DEFAULT_BIND: &str = "0.0.0.0:5270";
pub const DEFAULT_SERVICE: &str = "duelboard";

/// Options shared by every peer session.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Address to listen on when waiting for a peer.
    #[arg(long, default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Service name the listener advertises.
    #[arg(long, default_value = DEFAULT_SERVICE)]
    pub service: String,

    /// Win condition: `standard` or `misere`.
    #[arg(long, default_value_t = RuleVariant::Misere)]
    pub rule: RuleVariant,

    /// After a reset, re-claim the previous first mover instead of
    /// negotiating again.
    #[arg(long)]
    pub keep_roles_on_reset: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5270)),
            service: DEFAULT_SERVICE.to_string(),
            rule: RuleVariant::default(),
            keep_roles_on_reset: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        peer: PeerConfig,
    }

    #[test]
    fn defaults_match_cli_defaults() {
        let cli = Cli::parse_from(["duelboard-peer"]);
        assert_eq!(cli.peer, PeerConfig::default());
        assert_eq!(cli.peer.bind.to_string(), DEFAULT_BIND);
    }

    #[test]
    fn overrides_parse() {
        let cli = Cli::parse_from([
            "duelboard-peer",
            "--bind",
            "127.0.0.1:0",
            "--rule",
            "Standard",
            "--keep-roles-on-reset",
        ]);
        assert_eq!(cli.peer.rule, RuleVariant::Standard);
        assert_eq!(cli.peer.bind.port(), 0);
        assert!(cli.peer.keep_roles_on_reset);
    }

    #[test]
    fn unknown_rule_is_rejected() {
        assert!(Cli::try_parse_from(["duelboard-peer", "--rule", "chess"]).is_err());
    }
}
