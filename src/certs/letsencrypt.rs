// ABOUTME: certbot argument building and lookup of issued lineages under the live directory.
// ABOUTME: certbot may suffix a lineage with -0001 when a name is reissued.

use crate::config::ProxyKind;
use std::path::{Path, PathBuf};

pub const FULLCHAIN: &str = "fullchain.pem";
pub const PRIVKEY: &str = "privkey.pem";

/// How certbot proves control of the domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authenticator {
    /// Files dropped into a webroot that the proxy serves.
    Webroot,
    /// certbot edits the apache configuration itself.
    Apache,
    /// certbot binds port 80.
    Standalone,
}

impl Authenticator {
    /// None for traefik, which issues its own certificates.
    pub fn for_proxy(kind: Option<ProxyKind>) -> Option<Self> {
        match kind {
            Some(ProxyKind::Nginx) => Some(Authenticator::Webroot),
            Some(ProxyKind::Apache) => Some(Authenticator::Apache),
            Some(ProxyKind::Traefik) => None,
            None => Some(Authenticator::Standalone),
        }
    }
}

/// The lineage is named after the first domain and expanded in place when
/// the domain set grows, so reissues never land in a `-NNNN` sibling.
pub fn certonly_args(
    email: &str,
    authenticator: Authenticator,
    webroot: &Path,
    domains: &[String],
) -> Vec<String> {
    let mut args: Vec<String> = ["certonly", "--non-interactive", "--agree-tos", "--email", email]
        .iter()
        .map(|s| s.to_string())
        .collect();

    match authenticator {
        Authenticator::Webroot => {
            args.push("--webroot".to_string());
            args.push("-w".to_string());
            args.push(webroot.to_string_lossy().into_owned());
        }
        Authenticator::Apache => args.push("--apache".to_string()),
        Authenticator::Standalone => {
            args.extend(["--standalone", "--http-01-port", "80"].map(String::from));
        }
    }

    if let Some(primary) = domains.first() {
        args.extend(["--cert-name".to_string(), primary.clone(), "--expand".to_string()]);
    }
    for domain in domains {
        args.push("-d".to_string());
        args.push(domain.clone());
    }
    args
}

fn has_pair(dir: &Path) -> bool {
    dir.join(FULLCHAIN).is_file() && dir.join(PRIVKEY).is_file()
}

/// Lineage directories for `primary` holding both files: the exact name first,
/// then `<primary>-NNNN` in name order.
pub fn lineage_dirs(live_dir: &Path, primary: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let exact = live_dir.join(primary);
    if has_pair(&exact) {
        found.push(exact);
    }

    let Ok(entries) = std::fs::read_dir(live_dir) else {
        return found;
    };
    let mut numbered: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .and_then(|n| n.strip_prefix(primary))
                .and_then(|rest| rest.strip_prefix('-'))
                .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        })
        .map(|e| e.path())
        .filter(|p| has_pair(p))
        .collect();
    numbered.sort();
    found.extend(numbered);
    found
}

/// DNS names from `openssl x509 -noout -ext subjectAltName` output.
pub fn parse_san_output(output: &str) -> Vec<String> {
    output
        .split([',', '\n'])
        .filter_map(|part| part.trim().strip_prefix("DNS:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn covers_all(sans: &[String], domains: &[String]) -> bool {
    domains
        .iter()
        .all(|d| sans.iter().any(|s| s.eq_ignore_ascii_case(d)))
}
