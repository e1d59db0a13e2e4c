//! Endpoint resolution for loosely formatted host specifications.
//!
//! Accepts strings of the shape `[scheme://][user:pass@]host[:port][/path...]`
//! and normalizes them into an [`Endpoint`]. Resolution is eager: a malformed
//! specification fails here, never at the first request.

use crate::error::ConfigurationError;
use crate::scrub::scrub;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PORT: u16 = 9200;

/// Transport scheme of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Normalized connection target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Raw `user:pass`, kept verbatim.
    pub user_info: Option<String>,
    /// Always starts and ends with `/`.
    pub base_path: String,
}

/// An endpoint together with a fully composed request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub endpoint: Endpoint,
    pub path: String,
}

impl Endpoint {
    /// Parse a host specification.
    pub fn parse(spec: &str) -> Result<Self, ConfigurationError> {
        let trimmed = spec.trim();
        let safe_spec = scrub(trimmed);
        if trimmed.is_empty() {
            return Err(ConfigurationError::EmptyHost(safe_spec));
        }

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((raw, rest)) => {
                let scheme = match raw.to_ascii_lowercase().as_str() {
                    "http" => Scheme::Http,
                    "https" => Scheme::Https,
                    _ => {
                        return Err(ConfigurationError::UnsupportedScheme {
                            spec: safe_spec,
                            scheme: raw.to_string(),
                        })
                    }
                };
                (scheme, rest)
            }
            None => (Scheme::Http, trimmed),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (user_info, host_port) = match authority.rsplit_once('@') {
            Some((user_info, host_port)) => (Some(user_info.to_string()), host_port),
            None => (None, authority),
        };

        let (host, port) = split_host_port(host_port, &safe_spec)?;
        validate_host(host, &safe_spec)?;

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            user_info,
            base_path: normalize_base_path(path),
        })
    }

    /// Request path for `suffix`, relative to the base path.
    pub fn path_for(&self, suffix: &str) -> String {
        format!("{}{}", self.base_path, suffix.trim_start_matches('/'))
    }

    /// Request url for `suffix`. Credentials are never part of the url; they
    /// travel as basic auth.
    pub fn url_for(&self, suffix: &str) -> Result<Url, ConfigurationError> {
        let raw = format!(
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path_for(suffix)
        );
        Url::parse(&raw).map_err(|e| ConfigurationError::InvalidUrl {
            spec: scrub(&self.canonical()),
            reason: e.to_string(),
        })
    }

    /// Username and optional password split out of `user_info`.
    pub fn credentials(&self) -> Option<(&str, Option<&str>)> {
        self.user_info.as_deref().map(|info| match info.split_once(':') {
            Some((user, pass)) => (user, Some(pass)),
            None => (info, None),
        })
    }

    /// Full string form, credentials included. Parsing it yields an equal endpoint.
    pub fn canonical(&self) -> String {
        let mut out = format!("{}://", self.scheme.as_str());
        if let Some(info) = &self.user_info {
            out.push_str(info);
            out.push('@');
        }
        out.push_str(&self.host);
        out.push(':');
        out.push_str(&self.port.to_string());
        out.push_str(&self.base_path);
        out
    }
}

/// Display form with the password redacted; safe for logs.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&scrub(&self.canonical()))
    }
}

/// Resolve `spec` and compose the request path for `suffix_path`.
pub fn parse_host_with_path(
    spec: &str,
    suffix_path: &str,
) -> Result<ResolvedPath, ConfigurationError> {
    let endpoint = Endpoint::parse(spec)?;
    let path = endpoint.path_for(suffix_path);
    Ok(ResolvedPath { endpoint, path })
}

fn split_host_port<'a>(
    host_port: &'a str,
    safe_spec: &str,
) -> Result<(&'a str, u16), ConfigurationError> {
    // Bracketed IPv6 literal: [::1]:9200
    let (host, port) = if host_port.starts_with('[') {
        match host_port.find(']') {
            Some(end) => {
                let host = &host_port[..=end];
                let tail = &host_port[end + 1..];
                match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None if tail.is_empty() => (host, None),
                    None => {
                        return Err(ConfigurationError::InvalidHost {
                            spec: safe_spec.to_string(),
                            host: host_port.to_string(),
                        })
                    }
                }
            }
            None => {
                return Err(ConfigurationError::InvalidHost {
                    spec: safe_spec.to_string(),
                    host: host_port.to_string(),
                })
            }
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };

    if host.is_empty() {
        return Err(ConfigurationError::EmptyHost(safe_spec.to_string()));
    }

    let port = match port {
        None => DEFAULT_PORT,
        Some(raw) => raw
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| ConfigurationError::InvalidPort {
                spec: safe_spec.to_string(),
                port: raw.to_string(),
            })?,
    };

    Ok((host, port))
}

fn validate_host(host: &str, safe_spec: &str) -> Result<(), ConfigurationError> {
    let valid = if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        !inner.is_empty() && inner.chars().all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.')
    } else {
        host.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !host.starts_with('.')
            && !host.ends_with('.')
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidHost {
            spec: safe_spec.to_string(),
            host: host.to_string(),
        })
    }
}

fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
