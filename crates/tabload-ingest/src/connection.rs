//! Destination connection resolution
//!
//! Two configuration shapes are accepted, tried in order:
//!
//! 1. `DATABASE_URL`: a ready connection URL, used as-is
//! 2. `DATABASE_CONN_STR`: a raw driver string of `key=value` pairs
//!    (libpq or ODBC style, separated by `;` or whitespace, values optionally
//!    quoted as `'...'` or `{...}`). Values are form-encoded and embedded in
//!    `postgres:///?key=value&...`
//!
//! Resolution is pure. [`ConnectionDescriptor::connect_lazy`] builds a pool
//! that opens its connection on first use.

use crate::error::{IngestError, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::iter::Peekable;
use std::str::{Chars, FromStr};
use tracing::{info, warn};
use url::form_urlencoded::byte_serialize;

/// Prefix of the generic connector URI built from a raw driver string
pub const CONNECTOR_URI_PREFIX: &str = "postgres:///?";

/// Query parameters the connector URI understands
const KNOWN_PARAMS: &[&str] = &[
    "host",
    "hostaddr",
    "port",
    "dbname",
    "user",
    "password",
    "sslmode",
    "sslrootcert",
    "sslcert",
    "sslkey",
    "application_name",
    "options",
];

/// Raw connection settings as configured
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub database_url: Option<String>,
    pub conn_str: Option<String>,
}

/// Which configuration shape produced a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSource {
    DatabaseUrl,
    DriverString,
}

/// Resolved, not yet connected, description of the destination
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    uri: String,
    source: ConnectionSource,
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("source", &self.source)
            .field("uri", &"<redacted>")
            .finish()
    }
}

impl ConnectionSettings {
    /// Pick exactly one descriptor from the configured values.
    pub fn resolve(&self) -> Result<ConnectionDescriptor> {
        if let Some(url) = non_blank(&self.database_url) {
            info!("Using DATABASE_URL");
            return Ok(ConnectionDescriptor {
                uri: url.to_string(),
                source: ConnectionSource::DatabaseUrl,
            });
        }

        let Some(raw) = non_blank(&self.conn_str) else {
            return Err(IngestError::config(
                "Provide DATABASE_URL or DATABASE_CONN_STR (environment or .env file)",
            ));
        };

        info!("Using DATABASE_CONN_STR via connector URI");
        Ok(ConnectionDescriptor {
            uri: encode_driver_string(raw)?,
            source: ConnectionSource::DriverString,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ConnectionDescriptor {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn source(&self) -> ConnectionSource {
        self.source
    }

    /// Pool with a single connection, established on first query.
    pub fn connect_lazy(&self) -> Result<PgPool> {
        let options = PgConnectOptions::from_str(&self.uri)?;
        Ok(PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options))
    }
}

/// Map common ODBC keys onto libpq names
fn canonical_key(key: &str) -> String {
    match key.to_lowercase().as_str() {
        "server" | "data source" | "addr" | "address" => "host".to_string(),
        "database" | "initial catalog" => "dbname".to_string(),
        "uid" | "username" | "user id" => "user".to_string(),
        "pwd" => "password".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairStyle {
    /// ODBC: `Key=Value;Key={va;lue}`
    Semicolon,
    /// libpq: `key=value key='va lue'`
    Whitespace,
}

/// Body of a `'...'` value after the opening quote; `\x` stands for `x`.
/// `None` when the closing quote is missing.
fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut value = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?),
            '\'' => return Some(value),
            c => value.push(c),
        }
    }
    None
}

/// Body of a `{...}` value after the opening brace; `}}` stands for `}`.
/// `None` when the closing brace is missing.
fn read_braced(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut value = String::new();
    while let Some(c) = chars.next() {
        if c == '}' && chars.next_if_eq(&'}').is_none() {
            return Some(value);
        }
        value.push(c);
    }
    None
}

/// `;` outside a quoted or braced value selects the ODBC layout.
fn pair_style(raw: &str) -> PairStyle {
    let mut chars = raw.chars().peekable();
    let mut value_start = false;
    while let Some(c) = chars.next() {
        match c {
            '=' => {
                value_start = true;
                continue;
            },
            c if c.is_whitespace() => continue,
            '\'' if value_start => {
                read_quoted(&mut chars);
            },
            '{' if value_start => {
                read_braced(&mut chars);
            },
            ';' => return PairStyle::Semicolon,
            _ => {},
        }
        value_start = false;
    }
    PairStyle::Whitespace
}

/// Split a raw driver string into `(key, value)` pairs.
///
/// Pairs are separated by `;` when one appears outside a value, otherwise by
/// whitespace. A value may be wrapped in `'...'` (libpq, `\'` escapes) or
/// `{...}` (ODBC, `}}` escapes) to carry separators.
fn parse_driver_pairs(raw: &str) -> Result<Vec<(String, String)>> {
    let style = pair_style(raw);
    let is_sep = |c: char| match style {
        PairStyle::Semicolon => c == ';',
        PairStyle::Whitespace => c.is_whitespace(),
    };

    let mut chars = raw.chars().peekable();
    let mut pairs = Vec::new();

    loop {
        while chars.next_if(|&c| is_sep(c) || c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        // never echo the text, it may hold part of a password
        let position = pairs.len() + 1;
        let malformed = |what: &str| {
            IngestError::config(format!("malformed DATABASE_CONN_STR pair #{position}: {what}"))
        };

        let mut key = String::new();
        loop {
            match chars.next() {
                Some('=') => break,
                Some(c) if is_sep(c) && style == PairStyle::Whitespace => {
                    // libpq allows `key = value`
                    while chars.next_if(|c| c.is_whitespace()).is_some() {}
                    if chars.next_if_eq(&'=').is_none() {
                        return Err(malformed("expected key=value"));
                    }
                    break;
                },
                Some(c) if is_sep(c) => return Err(malformed("expected key=value")),
                Some(c) => key.push(c),
                None => return Err(malformed("expected key=value")),
            }
        }
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed("empty key"));
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let value = match chars.peek() {
            Some('\'') | Some('{') => {
                let quoted = if chars.next() == Some('{') {
                    read_braced(&mut chars)
                } else {
                    read_quoted(&mut chars)
                };
                let value = quoted.ok_or_else(|| malformed("unterminated quoted value"))?;
                while chars.next_if(|&c| c.is_whitespace() && !is_sep(c)).is_some() {}
                if chars.next_if(|&c| !is_sep(c)).is_some() {
                    return Err(malformed("unexpected text after quoted value"));
                }
                value
            },
            _ => {
                let mut value = String::new();
                while let Some(c) = chars.next_if(|&c| !is_sep(c)) {
                    value.push(c);
                }
                value.trim_end().to_string()
            },
        };

        pairs.push((canonical_key(key), value));
    }

    Ok(pairs)
}

/// Percent-encode a raw driver string into the generic connector URI.
pub fn encode_driver_string(raw: &str) -> Result<String> {
    let mut params: Vec<(String, String)> = Vec::new();

    for (key, value) in parse_driver_pairs(raw)? {
        if key == "host" {
            // ODBC style "tcp:server,1433"
            let host = value.strip_prefix("tcp:").unwrap_or(&value);
            match host.split_once(',') {
                Some((host, port)) => {
                    params.push(("host".to_string(), host.to_string()));
                    params.push(("port".to_string(), port.to_string()));
                },
                None => params.push(("host".to_string(), host.to_string())),
            }
        } else if KNOWN_PARAMS.contains(&key.as_str()) {
            params.push((key, value));
        } else {
            warn!(key = %key, "Ignoring unsupported connection string key");
        }
    }

    if params.is_empty() {
        return Err(IngestError::config(
            "DATABASE_CONN_STR contains no usable key=value pairs",
        ));
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, byte_serialize(v.as_bytes()).collect::<String>()))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!("{CONNECTOR_URI_PREFIX}{query}"))
}
