//! Connection-string handling.
//!
//! The driver does the authoritative parse; this module only extracts what the
//! connection manager needs up front (working database name, replica-set flag)
//! and fills in missing credentials before the driver ever sees the string.

use std::fmt;

use dialoguer::{Input, Password};
use url::form_urlencoded;

use crate::error::{DbError, Result};

/// A `scheme://[user[:pass]@]hosts[/path][?query]` string split into parts.
///
/// Credentials are kept percent-encoded, exactly as they appear in the URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    scheme: String,
    username: Option<String>,
    password: Option<String>,
    hosts: String,
    path: Option<String>,
    query: Option<String>,
}

impl ConnectionString {
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| DbError::Config(format!("missing scheme separator in `{}`", redact(uri))))?;
        if scheme.is_empty() {
            return Err(DbError::Config("connection string has no scheme".to_string()));
        }

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query.to_string())),
            None => (rest, None),
        };
        let (authority, path) = match location.split_once('/') {
            Some((authority, path)) => (authority, Some(path.to_string())),
            None => (location, None),
        };
        let (userinfo, hosts) = match authority.rsplit_once('@') {
            Some((userinfo, hosts)) => (Some(userinfo), hosts),
            None => (None, authority),
        };
        if hosts.is_empty() {
            return Err(DbError::Config("connection string has no hosts".to_string()));
        }
        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(info.to_string()), None),
            },
            None => (None, None),
        };

        Ok(Self {
            scheme: scheme.to_string(),
            username,
            password,
            hosts: hosts.to_string(),
            path,
            query,
        })
    }

    pub fn hosts(&self) -> &str {
        &self.hosts
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// First value of a query option, percent-decoded.
    pub fn query_param(&self, key: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Path segment after the last `/`, falling back to `authSource`.
    pub fn database_name(&self) -> String {
        let segment = self
            .path
            .as_deref()
            .map(|path| path.rsplit('/').next().unwrap_or(path))
            .unwrap_or("");
        if !segment.is_empty() {
            return segment.to_string();
        }
        self.query_param("authSource").unwrap_or_default()
    }

    pub fn replica_set_name(&self) -> Option<String> {
        self.query_param("replicaSet").filter(|name| !name.is_empty())
    }

    pub fn is_replica_set(&self) -> bool {
        self.replica_set_name().is_some()
    }

    fn is_local(&self) -> bool {
        self.hosts.starts_with("localhost") || self.hosts.starts_with("127.0.0.1")
    }

    /// Same string with the password replaced, safe for logs.
    pub fn redacted(&self) -> String {
        let mut masked = self.clone();
        if masked.password.is_some() {
            masked.password = Some("***".to_string());
        }
        masked.to_string()
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(user) = &self.username {
            write!(f, "{}", user)?;
            if let Some(pass) = &self.password {
                write!(f, ":{}", pass)?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}", self.hosts)?;
        if let Some(path) = &self.path {
            write!(f, "/{}", path)?;
        }
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

/// Working database name for a connection string; empty when unparseable.
pub fn database_name(uri: &str) -> String {
    ConnectionString::parse(uri)
        .map(|cs| cs.database_name())
        .unwrap_or_default()
}

pub fn is_replica_set(uri: &str) -> bool {
    ConnectionString::parse(uri)
        .map(|cs| cs.is_replica_set())
        .unwrap_or(false)
}

fn redact(uri: &str) -> String {
    match uri.rsplit_once('@') {
        Some((_, hosts)) => format!("***@{}", hosts),
        None => uri.to_string(),
    }
}

/// Source of credentials that are missing from a connection string.
///
/// An empty answer means "leave it unset".
pub trait CredentialPrompt {
    fn username(&mut self) -> String;
    fn password(&mut self) -> String;
    fn database(&mut self) -> String;
}

/// Interactive terminal prompt.
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn username(&mut self) -> String {
        Input::<String>::new()
            .with_prompt("Enter username")
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default()
    }

    fn password(&mut self) -> String {
        Password::new()
            .with_prompt("Enter password")
            .allow_empty_password(true)
            .interact()
            .unwrap_or_default()
    }

    fn database(&mut self) -> String {
        Input::<String>::new()
            .with_prompt("Enter database name")
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default()
    }
}

/// Fill in whatever the connection string is missing before connecting.
///
/// - a user without a password gets a password prompt
/// - no user at all on a non-local host prompts for both
/// - no database name prompts for one
pub fn prepare_uri(uri: &str, prompt: &mut impl CredentialPrompt) -> Result<String> {
    let mut cs = ConnectionString::parse(uri)
        .map_err(|e| DbError::Config(format!("failed to prepare credentials: {}", e)))?;

    match cs.username.clone() {
        Some(_) if cs.password.is_none() => {
            cs.password = Some(encode(&prompt.password()));
        }
        Some(_) => {}
        None if cs.is_local() => {
            tracing::info!(
                hosts = %cs.hosts,
                "credentials missing from connection string, local host so skipping prompt"
            );
        }
        None => {
            tracing::warn!(hosts = %cs.hosts, "credentials missing from connection string");
            let user = prompt.username();
            let pass = prompt.password();
            if !user.is_empty() {
                cs.username = Some(encode(&user));
                if !pass.is_empty() {
                    cs.password = Some(encode(&pass));
                }
            }
        }
    }

    if cs.database_name().is_empty() {
        let name = prompt.database();
        if !name.is_empty() {
            cs.path = Some(encode(&name));
        }
    }

    Ok(cs.to_string())
}

fn encode(raw: &str) -> String {
    // form encoding turns spaces into '+', userinfo wants %20
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
