//! Credential store (C5): parses `~/.sane/pass`-style files and serves
//! credentials by backend name.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead};
use std::path::Path;

use tracing::warn;

use crate::auth::split_resource;

/// One `username:password:backendName` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub backend: String,
}

/// Backend name -> first credential seen for it, in file order.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    by_backend: HashMap<String, Credential>,
}

impl CredentialStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads credentials from `$HOME/.sane/pass`. A missing file yields an
    /// empty store rather than an error, matching the daemon's own "no
    /// credentials configured" posture.
    pub fn load_default() -> io::Result<Self> {
        let Some(home) = std::env::var_os("HOME") else {
            warn!("HOME is not set; credential store left empty");
            return Ok(Self::empty());
        };
        let path = Path::new(&home).join(".sane").join("pass");
        match fs::File::open(&path) {
            Ok(file) => Self::parse(io::BufReader::new(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(err) => Err(err),
        }
    }

    /// Parses credential records from any line-oriented source.
    pub fn parse<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut store = Self::empty();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(3, ':');
            let (Some(username), Some(password), Some(backend)) =
                (fields.next(), fields.next(), fields.next())
            else {
                warn!(line = lineno + 1, "malformed credential line, ignoring");
                continue;
            };
            let credential = Credential {
                username: username.to_owned(),
                password: password.to_owned(),
                backend: backend.to_owned(),
            };
            if store.by_backend.contains_key(&credential.backend) {
                warn!(backend = %credential.backend, "duplicate credential entry, keeping the first");
                continue;
            }
            store.by_backend.insert(credential.backend.clone(), credential);
        }
        Ok(store)
    }

    /// Looks up a credential by the resource name the daemon sent during
    /// `AUTHORIZE`, stripping any `$MD5$<salt>` suffix first.
    pub fn find_for_resource(&self, resource: &str) -> Option<&Credential> {
        let (backend, _salt) = split_resource(resource);
        self.by_backend.get(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_well_formed_lines() {
        let store = CredentialStore::parse(Cursor::new("alice:secret:net\nbob:hunter2:pixma\n")).unwrap();
        assert_eq!(store.find_for_resource("net").unwrap().username, "alice");
        assert_eq!(store.find_for_resource("pixma$MD5$abcd").unwrap().username, "bob");
    }

    #[test]
    fn ignores_malformed_and_comment_lines() {
        let store = CredentialStore::parse(Cursor::new("# comment\nnope\nalice:secret:net\n")).unwrap();
        assert!(store.find_for_resource("nope").is_none());
        assert_eq!(store.by_backend.len(), 1);
    }

    #[test]
    fn first_duplicate_wins() {
        let store =
            CredentialStore::parse(Cursor::new("alice:first:net\nbob:second:net\n")).unwrap();
        assert_eq!(store.find_for_resource("net").unwrap().username, "alice");
    }

    #[test]
    fn unknown_resource_is_none() {
        let store = CredentialStore::empty();
        assert!(store.find_for_resource("net").is_none());
    }
}
