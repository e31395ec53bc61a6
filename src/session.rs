use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::SessionError;

/// Authentication state of one client. Passed by reference to whatever issues
/// remote calls; changes only through `login` and `logout`.
#[derive(Debug, Default)]
pub struct Session {
    token: Option<String>,
    store: Option<PathBuf>,
}

impl Session {
    pub fn anonymous() -> Self {
        Session::default()
    }

    /// A session backed by a token file. A missing file means logged out.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let token = match fs::read_to_string(&path) {
            Ok(raw) => Some(raw.trim().to_string()).filter(|token| !token.is_empty()),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), authenticated = token.is_some(), "session loaded");
        Ok(Session {
            token,
            store: Some(path),
        })
    }

    pub fn login(&mut self, token: impl Into<String>) -> Result<(), SessionError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }
        if let Some(path) = &self.store {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            fs::write(path, &token)?;
        }
        self.token = Some(token);
        info!("logged in");
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), SessionError> {
        self.token = None;
        if let Some(path) = &self.store {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        info!("logged out");
        Ok(())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}
