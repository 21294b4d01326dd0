//! Public-key peer authentication for the routed transport.
//!
//! The server loads its certificate and, optionally, an allow-list of client
//! certificates (a single PEM file or a directory of them). A connecting
//! peer opens with `["AUTH", <certificate DER>]`; membership in the
//! allow-list admits it. With no allow-list configured any presented
//! certificate is accepted, mirroring a curve-style "allow any" server.
//!
//! Transport encryption is out of scope; this gates *who* may connect.

use std::collections::HashSet;
use std::fs;
use std::io::BufReader;
use std::path::Path;

use crate::error::AuthError;

/// Allow-list checker owned by the listening side.
#[derive(Debug)]
pub struct Authenticator {
    allowed: Option<HashSet<Vec<u8>>>,
}

impl Authenticator {
    /// Build from the configured allow-list path; `None` admits any peer
    /// that completes the handshake.
    pub fn new(client_certificates: Option<&Path>) -> Result<Self, AuthError> {
        let allowed = match client_certificates {
            Some(path) => Some(load_certificates(path)?.into_iter().collect()),
            None => None,
        };
        Ok(Self { allowed })
    }

    /// Whether a presented certificate may connect.
    pub fn verify(&self, certificate: &[u8]) -> bool {
        match &self.allowed {
            Some(allowed) => allowed.contains(certificate),
            None => !certificate.is_empty(),
        }
    }

    /// Number of allow-listed certificates, if restricted.
    pub fn allowed_count(&self) -> Option<usize> {
        self.allowed.as_ref().map(HashSet::len)
    }
}

/// Load the first certificate in a PEM file, DER-encoded.
pub fn load_identity(path: &Path) -> Result<Vec<u8>, AuthError> {
    read_pem(path)?
        .into_iter()
        .next()
        .ok_or_else(|| AuthError::Missing {
            path: path.to_path_buf(),
        })
}

/// Load every certificate under `path` (a PEM file or a directory of them).
fn load_certificates(path: &Path) -> Result<Vec<Vec<u8>>, AuthError> {
    let mut certificates = Vec::new();

    if path.is_dir() {
        let entries = fs::read_dir(path).map_err(|source| AuthError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| AuthError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if entry.path().is_file() {
                certificates.extend(read_pem(&entry.path())?);
            }
        }
    } else {
        certificates.extend(read_pem(path)?);
    }

    if certificates.is_empty() {
        return Err(AuthError::Missing {
            path: path.to_path_buf(),
        });
    }

    Ok(certificates)
}

fn read_pem(path: &Path) -> Result<Vec<Vec<u8>>, AuthError> {
    let file = fs::File::open(path).map_err(|source| AuthError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .map(|certificate| {
            certificate
                .map(|der| der.as_ref().to_vec())
                .map_err(|source| AuthError::Read {
                    path: path.to_path_buf(),
                    source,
                })
        })
        .collect()
}
