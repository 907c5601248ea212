use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CREATE_TYPE_IMPORTED: &str = "CERTIFICATE_CREATE_IMPORTED";

/// Certificate entry as returned by the appliance's certificate choice lists.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    pub id: i64,
    pub name: String,
}

/// Body of `POST certificate` for importing an existing certificate and key.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateCreate {
    pub name: String,
    pub privatekey: String,
    pub certificate: String,
    pub create_type: &'static str,
}

impl CertificateCreate {
    pub fn imported(name: &str, material: CertificateMaterial) -> Self {
        Self {
            name: name.to_string(),
            privatekey: material.private_key,
            certificate: material.certificate,
            create_type: CREATE_TYPE_IMPORTED,
        }
    }
}

#[derive(Error, Debug)]
pub enum MaterialError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} does not contain PEM data: {reason}")]
    NotPem { path: PathBuf, reason: String },
    #[error("{path} has no {expected} block")]
    MissingBlock {
        path: PathBuf,
        expected: &'static str,
    },
    #[error("{path} is not a valid X.509 certificate: {reason}")]
    InvalidCertificate { path: PathBuf, reason: String },
    #[error("certificate {path} expired at {not_after}")]
    Expired {
        path: PathBuf,
        not_after: DateTime<Utc>,
    },
}

/// PEM text of a certificate chain and its private key, read from disk.
#[derive(Debug, Clone)]
pub struct CertificateMaterial {
    pub certificate: String,
    pub private_key: String,
    pub subject: String,
    pub not_after: DateTime<Utc>,
}

/// Remote name for the certificate uploaded on `date`: `<prefix>_<YYYYMMDD>`.
pub fn certificate_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}", prefix, date.format("%Y%m%d"))
}

/// First certificate whose name matches exactly.
pub fn find_by_name<'a>(certificates: &'a [Certificate], name: &str) -> Option<&'a Certificate> {
    certificates.iter().find(|cert| cert.name == name)
}

/// Reads the certificate chain and key files, checks both are PEM, and rejects
/// a leaf certificate that is already past its expiry.
pub fn load_material(
    cert_path: &Path,
    key_path: &Path,
    now: DateTime<Utc>,
) -> Result<CertificateMaterial, MaterialError> {
    let certificate = read_file(cert_path)?;
    let private_key = read_file(key_path)?;

    let cert_blocks = parse_pem(cert_path, &certificate)?;
    let leaf = cert_blocks
        .iter()
        .find(|block| block.tag() == "CERTIFICATE")
        .ok_or_else(|| MaterialError::MissingBlock {
            path: cert_path.to_path_buf(),
            expected: "CERTIFICATE",
        })?;

    let key_blocks = parse_pem(key_path, &private_key)?;
    if !key_blocks
        .iter()
        .any(|block| block.tag().ends_with("PRIVATE KEY"))
    {
        return Err(MaterialError::MissingBlock {
            path: key_path.to_path_buf(),
            expected: "PRIVATE KEY",
        });
    }

    let (_, parsed) = x509_parser::parse_x509_certificate(leaf.contents()).map_err(|err| {
        MaterialError::InvalidCertificate {
            path: cert_path.to_path_buf(),
            reason: err.to_string(),
        }
    })?;

    let subject = parsed.subject().to_string();
    let not_after_ts = parsed.validity().not_after.timestamp();
    let not_after = DateTime::<Utc>::from_timestamp(not_after_ts, 0).ok_or_else(|| {
        MaterialError::InvalidCertificate {
            path: cert_path.to_path_buf(),
            reason: format!("notAfter out of range: {not_after_ts}"),
        }
    })?;

    if not_after <= now {
        return Err(MaterialError::Expired {
            path: cert_path.to_path_buf(),
            not_after,
        });
    }

    info!(
        "[certificates] loaded {} (subject: {}, expires {})",
        cert_path.display(),
        subject,
        not_after.format("%Y-%m-%d")
    );

    Ok(CertificateMaterial {
        certificate,
        private_key,
        subject,
        not_after,
    })
}

fn read_file(path: &Path) -> Result<String, MaterialError> {
    std::fs::read_to_string(path).map_err(|source| MaterialError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_pem(path: &Path, data: &str) -> Result<Vec<pem::Pem>, MaterialError> {
    let blocks = pem::parse_many(data).map_err(|err| MaterialError::NotPem {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    if blocks.is_empty() {
        return Err(MaterialError::NotPem {
            path: path.to_path_buf(),
            reason: "no PEM blocks found".to_string(),
        });
    }
    Ok(blocks)
}
