// Certificate chain material handed out in TLS configurations.
//
// Chains are kept as the verbatim PEM text of each certificate block, leaf
// first, because that is what the wire carries. Each block is checked to
// decode as a certificate when loaded; nothing is checked against a trust
// store.

use std::io::Cursor;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, S2aTrustError};

const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const END: &str = "-----END CERTIFICATE-----";

/// An ordered certificate chain, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    pems: Vec<String>,
    leaf_der: Vec<u8>,
}

impl CertificateChain {
    /// Parse a PEM bundle. Every `CERTIFICATE` block becomes one chain entry,
    /// in file order, including its trailing newline.
    pub fn from_pem(text: &str) -> Result<Self> {
        let pems = split_blocks(text)?;

        let mut ders = Vec::with_capacity(pems.len());
        for (i, pem) in pems.iter().enumerate() {
            let mut reader = Cursor::new(pem.as_bytes());
            let der = rustls_pemfile::certs(&mut reader)
                .next()
                .transpose()
                .map_err(|e| S2aTrustError::Certificate(format!("block {i}: {e}")))?
                .ok_or_else(|| {
                    S2aTrustError::Certificate(format!("block {i} is not a certificate"))
                })?;
            ders.push(der);
        }

        let leaf_der = ders
            .first()
            .map(|der| der.as_ref().to_vec())
            .ok_or_else(|| S2aTrustError::Certificate("no certificates found".into()))?;

        Ok(Self { pems, leaf_der })
    }

    /// Load a PEM bundle from disk.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            S2aTrustError::Certificate(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_pem(&text)
    }

    /// The PEM blocks in chain order.
    pub fn pems(&self) -> &[String] {
        &self.pems
    }

    /// Owned copy of the PEM blocks, as placed in a configuration message.
    pub fn to_strings(&self) -> Vec<String> {
        self.pems.clone()
    }

    /// Hex SHA-256 of the leaf certificate's DER encoding.
    pub fn leaf_fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.leaf_der);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn len(&self) -> usize {
        self.pems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pems.is_empty()
    }
}

fn split_blocks(text: &str) -> Result<Vec<String>> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(BEGIN) {
        let after = &rest[start..];
        let end = after
            .find(END)
            .ok_or_else(|| S2aTrustError::Certificate("unterminated certificate block".into()))?;
        let mut stop = end + END.len();
        if after[stop..].starts_with("\r\n") {
            stop += 2;
        } else if after[stop..].starts_with('\n') {
            stop += 1;
        }
        blocks.push(after[..stop].to_string());
        rest = &after[stop..];
    }
    if blocks.is_empty() {
        return Err(S2aTrustError::Certificate("no certificates found".into()));
    }
    Ok(blocks)
}
