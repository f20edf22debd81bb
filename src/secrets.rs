//! Secret issuer.
//!
//! Every launched component carries four mandatory secrets: the shared
//! root CA, the shared public transport key, a per-component X.509
//! certificate, and a per-component arbiter token. Stores additionally
//! receive the private transport key.
//!
//! Certificates and tokens are minted fresh on every install — an
//! existing secret of the same name is removed and re-created, so a
//! reinstall rotates credentials and the arbiter always holds the latest
//! token.

use crate::arbiter::ArbiterRpc;
use crate::constants::{
    CERT_TARGET_FILE, ROOT_CA_SECRET, TOKEN_BYTES, TOKEN_TARGET_FILE, ZMQ_PUBLIC_KEY_SECRET,
    ZMQ_SECRET_KEY_SECRET,
};
use crate::error::{Error, Result};
use crate::runtime::{ContainerRuntime, SecretReference};
use crate::sla::ComponentType;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use rand::RngCore;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Certificate Authority
// =============================================================================

/// Signs per-component certificates under the platform root CA.
pub struct CertAuthority {
    ca: rcgen::Certificate,
}

impl CertAuthority {
    /// Loads the CA from its PEM-encoded certificate and private key.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key = rcgen::KeyPair::from_pem(key_pem).map_err(|e| Error::SecretFailed {
            name: "root-ca".to_string(),
            reason: format!("bad CA key: {}", e),
        })?;
        let params = rcgen::CertificateParams::from_ca_cert_pem(cert_pem, key).map_err(|e| {
            Error::SecretFailed {
                name: "root-ca".to_string(),
                reason: format!("bad CA cert: {}", e),
            }
        })?;
        let ca = rcgen::Certificate::from_params(params).map_err(|e| Error::SecretFailed {
            name: "root-ca".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { ca })
    }

    /// Generates a throwaway CA. Used at first boot and in tests.
    pub fn generate() -> Result<Self> {
        let mut params = rcgen::CertificateParams::new(vec![]);
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.distinguished_name = rcgen::DistinguishedName::new();
        let ca = rcgen::Certificate::from_params(params).map_err(|e| Error::SecretFailed {
            name: "root-ca".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { ca })
    }

    /// Issues a certificate for a component, covering `127.0.0.1` and the
    /// component's DNS name. Returns the certificate PEM concatenated
    /// with its private key PEM, the bundle format components mount.
    pub fn issue(&self, name: &str) -> Result<Vec<u8>> {
        let fail = |e: rcgen::RcgenError| Error::SecretFailed {
            name: name.to_string(),
            reason: e.to_string(),
        };

        let mut params = rcgen::CertificateParams::new(Vec::new());
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, name);
        params
            .subject_alt_names
            .push(rcgen::SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        params
            .subject_alt_names
            .push(rcgen::SanType::DnsName(name.to_string()));

        let cert = rcgen::Certificate::from_params(params).map_err(fail)?;
        let cert_pem = cert.serialize_pem_with_signer(&self.ca).map_err(fail)?;
        let key_pem = cert.serialize_private_key_pem();

        Ok(format!("{}{}", cert_pem, key_pem).into_bytes())
    }
}

// =============================================================================
// Token Generation
// =============================================================================

/// Generates a fresh arbiter token: 24 cryptographically-random bytes,
/// base64-encoded.
pub fn generate_token() -> String {
    let mut raw = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    BASE64_STANDARD.encode(raw)
}

// =============================================================================
// Secret Issuer
// =============================================================================

/// Mints per-component secret bundles and keeps the arbiter's token
/// registry current.
pub struct SecretIssuer {
    runtime: Arc<dyn ContainerRuntime>,
    arbiter: Arc<dyn ArbiterRpc>,
    ca: CertAuthority,
    root_ca_id: String,
    zmq_public_id: String,
    zmq_private_id: String,
}

impl SecretIssuer {
    /// Creates an issuer.
    ///
    /// `root_ca_id`, `zmq_public_id`, and `zmq_private_id` are the runtime
    /// ids of the globally-shared secrets referenced in every bundle.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        arbiter: Arc<dyn ArbiterRpc>,
        ca: CertAuthority,
        root_ca_id: String,
        zmq_public_id: String,
        zmq_private_id: String,
    ) -> Self {
        Self {
            runtime,
            arbiter,
            ca,
            root_ca_id,
            zmq_public_id,
            zmq_private_id,
        }
    }

    /// Mints the full secret bundle for a component and registers its
    /// fresh token with the arbiter.
    ///
    /// Returns the references to mount into the component's service spec:
    /// root CA, public transport key, `{NAME}.pem` as `DATABOX.pem`,
    /// `{NAME}_KEY` as `ARBITER_TOKEN`, and for stores the private
    /// transport key as `ZMQ_SECRET_KEY`.
    pub async fn mint(
        &self,
        name: &str,
        component_type: ComponentType,
    ) -> Result<Vec<SecretReference>> {
        let mut secrets = vec![
            SecretReference {
                secret_id: self.root_ca_id.clone(),
                secret_name: ROOT_CA_SECRET.to_string(),
                target_file: ROOT_CA_SECRET.to_string(),
            },
            SecretReference {
                secret_id: self.zmq_public_id.clone(),
                secret_name: ZMQ_PUBLIC_KEY_SECRET.to_string(),
                target_file: ZMQ_PUBLIC_KEY_SECRET.to_string(),
            },
        ];

        let cert = self.ca.issue(name)?;
        let cert_secret_name = format!("{}.pem", name.to_uppercase());
        secrets.push(
            self.create_secret(&cert_secret_name, &cert, CERT_TARGET_FILE)
                .await?,
        );

        let token = generate_token();
        let token_secret_name = format!("{}_KEY", name.to_uppercase());
        secrets.push(
            self.create_secret(&token_secret_name, token.as_bytes(), TOKEN_TARGET_FILE)
                .await?,
        );

        debug!("registering {} ({}) with arbiter", name, component_type);
        self.arbiter
            .register_component(name, &token, component_type)
            .await
            .map_err(|e| Error::PolicyGrantFailed {
                name: name.to_string(),
                operation: "register".to_string(),
                reason: e.to_string(),
            })?;

        // Only stores hold the private transport key.
        if component_type == ComponentType::Store {
            secrets.push(SecretReference {
                secret_id: self.zmq_private_id.clone(),
                secret_name: ZMQ_SECRET_KEY_SECRET.to_string(),
                target_file: ZMQ_SECRET_KEY_SECRET.to_string(),
            });
        }

        Ok(secrets)
    }

    /// Creates a runtime secret, replacing any existing secret of the
    /// same name.
    async fn create_secret(
        &self,
        name: &str,
        data: &[u8],
        target_file: &str,
    ) -> Result<SecretReference> {
        let existing = self.runtime.list_secrets(Some(name)).await?;
        for secret in existing {
            debug!("rotating secret {}", secret.name);
            if let Err(e) = self.runtime.remove_secret(&secret.id).await {
                debug!("old secret {} not removed: {}", secret.name, e);
            }
        }

        let secret_id = self.runtime.create_secret(name, data).await?;

        Ok(SecretReference {
            secret_id,
            secret_name: name.to_string(),
            target_file: target_file.to_string(),
        })
    }
}
