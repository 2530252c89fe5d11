use std::io::Read;

use anyhow::{bail, Context};

use crate::config::config;
use crate::crypto::CredentialCipher;

/// Print the registry token for a tenant database password.
pub fn handle(plaintext: Option<String>) -> anyhow::Result<()> {
    let security = &config().security;
    if security.encryption_secret.is_empty() {
        bail!("CREDENTIAL_ENCRYPTION_SECRET must be set");
    }

    let plaintext = match plaintext {
        Some(value) => value,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read password from stdin")?;
            buf.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if plaintext.is_empty() {
        bail!("password must not be empty");
    }

    let cipher = CredentialCipher::new(security.encryption_secret.expose(), &security.kdf());
    let token = cipher.encrypt(&plaintext).context("encryption failed")?;
    println!("{}", token);
    Ok(())
}
