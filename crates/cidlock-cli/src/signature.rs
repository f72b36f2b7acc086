//! Wallet signature sources for the CLI

use std::io::IsTerminal;

use anyhow::{Context, Result};
use secrecy::SecretString;

use cidlock_core::config::SessionConfig;
use cidlock_crypto::{Session, SignatureProvider};

/// Signature held in an environment variable
pub struct EnvSignature {
    pub var: String,
}

impl SignatureProvider for EnvSignature {
    fn signature(&self) -> Option<SecretString> {
        std::env::var(&self.var)
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from)
    }
}

/// Hidden interactive prompt; yields nothing when stdin is not a terminal
pub struct PromptSignature;

impl SignatureProvider for PromptSignature {
    fn signature(&self) -> Option<SecretString> {
        if !std::io::stdin().is_terminal() {
            return None;
        }
        rpassword::prompt_password("Wallet signature: ")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(SecretString::from)
    }
}

/// First provider that has a signature wins
pub struct FirstOf(pub Vec<Box<dyn SignatureProvider>>);

impl SignatureProvider for FirstOf {
    fn signature(&self) -> Option<SecretString> {
        self.0.iter().find_map(|p| p.signature())
    }
}

/// Open a session from the configured env var, falling back to a prompt.
pub fn open_session(cfg: &SessionConfig) -> Result<Session> {
    let providers = FirstOf(vec![
        Box::new(EnvSignature {
            var: cfg.signature_env.clone(),
        }),
        Box::new(PromptSignature),
    ]);
    Session::from_provider(&providers).with_context(|| {
        format!(
            "no wallet signature: set {} or run interactively",
            cfg.signature_env
        )
    })
}
