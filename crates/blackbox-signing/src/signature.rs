//! Signing and verification over canonical bytes.
//!
//! Signatures are Ed25519 over the canonical encoding, carried as standard
//! base64 text. Verification never raises for a bad signature: malformed
//! base64, a wrong length or a cryptographic mismatch all yield `false`.
//! Only canonicalization failures surface as errors, because they mean the
//! value itself cannot be signed faithfully.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer};

use blackbox_canon::{canonicalize, Canonicalize, SigningPayload};
use blackbox_contracts::{error::BlackBoxResult, event::Event};

use crate::keys::{PrivateKey, PublicKey};

/// Sign already-canonical bytes.
pub fn sign(canonical_bytes: &[u8], key: &PrivateKey) -> String {
    let signature = key.signing_key().sign(canonical_bytes);
    BASE64.encode(signature.to_bytes())
}

/// Check `signature_text` over already-canonical bytes.
pub fn verify(canonical_bytes: &[u8], signature_text: &str, key: &PublicKey) -> bool {
    let Ok(raw) = BASE64.decode(signature_text.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&raw) else {
        return false;
    };
    key.verifying_key()
        .verify_strict(canonical_bytes, &signature)
        .is_ok()
}

/// Canonicalize `value` and sign the result.
pub fn sign_value<T: Canonicalize + ?Sized>(value: &T, key: &PrivateKey) -> BlackBoxResult<String> {
    let bytes = canonicalize(value)?;
    Ok(sign(&bytes, key))
}

/// Canonicalize `value` and check `signature_text` against it.
pub fn verify_value<T: Canonicalize + ?Sized>(
    value: &T,
    signature_text: &str,
    key: &PublicKey,
) -> BlackBoxResult<bool> {
    let bytes = canonicalize(value)?;
    Ok(verify(&bytes, signature_text, key))
}

/// Sign the event's five signed fields and attach the signature.
pub fn sign_event(event: &mut Event, key: &PrivateKey) -> BlackBoxResult<()> {
    let signature = sign_value(&SigningPayload::of(event), key)?;
    event.signature = Some(signature);
    Ok(())
}

/// Consume `event` and return it signed.
pub fn signed_event(mut event: Event, key: &PrivateKey) -> BlackBoxResult<Event> {
    sign_event(&mut event, key)?;
    Ok(event)
}

/// Verify an event's signature against everything except the signature.
///
/// An absent or empty signature is `Ok(false)`.
pub fn verify_event(event: &Event, key: &PublicKey) -> BlackBoxResult<bool> {
    match event.signature.as_deref() {
        Some(signature) if !signature.is_empty() => {
            verify_value(&SigningPayload::of(event), signature, key)
        }
        _ => Ok(false),
    }
}
