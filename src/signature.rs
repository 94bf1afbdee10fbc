//! Signature verification (C11).
//!
//! Generalizes the reference crate's RS256-only `validate_jwt_signature` to
//! the full RS*/PS*/ES* safelist: PKCS#1 v1.5 padding for `RS*`, PSS padding
//! for `PS*`, and raw-to-DER `EcdsaSig` conversion for `ES*` (JWS signatures
//! are the raw `r || s` concatenation per RFC 7518 §3.4, while OpenSSL's
//! `Verifier` expects DER).

use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Public};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Verifier};

use crate::error::{TokenValidationError, ValidationEventType};
use crate::jwks::parser::{KeyAlgorithm, KeyInfo};

fn digest_for(alg: KeyAlgorithm) -> MessageDigest {
    use KeyAlgorithm::{Es256, Es384, Es512, Ps256, Ps384, Ps512, Rs256, Rs384, Rs512};
    match alg {
        Rs256 | Ps256 | Es256 => MessageDigest::sha256(),
        Rs384 | Ps384 | Es384 => MessageDigest::sha384(),
        Rs512 | Ps512 | Es512 => MessageDigest::sha512(),
    }
}

/// Half the length, in bytes, of a JWS ES* signature's `r`/`s` components.
fn ec_component_len(alg: KeyAlgorithm) -> usize {
    match alg {
        KeyAlgorithm::Es256 => 32,
        KeyAlgorithm::Es384 => 48,
        KeyAlgorithm::Es512 => 66,
        _ => unreachable!("ec_component_len called with a non-EC algorithm"),
    }
}

fn raw_ec_signature_to_der(alg: KeyAlgorithm, raw: &[u8]) -> Result<Vec<u8>, TokenValidationError> {
    let component_len = ec_component_len(alg);
    if raw.len() != component_len * 2 {
        return Err(TokenValidationError::new(
            ValidationEventType::SignatureInvalid,
            format!(
                "EC signature is {} bytes, expected {}",
                raw.len(),
                component_len * 2
            ),
        ));
    }

    let r = openssl::bn::BigNum::from_slice(&raw[..component_len]).map_err(openssl_err)?;
    let s = openssl::bn::BigNum::from_slice(&raw[component_len..]).map_err(openssl_err)?;
    let sig = EcdsaSig::from_private_components(r, s).map_err(openssl_err)?;
    sig.to_der().map_err(openssl_err)
}

fn openssl_err(err: openssl::error::ErrorStack) -> TokenValidationError {
    TokenValidationError::new(ValidationEventType::SignatureKeyDecodeError, err.to_string())
}

/// Verify a JWS signature.
///
/// `key` must already match the token's `kid` (see [`crate::pipeline`]) and
/// `header_alg` must match `key.algorithm`'s family; a same-`kid`,
/// wrong-family mismatch is reported as [`ValidationEventType::SignatureAlgorithmMismatch`],
/// distinct from an outright missing key.
pub fn verify(
    signing_input: &[u8],
    signature_bytes: &[u8],
    header_alg: KeyAlgorithm,
    key: &KeyInfo,
) -> Result<(), TokenValidationError> {
    if header_alg != key.algorithm {
        return Err(TokenValidationError::new(
            ValidationEventType::SignatureAlgorithmMismatch,
            format!(
                "token header alg {header_alg:?} does not match key algorithm {:?}",
                key.algorithm
            ),
        ));
    }

    let verified = if header_alg.is_rsa() {
        verify_rsa(signing_input, signature_bytes, header_alg, &key.public_key)?
    } else {
        verify_ec(signing_input, signature_bytes, header_alg, &key.public_key)?
    };

    if verified {
        Ok(())
    } else {
        Err(TokenValidationError::new(
            ValidationEventType::SignatureInvalid,
            "signature verification failed",
        ))
    }
}

fn verify_rsa(
    signing_input: &[u8],
    signature_bytes: &[u8],
    alg: KeyAlgorithm,
    key: &PKey<Public>,
) -> Result<bool, TokenValidationError> {
    let digest = digest_for(alg);
    let mut verifier = Verifier::new(digest, key).map_err(openssl_err)?;

    let is_pss = matches!(alg, KeyAlgorithm::Ps256 | KeyAlgorithm::Ps384 | KeyAlgorithm::Ps512);
    if is_pss {
        verifier.set_rsa_padding(Padding::PKCS1_PSS).map_err(openssl_err)?;
        verifier
            .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
            .map_err(openssl_err)?;
    } else {
        verifier.set_rsa_padding(Padding::PKCS1).map_err(openssl_err)?;
    }

    verifier.update(signing_input).map_err(openssl_err)?;
    verifier.verify(signature_bytes).map_err(openssl_err)
}

fn verify_ec(
    signing_input: &[u8],
    signature_bytes: &[u8],
    alg: KeyAlgorithm,
    key: &PKey<Public>,
) -> Result<bool, TokenValidationError> {
    let der_signature = raw_ec_signature_to_der(alg, signature_bytes)?;
    let digest = digest_for(alg);
    let mut verifier = Verifier::new(digest, key).map_err(openssl_err)?;
    verifier.update(signing_input).map_err(openssl_err)?;
    verifier.verify(&der_signature).map_err(openssl_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;
    use openssl::rsa::Rsa;

    fn rsa_key_info(alg: KeyAlgorithm) -> (openssl::rsa::Rsa<openssl::pkey::Private>, KeyInfo) {
        let private = Rsa::generate(2048).unwrap();
        let public_pem = private.public_key_to_pem().unwrap();
        let public_key = PKey::public_key_from_pem(&public_pem).unwrap();
        (
            private,
            KeyInfo {
                kid: "k1".to_string(),
                algorithm: alg,
                public_key,
                not_before: None,
                not_after: None,
            },
        )
    }

    #[test]
    fn verifies_valid_rs256_signature() {
        let (private, key_info) = rsa_key_info(KeyAlgorithm::Rs256);
        let private_key = PKey::from_rsa(private).unwrap();
        let signing_input = b"header.payload";

        let mut signer = openssl::sign::Signer::new(MessageDigest::sha256(), &private_key).unwrap();
        signer.set_rsa_padding(Padding::PKCS1).unwrap();
        signer.update(signing_input).unwrap();
        let signature = signer.sign_to_vec().unwrap();

        assert!(verify(signing_input, &signature, KeyAlgorithm::Rs256, &key_info).is_ok());
    }

    #[test]
    fn rejects_tampered_rs256_signature() {
        let (private, key_info) = rsa_key_info(KeyAlgorithm::Rs256);
        let private_key = PKey::from_rsa(private).unwrap();
        let signing_input = b"header.payload";

        let mut signer = openssl::sign::Signer::new(MessageDigest::sha256(), &private_key).unwrap();
        signer.set_rsa_padding(Padding::PKCS1).unwrap();
        signer.update(signing_input).unwrap();
        let mut signature = signer.sign_to_vec().unwrap();
        signature[0] ^= 0xFF;

        let err = verify(signing_input, &signature, KeyAlgorithm::Rs256, &key_info).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::SignatureInvalid);
    }

    #[test]
    fn verifies_valid_ps256_signature() {
        let (private, key_info) = rsa_key_info(KeyAlgorithm::Ps256);
        let private_key = PKey::from_rsa(private).unwrap();
        let signing_input = b"header.payload";

        let mut signer = openssl::sign::Signer::new(MessageDigest::sha256(), &private_key).unwrap();
        signer.set_rsa_padding(Padding::PKCS1_PSS).unwrap();
        signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH).unwrap();
        signer.update(signing_input).unwrap();
        let signature = signer.sign_to_vec().unwrap();

        assert!(verify(signing_input, &signature, KeyAlgorithm::Ps256, &key_info).is_ok());
    }

    #[test]
    fn verifies_valid_es256_signature() {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let ec_key = EcKey::generate(&group).unwrap();
        let public_pem = ec_key.public_key_to_pem().unwrap();
        let public_key = PKey::public_key_from_pem(&public_pem).unwrap();
        let key_info = KeyInfo {
            kid: "k1".to_string(),
            algorithm: KeyAlgorithm::Es256,
            public_key,
            not_before: None,
            not_after: None,
        };

        let signing_input = b"header.payload";
        let hash = openssl::sha::sha256(signing_input);
        let der_sig = EcdsaSig::sign(&hash, &ec_key).unwrap();
        let r = der_sig.r().to_vec_padded(32).unwrap();
        let s = der_sig.s().to_vec_padded(32).unwrap();
        let mut raw = r;
        raw.extend_from_slice(&s);

        assert!(verify(signing_input, &raw, KeyAlgorithm::Es256, &key_info).is_ok());
    }

    #[test]
    fn rejects_algorithm_family_mismatch() {
        let (_private, key_info) = rsa_key_info(KeyAlgorithm::Rs256);
        let err = verify(b"data", b"sig", KeyAlgorithm::Es256, &key_info).unwrap_err();
        assert_eq!(err.event_type, ValidationEventType::SignatureAlgorithmMismatch);
    }
}
