//! A library for verifying bearer JWTs issued by OIDC-compliant identity
//! providers: JWKS/discovery fetching with resilient HTTP retry, signature
//! verification over the RS*/PS*/ES* family, and claim validation for
//! access, ID, and refresh tokens.
//!
//! The entry point is [`facade::TokenValidator`]. Everything else is public
//! so a consumer can assemble a custom pipeline (an alternate claim mapper,
//! a bespoke cache policy) out of the same pieces.

pub mod cache;
pub mod claim_validator;
pub mod claims;
pub mod config;
pub mod counter;
pub mod error;
pub mod facade;
pub mod http_handler;
pub mod http_result;
pub mod issuer;
pub mod jwks;
pub mod parser;
pub mod pipeline;
pub mod retry;
pub mod signature;

pub use config::ValidatorSettings;
pub use counter::SecurityEventCounter;
pub use error::{SecurityEventCategory, TokenValidationError, ValidationEventType};
pub use facade::TokenValidator;
pub use jwks::LoaderStatus;
pub use pipeline::{AccessTokenContent, IdTokenContent, RefreshTokenContent};
