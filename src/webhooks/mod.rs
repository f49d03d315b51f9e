/// Payment processor webhook authentication
pub mod signature;

pub use signature::{
    sign_payload, signature_header, SignatureError, SignatureHeader, SIGNATURE_HEADER,
};
