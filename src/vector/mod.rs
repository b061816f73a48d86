//! Typed vector values: binary codec for storage and similarity primitives
//!
//! `codec` is the only code in the crate that touches raw vector bytes.

mod codec;
mod similarity;

pub use codec::{decode_many, decode_one, encode_many, encode_one, CodecError, HEADER_LEN};
pub use similarity::{cosine_similarity, dot_product, magnitude, normalize, SimilarityError};
