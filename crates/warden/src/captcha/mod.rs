//! Challenge generation and answer handling.
//!
//! Arithmetic challenges with inline answer buttons; the buttons carry
//! the subject id so a click can be checked against the clicking user.

mod answer;
mod generator;

pub use answer::{decode_callback, encode_callback, parse_answer};
pub use generator::ChallengeGenerator;
