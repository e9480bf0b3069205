//! Wire types: the relay's own endpoint and the Gemini upstream

mod gemini;
mod generate;

pub use gemini::*;
pub use generate::*;
