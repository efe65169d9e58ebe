// Input-size estimation
//
// Advisory only: the estimate feeds the context-limit warning, never
// truncation or billing. Uses tiktoken-rs (cl100k_base) with a correction
// factor, since Claude models tokenize roughly 15% heavier than cl100k_base,
// and rounds up. Over-counting slightly is the point.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Correction coefficient applied on top of the cl100k_base count.
const CLAUDE_CORRECTION_FACTOR: f64 = 1.15;

static ENCODING: OnceLock<CoreBPE> = OnceLock::new();

fn get_encoding() -> &'static CoreBPE {
    ENCODING.get_or_init(|| {
        tiktoken_rs::cl100k_base().expect("Failed to initialize cl100k_base encoding")
    })
}

/// Conservative token estimate for a piece of input text.
///
/// Deterministic: the same text always yields the same estimate.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let base = get_encoding().encode_with_special_tokens(text).len() as f64;
    (base * CLAUDE_CORRECTION_FACTOR).ceil() as u32
}
