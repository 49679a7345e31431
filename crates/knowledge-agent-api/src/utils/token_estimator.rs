/// Rough token estimate at ~4 characters per token. Only used for logging
/// and metrics, never for billing or truncation decisions.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
