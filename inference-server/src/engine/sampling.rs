//! Sampling strategy selection and stop-sequence handling.

use candle_transformers::generation::Sampling;

use super::GenerationParams;

/// Map request parameters onto a candle sampling strategy.
///
/// Temperature `0` is greedy; a `top_p` below `1` enables nucleus sampling;
/// otherwise the whole temperature-scaled distribution is sampled.
pub fn strategy(params: &GenerationParams) -> Sampling {
    if params.is_greedy() {
        Sampling::ArgMax
    } else if params.top_p < 1.0 {
        Sampling::TopP {
            p: params.top_p,
            temperature: params.temperature,
        }
    } else {
        Sampling::All {
            temperature: params.temperature,
        }
    }
}

/// Byte offset of the earliest stop sequence in `text`, if any occurs.
pub fn find_stop(text: &str, stop: &[String]) -> Option<usize> {
    stop.iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

/// Seed for one request: the caller's seed when given, otherwise the base seed
/// offset by a per-request counter so successive requests differ.
pub fn resolve_seed(requested: Option<u64>, base: u64, request_index: u64) -> u64 {
    requested.unwrap_or_else(|| base.wrapping_add(request_index))
}
