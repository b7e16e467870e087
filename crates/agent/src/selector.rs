//! Relevant-window selection for long page content.
//!
//! The content is cut into fixed-size windows, each window is embedded and
//! scored against the task's question, and the contiguous span of
//! `window_step` windows with the best mean score is kept.

use deepsearch_core::error::ProviderError;
use deepsearch_core::task::Task;
use deepsearch_core::usage::UsageTracker;
use deepsearch_providers::LlmClient;
use futures::future::join_all;
use tracing::{debug, warn};

/// Cosine similarity between two vectors, accumulated in f64.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    dot / denom
}

/// Window size and the start offsets (in chars) of every scored window.
///
/// Starts run `0, size, 2*size, ...` while below `len - size * window_step`.
pub fn window_starts(len: usize, max_length: usize, window_step: usize) -> (usize, Vec<usize>) {
    if window_step == 0 {
        return (0, Vec::new());
    }
    let size = max_length / window_step;
    if size == 0 {
        return (0, Vec::new());
    }
    let limit = len.saturating_sub(size * window_step);
    (size, (0..limit).step_by(size).collect())
}

/// Index of the best run of `window_step` adjacent scores, by mean.
/// `None` when there are fewer scores than one run.
pub fn best_span(scores: &[f64], window_step: usize) -> Option<usize> {
    if window_step == 0 || scores.len() < window_step {
        return None;
    }
    let mut best = 0;
    let mut best_mean = f64::NEG_INFINITY;
    for (i, run) in scores.windows(window_step).enumerate() {
        let mean = run.iter().sum::<f64>() / window_step as f64;
        if mean > best_mean {
            best = i;
            best_mean = mean;
        }
    }
    Some(best)
}

/// The task's question embedding, computed on first use and cached on the task.
pub async fn query_embedding(
    llm: &LlmClient,
    task: &Task,
    usage: &UsageTracker,
) -> Result<Vec<f32>, ProviderError> {
    if let Some(cached) = task.query_embedding() {
        return Ok(cached);
    }
    let mut vectors = llm.embed(vec![task.query.clone()], usage).await?;
    let embedding = vectors
        .pop()
        .ok_or_else(|| ProviderError::EmptyResponse("embedding".into()))?;
    task.set_query_embedding(embedding.clone());
    Ok(embedding)
}

fn truncate_chars(chars: &[char], max_length: usize) -> String {
    chars.iter().take(max_length).collect()
}

/// Cut `content` down to at most `max_length` chars, keeping the part most
/// similar to `query_embedding`. Without an embedding, or when scoring
/// fails, the first `max_length` chars are kept.
pub async fn select_relevant(
    llm: &LlmClient,
    query_embedding: Option<&[f32]>,
    content: &str,
    max_length: usize,
    window_step: usize,
    usage: &UsageTracker,
) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= max_length {
        return content.to_string();
    }

    let Some(query) = query_embedding else {
        return truncate_chars(&chars, max_length);
    };

    let (size, starts) = window_starts(chars.len(), max_length, window_step);
    if starts.len() < window_step {
        debug!(windows = starts.len(), "too few windows to score, truncating");
        return truncate_chars(&chars, max_length);
    }

    let requests = starts.iter().map(|&start| {
        let window: String = chars[start..start + size].iter().collect();
        llm.embed(vec![window], usage)
    });
    let mut scores = Vec::with_capacity(starts.len());
    for result in join_all(requests).await {
        match result.map(|mut v| v.pop()) {
            Ok(Some(embedding)) => scores.push(cosine_similarity(query, &embedding)),
            Ok(None) => {
                warn!("empty window embedding, truncating content");
                return truncate_chars(&chars, max_length);
            }
            Err(e) => {
                warn!(error = %e, "window embedding failed, truncating content");
                return truncate_chars(&chars, max_length);
            }
        }
    }

    let Some(best) = best_span(&scores, window_step) else {
        return truncate_chars(&chars, max_length);
    };
    let start = (best * size).min(chars.len() - max_length);
    debug!(start, windows = scores.len(), "selected relevant span");
    chars[start..start + max_length].iter().collect()
}
