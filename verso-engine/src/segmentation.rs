//! Segmentation and batching
//!
//! Splits origin text into ordered segments deterministically for a given
//! mode and computes the content hash used as the pipeline identity key.
//! Recomputing segmentation for identical input reproduces the same hash and
//! the same boundaries, so the hash doubles as a cache/idempotency key.

use crate::error::{EngineError, EngineResult};
use crate::models::{BatchItem, OriginSegment, SegmentationMode, SegmentationResult};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Split origin text into ordered segments.
///
/// Normalizes line endings first; fails with a segmentation error if the
/// text is empty after normalization. Callers surface that without starting
/// any job.
pub fn segment(
    text: &str,
    project_id: Uuid,
    mode: SegmentationMode,
) -> EngineResult<SegmentationResult> {
    let normalized = normalize(text);

    if normalized.trim().is_empty() {
        return Err(EngineError::Segmentation(
            "Origin text is empty after normalization".to_string(),
        ));
    }

    let source_hash = compute_source_hash(&normalized, project_id, mode);

    let segments = match mode {
        SegmentationMode::Paragraph => split_paragraphs(&normalized, &source_hash),
        SegmentationMode::Sentence => split_sentences(&normalized, &source_hash),
    };

    if segments.is_empty() {
        return Err(EngineError::Segmentation(
            "Origin text produced no segments".to_string(),
        ));
    }

    tracing::debug!(
        project_id = %project_id,
        mode = mode.as_str(),
        segments = segments.len(),
        source_hash = %source_hash,
        "Segmentation complete"
    );

    Ok(SegmentationResult {
        source_hash,
        segments,
        mode,
    })
}

/// Group segments into fixed-size windows preserving order.
///
/// Each element carries the raw text of the immediately adjacent segments
/// (globally adjacent, not batch-local), so a pass can resolve cross-segment
/// pronoun and context issues without seeing the whole document.
pub fn batch(segments: &[OriginSegment], batch_size: usize) -> Vec<Vec<BatchItem>> {
    let size = batch_size.max(1);

    let items: Vec<BatchItem> = segments
        .iter()
        .enumerate()
        .map(|(i, seg)| BatchItem {
            segment: seg.clone(),
            prev_ctx: (i > 0).then(|| segments[i - 1].text.clone()),
            next_ctx: segments.get(i + 1).map(|s| s.text.clone()),
        })
        .collect();

    items.chunks(size).map(|chunk| chunk.to_vec()).collect()
}

/// Normalize CRLF/CR line endings to LF
fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn compute_source_hash(normalized: &str, project_id: Uuid, mode: SegmentationMode) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(project_id.as_bytes());
    hasher.update(mode.as_str().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Blank-line separated paragraphs, whitespace-trimmed
fn split_paragraphs(normalized: &str, source_hash: &str) -> Vec<OriginSegment> {
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(order, text)| OriginSegment {
            id: segment_id(source_hash, order),
            text: text.to_string(),
            paragraph_index: order,
            order,
        })
        .collect()
}

/// Terminal-punctuation split within paragraphs. Paragraph boundaries are
/// preserved via `paragraph_index`.
fn split_sentences(normalized: &str, source_hash: &str) -> Vec<OriginSegment> {
    let mut segments = Vec::new();
    let mut order = 0;

    for (paragraph_index, paragraph) in normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
    {
        let mut current = String::new();
        for ch in paragraph.chars() {
            current.push(ch);
            if matches!(ch, '.' | '!' | '?' | '。' | '！' | '？') {
                let text = current.trim();
                if !text.is_empty() {
                    segments.push(OriginSegment {
                        id: segment_id(source_hash, order),
                        text: text.to_string(),
                        paragraph_index,
                        order,
                    });
                    order += 1;
                }
                current.clear();
            }
        }
        let trailing = current.trim();
        if !trailing.is_empty() {
            segments.push(OriginSegment {
                id: segment_id(source_hash, order),
                text: trailing.to_string(),
                paragraph_index,
                order,
            });
            order += 1;
        }
    }

    segments
}

/// Stable segment id: hash prefix + document position
fn segment_id(source_hash: &str, order: usize) -> String {
    format!("{}-{:04}", &source_hash[..12], order)
}
