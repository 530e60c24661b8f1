//! Terminal-stage guard checks
//!
//! Guards are pure functions over text; they never call the model service.
//! A guard failure does not fail the job: the segment is flagged
//! `needs_review` with structured findings and the pipeline continues.

use crate::models::GuardFinding;

/// Bounds for the length-parity guard, in characters of output per character
/// of input. CJK-to-alphabetic expansion routinely reaches 2.5x, so the
/// window is deliberately wide.
const LENGTH_RATIO_MIN: f64 = 0.35;
const LENGTH_RATIO_MAX: f64 = 3.0;

/// Run all guard checks for one segment's terminal-stage output.
///
/// # Arguments
/// * `origin` - Origin text of the segment
/// * `first_stage_output` - Output of the first pipeline stage, used as the
///   reference for entity consistency (None for single-stage pipelines)
/// * `output` - Terminal stage output being checked
/// * `memory` - Shared project memory (glossary lines and notes)
pub fn evaluate(
    origin: &str,
    first_stage_output: Option<&str>,
    output: &str,
    memory: Option<&str>,
) -> Vec<GuardFinding> {
    let mut findings = Vec::new();

    if let Some(memory) = memory {
        check_term_map(origin, output, memory, &mut findings);
    }

    if let Some(reference) = first_stage_output {
        if reference != output {
            check_entity_consistency(reference, output, &mut findings);
        }
    }

    check_length_parity(first_stage_output.unwrap_or(origin), output, &mut findings);

    findings
}

/// Glossary enforcement: for every `source=target` line in project memory
/// whose source term appears in the origin text, the target term must appear
/// in the output.
fn check_term_map(origin: &str, output: &str, memory: &str, findings: &mut Vec<GuardFinding>) {
    for line in memory.lines() {
        let Some((source, target)) = line.split_once('=') else {
            continue;
        };
        let source = source.trim();
        let target = target.trim();
        if source.is_empty() || target.is_empty() {
            continue;
        }

        if origin.contains(source) && !output.contains(target) {
            findings.push(GuardFinding {
                guard: "term_map".to_string(),
                message: format!("Glossary term '{}' not rendered as '{}'", source, target),
            });
        }
    }
}

/// Named entities present in the reference translation must survive into the
/// terminal output. Heuristic: capitalized alphabetic tokens that are not
/// sentence-initial.
fn check_entity_consistency(reference: &str, output: &str, findings: &mut Vec<GuardFinding>) {
    for entity in candidate_entities(reference) {
        if !output.contains(&entity) {
            findings.push(GuardFinding {
                guard: "entity_consistency".to_string(),
                message: format!("Named entity '{}' missing from output", entity),
            });
        }
    }
}

/// Output length must stay within a plausible ratio of the input length.
/// Catches truncated or runaway generations.
fn check_length_parity(input: &str, output: &str, findings: &mut Vec<GuardFinding>) {
    let input_len = input.chars().count();
    let output_len = output.chars().count();
    if input_len == 0 {
        return;
    }

    let ratio = output_len as f64 / input_len as f64;
    if !(LENGTH_RATIO_MIN..=LENGTH_RATIO_MAX).contains(&ratio) {
        findings.push(GuardFinding {
            guard: "length_parity".to_string(),
            message: format!(
                "Output length {} is {:.2}x input length {} (allowed {:.2}-{:.2})",
                output_len, ratio, input_len, LENGTH_RATIO_MIN, LENGTH_RATIO_MAX
            ),
        });
    }
}

/// Capitalized, non-sentence-initial alphabetic tokens of length >= 2,
/// deduplicated in first-seen order
fn candidate_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut sentence_start = true;

    for raw in text.split_whitespace() {
        let token: String = raw
            .chars()
            .filter(|c| c.is_alphabetic() || *c == '-')
            .collect();

        let starts_upper = token.chars().next().is_some_and(|c| c.is_uppercase());
        if !sentence_start && starts_upper && token.chars().count() >= 2 {
            if !entities.contains(&token) {
                entities.push(token);
            }
        }

        sentence_start = raw.ends_with(['.', '!', '?', '。', '！', '？']);
    }

    entities
}
