//! Monotonic fuzzy alignment between a transcript's word sequence and the
//! word timings reported for the synthesized audio.

use lazy_static::lazy_static;
use regex::Regex;

use crate::transcript::WordTiming;

/// One transcript word mapped onto a synthesized-audio word index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordAlignment {
    pub transcript_idx: usize,
    pub synth_idx: usize,
    pub interpolated: bool,
}

/// Substring matches below this normalized length are rejected; short words
/// ("a", "to", "of") substring-match almost anything.
const MIN_SUBSTRING_LEN: usize = 3;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w']+").expect("valid regex");
}

pub fn normalize_word(raw: &str) -> String {
    NON_WORD.replace_all(&raw.to_lowercase(), "").into_owned()
}

fn words_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    a.len() >= MIN_SUBSTRING_LEN && b.len() >= MIN_SUBSTRING_LEN && (a.contains(b) || b.contains(a))
}

/// Map every transcript word onto a synthesized word index.
///
/// Guarantees full coverage (exactly one entry per transcript word) and a
/// globally non-decreasing synthesized index sequence. Matching is greedy
/// leftmost and strictly after the previously consumed synthesized index,
/// which makes monotonicity hold by construction; unmatched stretches are
/// filled by linear interpolation between anchors, clamped to a running
/// minimum so interpolation can never step backwards.
pub fn align_words_with_coverage(
    transcript_words: &[String],
    timings: &[WordTiming],
) -> Vec<WordAlignment> {
    if transcript_words.is_empty() || timings.is_empty() {
        return Vec::new();
    }

    let normalized_transcript: Vec<String> =
        transcript_words.iter().map(|w| normalize_word(w)).collect();
    let normalized_synth: Vec<String> = timings.iter().map(|t| normalize_word(&t.word)).collect();

    let max_synth_idx = timings.len() - 1;
    let last_transcript_idx = transcript_words.len() - 1;

    // Greedy leftmost scan, strictly after the last consumed index.
    let mut matches: Vec<(usize, usize)> = Vec::new();
    let mut next_search = 0usize;
    for (t_idx, t_word) in normalized_transcript.iter().enumerate() {
        for s_idx in next_search..normalized_synth.len() {
            if words_match(t_word, &normalized_synth[s_idx]) {
                matches.push((t_idx, s_idx));
                next_search = s_idx + 1;
                break;
            }
        }
    }

    if matches.is_empty() {
        // No anchors at all: uniform stride distribution.
        let step = (timings.len() / transcript_words.len()).max(1);
        return (0..transcript_words.len())
            .map(|t_idx| WordAlignment {
                transcript_idx: t_idx,
                synth_idx: (t_idx * step).min(max_synth_idx),
                interpolated: true,
            })
            .collect();
    }

    // Anchor the boundaries so interpolation covers the full range.
    let mut anchors: Vec<(usize, usize, bool)> =
        matches.iter().map(|&(t, s)| (t, s, false)).collect();
    if anchors[0].0 != 0 {
        anchors.insert(0, (0, 0, true));
    }
    if anchors[anchors.len() - 1].0 != last_transcript_idx {
        anchors.push((last_transcript_idx, max_synth_idx, true));
    }

    let mut entries: Vec<WordAlignment> = Vec::with_capacity(transcript_words.len());
    let mut running_min = 0usize;

    fn push_entry(
        entries: &mut Vec<WordAlignment>,
        running_min: &mut usize,
        max_synth_idx: usize,
        t_idx: usize,
        s_idx: usize,
        interpolated: bool,
    ) {
        let clamped = s_idx.clamp(*running_min, max_synth_idx);
        entries.push(WordAlignment {
            transcript_idx: t_idx,
            synth_idx: clamped,
            interpolated,
        });
        *running_min = clamped;
    }

    for pair in anchors.windows(2) {
        let (t0, s0, interp0) = pair[0];
        let (t1, s1, interp1) = pair[1];
        if entries.is_empty() {
            push_entry(&mut entries, &mut running_min, max_synth_idx, t0, s0, interp0);
        }
        let span = t1 - t0;
        for t_idx in (t0 + 1)..t1 {
            let fraction = (t_idx - t0) as f64 / span as f64;
            let interpolated_idx = s0 as f64 + fraction * (s1 as f64 - s0 as f64);
            push_entry(
                &mut entries,
                &mut running_min,
                max_synth_idx,
                t_idx,
                interpolated_idx.round() as usize,
                true,
            );
        }
        push_entry(&mut entries, &mut running_min, max_synth_idx, t1, s1, interp1);
    }

    if anchors.len() == 1 {
        // Single anchor covering the only transcript word.
        let (t_idx, s_idx, interpolated) = anchors[0];
        push_entry(
            &mut entries,
            &mut running_min,
            max_synth_idx,
            t_idx,
            s_idx,
            interpolated,
        );
    }

    entries
}
