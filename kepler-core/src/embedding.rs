//! Deterministic feature-hash embeddings.
//!
//! Stand-in for model-produced vectors: tokens and character trigrams are
//! hashed into a fixed-width bucket space and the result is L2-normalised.
//! Deterministic across runs, so graph build and primitive search stay
//! reproducible.

/// Embedding width shared by the enricher and the primitive library.
pub const DIM: usize = 64;

/// Embed a text span into a normalised `DIM`-wide vector.
pub fn embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    let lower = text.to_lowercase();

    for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        let bucket = fnv1a(token.as_bytes()) as usize % DIM;
        v[bucket] += 1.0;

        let chars: Vec<char> = token.chars().collect();
        for tri in chars.windows(3) {
            let s: String = tri.iter().collect();
            let bucket = fnv1a(s.as_bytes()) as usize % DIM;
            v[bucket] += 0.5;
        }
    }

    normalize(&mut v);
    v
}

/// Cosine similarity between two vectors. Zero for mismatched or empty inputs.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_deterministic() {
        assert_eq!(embed("parallel plate capacitor"), embed("parallel plate capacitor"));
    }

    #[test]
    fn embeddings_are_normalised() {
        let v = embed("a converging lens with focal length 10 cm");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn similar_texts_score_higher_than_unrelated() {
        let cap1 = embed("capacitor with two plates");
        let cap2 = embed("parallel plate capacitor");
        let lens = embed("thin converging optical lens");
        assert!(cosine(&cap1, &cap2) > cosine(&cap1, &lens));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let v = embed("");
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(cosine(&v, &embed("anything")), 0.0);
    }

    #[test]
    fn cosine_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0]), 0.0);
    }
}
