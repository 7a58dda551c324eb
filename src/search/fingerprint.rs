use sha2::{Digest, Sha256};

/// Fingerprint width. Matches the dimensionality of small sentence
/// embedding models so stores sized for those work unchanged.
pub const FINGERPRINT_DIM: usize = 384;

const WINDOW: usize = 3;

/// Deterministic text fingerprint: lowercase alphanumeric tokens, hashed
/// per token and per overlapping window of three tokens into signed
/// bucket weights, L2-normalized. Not a learned embedding; texts that
/// share vocabulary and phrasing land close, nothing more.
pub fn fingerprint(text: &str) -> Vec<f32> {
    let tokens = tokenize(text);
    let mut buckets = vec![0.0f32; FINGERPRINT_DIM];

    for token in &tokens {
        accumulate(&mut buckets, token);
    }
    for window in tokens.windows(WINDOW) {
        accumulate(&mut buckets, &window.join(" "));
    }

    normalize(&mut buckets);
    buckets
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn accumulate(buckets: &mut [f32], term: &str) {
    let digest = Sha256::digest(term.as_bytes());
    let index = u64::from_be_bytes(digest[0..8].try_into().unwrap_or_default());
    let bucket = (index % buckets.len() as u64) as usize;
    // Sign from the next digest byte keeps colliding terms from only
    // ever reinforcing each other.
    let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
    buckets[bucket] += sign;
}

fn normalize(buckets: &mut [f32]) {
    let norm: f32 = buckets.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in buckets.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
