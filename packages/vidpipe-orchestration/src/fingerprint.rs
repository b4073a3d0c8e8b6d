//! Deterministic cache fingerprints.
//!
//! Each pipeline stage memoizes under a fixed-length hex key derived from
//! its input. Keys are an md5 digest of a prefix-labelled canonical string,
//! so the same input always lands on the same cache slot and distinct
//! inputs collide only with hash probability.

fn digest(canonical: &str) -> String {
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

/// Key for a downloaded video, derived from its source URL.
pub fn download_key(url: &str) -> String {
    digest(&format!("download:{}", url))
}

/// Key for an extracted audio track, derived from the video path.
pub fn extract_key(video_path: &str) -> String {
    digest(&format!("extract:{}", video_path))
}

/// Key for a transcript, derived from the audio path.
pub fn transcript_key(audio_path: &str) -> String {
    digest(&format!("transcript:{}", audio_path))
}

/// Key for a summary, derived from the transcript and the model that
/// produced it. Different models yield different cache slots.
pub fn summary_key(transcript: &str, model: &str) -> String {
    digest(&format!("summary:{}:{}", transcript, model))
}

/// Generic key over positional and named arguments. Named arguments are
/// sorted by name so call-site ordering does not change the key.
pub fn generic_key(args: &[&str], named: &[(&str, &str)]) -> String {
    let mut named: Vec<_> = named.to_vec();
    named.sort_by_key(|(name, _)| *name);

    let mut canonical = String::from("(");
    for arg in args {
        canonical.push_str(arg);
        canonical.push(',');
    }
    canonical.push_str(")(");
    for (name, value) in &named {
        canonical.push_str(name);
        canonical.push('=');
        canonical.push_str(value);
        canonical.push(',');
    }
    canonical.push(')');

    digest(&canonical)
}
