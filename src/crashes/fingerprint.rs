//! Deterministic crash fingerprinting.
//!
//! Two reports land in the same group iff their normalised signatures match.
//! The signature is built from the error type plus the first five
//! application-owned stack frames; framework and bundler frames are noise
//! and are filtered out first. The SHA-256 of that signature, truncated to
//! 128 bits (32 hex chars), is the group key.

use sha2::{Digest, Sha256};

use crate::crashes::StackFrame;

/// Frames whose `file` contains any of these never identify a crash site.
const NOISE_FRAGMENTS: &[&str] = &[
    "node_modules",
    "tauri:",
    "@tauri-apps",
    "internal/",
    "webpack/",
    "vite/",
];

const MAX_SIGNATURE_FRAMES: usize = 5;

fn is_noise(frame: &StackFrame) -> bool {
    if frame.is_native.unwrap_or(false) {
        return true;
    }
    match frame.file.as_deref() {
        None => false,
        Some(file) => {
            file.starts_with("node:") || NOISE_FRAGMENTS.iter().any(|n| file.contains(n))
        }
    }
}

fn frame_part(frame: &StackFrame) -> String {
    if let Some(function) = frame.function.as_deref() {
        return function.to_string();
    }
    match (frame.file.as_deref(), frame.line) {
        (Some(file), Some(line)) => format!("{file}:{line}"),
        (Some(file), None) => file.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Pipe-joined signature string: `error_type|part1|part2|…`.
///
/// Exposed separately from [`fingerprint`] so tests can assert on the
/// pre-hash form.
pub fn signature(error_type: &str, frames: &[StackFrame]) -> String {
    let mut parts = vec![error_type.to_string()];
    parts.extend(
        frames
            .iter()
            .filter(|f| !is_noise(f))
            .take(MAX_SIGNATURE_FRAMES)
            .map(frame_part),
    );
    parts.join("|")
}

/// 32-hex-char truncated SHA-256 of the signature.
pub fn fingerprint(error_type: &str, frames: &[StackFrame]) -> String {
    let digest = Sha256::digest(signature(error_type, frames).as_bytes());
    hex::encode(digest)[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(file: Option<&str>, line: Option<i64>, function: Option<&str>) -> StackFrame {
        StackFrame {
            file: file.map(str::to_string),
            line,
            column: None,
            function: function.map(str::to_string),
            is_native: None,
        }
    }

    #[test]
    fn prefers_function_over_location() {
        let frames = vec![frame(Some("/app/src/main.ts"), Some(42), Some("init"))];
        assert_eq!(signature("TypeError", &frames), "TypeError|init");
    }

    #[test]
    fn falls_back_to_file_line_then_file_then_unknown() {
        let frames = vec![
            frame(Some("/app/src/a.ts"), Some(7), None),
            frame(Some("/app/src/b.ts"), None, None),
            frame(None, None, None),
        ];
        assert_eq!(
            signature("Error", &frames),
            "Error|/app/src/a.ts:7|/app/src/b.ts|unknown"
        );
    }

    #[test]
    fn node_modules_frames_are_invisible() {
        let noisy = vec![
            frame(Some("/app/node_modules/x/y.js"), Some(1), None),
            frame(Some("/app/src/main.ts"), Some(42), Some("init")),
        ];
        let clean = vec![frame(Some("/app/src/main.ts"), Some(42), Some("init"))];
        assert_eq!(signature("TypeError", &noisy), "TypeError|init");
        assert_eq!(fingerprint("TypeError", &noisy), fingerprint("TypeError", &clean));
    }

    #[test]
    fn matches_known_digest() {
        // SHA-256("TypeError|init") truncated to 32 hex chars.
        let frames = vec![
            frame(Some("/app/node_modules/x/y.js"), None, None),
            frame(Some("/app/src/main.ts"), Some(42), Some("init")),
        ];
        let expected = {
            let digest = Sha256::digest(b"TypeError|init");
            hex::encode(digest)[..32].to_string()
        };
        assert_eq!(fingerprint("TypeError", &frames), expected);
    }

    #[test]
    fn native_and_runtime_frames_are_filtered() {
        let frames = vec![
            StackFrame {
                is_native: Some(true),
                function: Some("native_fn".into()),
                ..frame(None, None, None)
            },
            frame(Some("node:internal/errors"), Some(3), Some("wrap")),
            frame(Some("webpack/runtime.js"), Some(9), Some("load")),
            frame(Some("/app/src/save.ts"), Some(10), Some("save")),
        ];
        assert_eq!(signature("Error", &frames), "Error|save");
    }

    #[test]
    fn only_first_five_clean_frames_count() {
        let frames: Vec<StackFrame> = (0..8)
            .map(|i| frame(Some("/app/src/f.ts"), Some(i), Some(&format!("fn{i}"))))
            .collect();
        assert_eq!(
            signature("Error", &frames),
            "Error|fn0|fn1|fn2|fn3|fn4"
        );
    }

    #[test]
    fn fingerprint_is_32_hex() {
        let fp = fingerprint("Error", &[]);
        assert_eq!(fp.len(), 32);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
