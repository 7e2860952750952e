//! Voice catalog lookup (spec.md §1 out-of-core collaborator): a narrow,
//! file-backed, static allowlist — no network fetch of voice assets.
//! Grounded on `model-downloader.rs`'s `ModelSpec` static arrays, minus
//! the download machinery.

/// One entry in the static voice catalog.
#[derive(Debug, Clone, Copy)]
pub struct VoiceSpec {
    pub id: &'static str,
    pub display_name: &'static str,
    pub language: &'static str,
}

/// The known narrator/character voice ids. A host application swaps this
/// for its own catalog; this list exists only so the ambient CLI tool has
/// something to list.
pub const VOICES: &[VoiceSpec] = &[
    VoiceSpec {
        id: "am_michael",
        display_name: "Michael",
        language: "en-US",
    },
    VoiceSpec {
        id: "am_adam",
        display_name: "Adam",
        language: "en-US",
    },
    VoiceSpec {
        id: "af_bella",
        display_name: "Bella",
        language: "en-US",
    },
    VoiceSpec {
        id: "bf_emma",
        display_name: "Emma",
        language: "en-GB",
    },
];

pub fn find(id: &str) -> Option<&'static VoiceSpec> {
    VOICES.iter().find(|v| v.id == id)
}

pub fn list() -> &'static [VoiceSpec] {
    VOICES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_known_voice() {
        assert!(find("am_michael").is_some());
    }

    #[test]
    fn find_unknown_voice_returns_none() {
        assert!(find("nonexistent").is_none());
    }
}
