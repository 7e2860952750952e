/// The supported output container formats for a finished audiobook.
///
/// Why this exists:
/// - We want a single, strongly-typed representation of output formats
///   across the CLI and library code.
/// - Using an enum avoids stringly-typed conditionals and keeps format
///   selection explicit and discoverable.
///
/// Integration notes:
/// - When the `cli` feature is enabled, we derive `clap::ValueEnum` so the enum can be used
///   directly as a CLI flag.
/// - Each variant maps to a concrete set of encoder arguments in the Finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Mp3,
    Wav,
    M4a,
    M4b,
}

impl OutputFormat {
    /// Whether this format supports chapter markers.
    ///
    /// Only the M4B container atom layout carries chapters; the others get
    /// a plain linear stream.
    pub fn supports_chapters(self) -> bool {
        matches!(self, OutputFormat::M4b)
    }

    /// File extension (without the leading dot) for the final artifact.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
            OutputFormat::M4a => "m4a",
            OutputFormat::M4b => "m4b",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_m4b_supports_chapters() {
        assert!(OutputFormat::M4b.supports_chapters());
        assert!(!OutputFormat::Mp3.supports_chapters());
        assert!(!OutputFormat::Wav.supports_chapters());
        assert!(!OutputFormat::M4a.supports_chapters());
    }

    #[test]
    fn extensions_match_format_names() {
        assert_eq!(OutputFormat::Mp3.extension(), "mp3");
        assert_eq!(OutputFormat::M4b.extension(), "m4b");
    }
}
