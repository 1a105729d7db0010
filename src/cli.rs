use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dub a single video file into one or more languages
    Dub {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Source language of the video
        #[arg(short, long, default_value = "en")]
        source_lang: String,

        /// Target languages for dubbing (comma-separated)
        #[arg(short, long)]
        target_langs: String,

        /// Output directory for artifacts and dubbed videos
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Dub all video files in a directory
    Batch {
        /// Input directory containing video files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Source language of the videos
        #[arg(short, long, default_value = "en")]
        source_lang: String,

        /// Target languages for dubbing (comma-separated)
        #[arg(short, long)]
        target_langs: String,

        /// Output directory for processed files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Extract the audio track from a video file
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Transcribe an audio file into word-level recognition results
    Transcribe {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,

        /// Output transcript file
        #[arg(short, long)]
        output: PathBuf,

        /// Source language of the audio
        #[arg(short, long, default_value = "en")]
        language: String,
    },

    /// Segment a transcript artifact into speaker-attributed sentences
    Segment {
        /// Input transcript file
        #[arg(short, long)]
        input: PathBuf,

        /// Output sentence file
        #[arg(short, long)]
        output: PathBuf,

        /// Source language of the transcript
        #[arg(short, long, default_value = "en")]
        source_lang: String,
    },

    /// Synthesize duration-fitted audio clips for one language
    Synthesize {
        /// Sentence artifact file
        #[arg(short, long)]
        sentences: PathBuf,

        /// Language to synthesize (must already be translated)
        #[arg(short, long)]
        language: String,

        /// Directory to write the clips into
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Stitch previously synthesized clips onto a video
    Stitch {
        /// Input video file
        #[arg(long)]
        video: PathBuf,

        /// Sentence artifact file
        #[arg(short, long)]
        sentences: PathBuf,

        /// Directory containing the language's synthesized clips
        #[arg(short, long)]
        clips_dir: PathBuf,

        /// Language of the clips
        #[arg(short, long)]
        language: String,

        /// Output video file
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Split a comma-separated language list into trimmed codes.
pub fn parse_language_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language_list() {
        assert_eq!(parse_language_list("fr"), vec!["fr"]);
        assert_eq!(parse_language_list("fr, de ,es"), vec!["fr", "de", "es"]);
        assert_eq!(parse_language_list(""), Vec::<String>::new());
        assert_eq!(parse_language_list("fr,,de"), vec!["fr", "de"]);
    }
}
