// src/bin/voice-catalog-tool.rs
//
// Lists the voice ids a host can pass as `narrator_voice` / in a
// character map. No network fetch: the catalog is a static allowlist
// (see `narrator::voice_catalog`), unlike `model-downloader.rs`'s
// Hugging Face downloads, since the TTS backend itself is injected and
// this crate has no model weights of its own to fetch.

use anyhow::Result;
use clap::Parser;

use narrator::voice_catalog;

#[derive(Parser, Debug)]
#[command(name = "voice-catalog-tool")]
#[command(about = "List known narrator/character voice ids")]
struct Args {
    /// List all known voices and exit. Currently the only supported mode.
    #[arg(long, default_value_t = true)]
    list: bool,

    /// Look up a single voice id and print its details.
    #[arg(long)]
    id: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(id) = args.id {
        match voice_catalog::find(&id) {
            Some(voice) => {
                println!("{}\t{}\t{}", voice.id, voice.display_name, voice.language);
                Ok(())
            }
            None => anyhow::bail!("unknown voice id: {id}"),
        }
    } else if args.list {
        for voice in voice_catalog::list() {
            println!("{}\t{}\t{}", voice.id, voice.display_name, voice.language);
        }
        Ok(())
    } else {
        anyhow::bail!("nothing to do: pass --list or --id <voice-id>")
    }
}
