use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "image-translator",
    version,
    about = "Translate the text inside an image and redraw it in place"
)]
struct Cli {
    /// Image to translate
    image: Option<PathBuf>,

    /// Where to write the translated image (default: <stem>.translated.png)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Source language name (e.g. English, Japanese)
    #[arg(short = 's', long = "source")]
    source: Option<String>,

    /// Target language name (e.g. Chinese, "Traditional Chinese")
    #[arg(short = 't', long = "target")]
    target: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Print results as JSON
    #[arg(long = "json")]
    json: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Show supported languages and their codes and exit
    #[arg(long = "show-languages")]
    show_languages: bool,

    /// Show cached translations of a text, newest first, and exit
    #[arg(long = "cache-history", value_name = "TEXT")]
    cache_history: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    image_translator::logging::init(cli.verbose)?;

    let needs_image = !(cli.show_languages || cli.cache_history.is_some());
    if needs_image && cli.image.is_none() {
        return Err(anyhow!("an image path is required (see --help)"));
    }

    let output = image_translator::run(image_translator::Config {
        image: cli.image,
        output: cli.output,
        source_lang: cli.source,
        target_lang: cli.target,
        settings_path: cli.read_settings,
        json: cli.json,
        show_languages: cli.show_languages,
        cache_history: cli.cache_history,
    })
    .await?;

    println!("{}", output);
    Ok(())
}
