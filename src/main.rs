use std::io::{self, IsTerminal, Read};

use anyhow::{Result, anyhow};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "wareki-converter-rust",
    version,
    about = "Find Japanese era (wareki) dates in text or images and convert them to Gregorian"
)]
struct Cli {
    /// Text containing a wareki date (reads stdin when omitted)
    text: Option<String>,

    /// Convert a Gregorian year to its era name instead
    #[arg(short = 'y', long = "year", allow_negative_numbers = true)]
    year: Option<i32>,

    /// Image of the region to recognize
    #[arg(short = 'i', long = "image")]
    image: Option<String>,

    /// Google Cloud Vision API key (overrides the stored key and GOOGLE_VISION_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Store a Google Cloud Vision API key and exit
    #[arg(long = "save-key")]
    save_key: Option<String>,

    /// Delete the stored API key and exit
    #[arg(long = "delete-key")]
    delete_key: bool,

    /// Show the stored API key (masked) and exit
    #[arg(long = "show-key")]
    show_key: bool,

    /// Show this month's cloud recognition usage and exit
    #[arg(long = "show-usage")]
    show_usage: bool,

    /// Never escalate to cloud recognition
    #[arg(long = "no-cloud")]
    no_cloud: bool,

    /// Show conversion histories and exit
    #[arg(long = "show-histories")]
    show_histories: bool,

    /// Clear conversion histories and exit
    #[arg(long = "clear-histories")]
    clear_histories: bool,

    /// Show languages installed for tesseract and exit
    #[arg(long = "show-ocr-languages")]
    show_ocr_languages: bool,

    /// Print the conversion result as JSON
    #[arg(long = "json")]
    json: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

impl Cli {
    fn needs_input(&self) -> bool {
        self.text.is_none()
            && self.year.is_none()
            && self.image.is_none()
            && self.save_key.is_none()
            && !(self.delete_key
                || self.show_key
                || self.show_usage
                || self.show_histories
                || self.clear_histories
                || self.show_ocr_languages)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    wareki_converter_rust::logging::init(cli.verbose)?;

    let input = if cli.needs_input() {
        if io::stdin().is_terminal() {
            return Err(anyhow!("no input: pass TEXT, --image or pipe text on stdin"));
        }
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|err| anyhow!("stdin must be UTF-8 text: {}", err))?;
        Some(buffer)
    } else {
        cli.text
    };

    let output = wareki_converter_rust::run(
        wareki_converter_rust::Config {
            year: cli.year,
            image: cli.image,
            key: cli.key,
            save_key: cli.save_key,
            delete_key: cli.delete_key,
            show_key: cli.show_key,
            show_usage: cli.show_usage,
            no_cloud: cli.no_cloud,
            show_histories: cli.show_histories,
            clear_histories: cli.clear_histories,
            show_ocr_languages: cli.show_ocr_languages,
            json: cli.json,
            settings_path: cli.read_settings,
        },
        input,
    )
    .await?;

    println!("{}", output);
    Ok(())
}
