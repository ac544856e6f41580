use anyhow::{Context, Result};
use bookgen::config::Config;
use bookgen::models::{Audience, BookParameters};
use bookgen::services::assembler::OutputFormat;
use bookgen::services::llm::LlmClient;
use bookgen::services::pipeline::{GenerateOptions, generate_book};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "bookgen", version, about = "Generate illustrated educational books")]
struct Cli {
    /// Where to write the book (default: the title, slugified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (default: from the output extension, else epub)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Do not keep book_content.json and images_info.json
    #[arg(long)]
    no_temp: bool,

    /// Read book parameters from a JSON file instead of prompting
    #[arg(long)]
    params: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Configuration error")?;

    let params = match &cli.params {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            BookParameters::from_json(&json)
                .with_context(|| format!("Invalid parameters in {}", path.display()))?
        }
        None => {
            let stdin = io::stdin();
            Prompter::new(stdin.lock(), io::stdout())
                .book_parameters()
                .context("Cannot read book parameters")?
        }
    };

    let client = LlmClient::new(&config).context("Cannot create API client")?;
    let options = GenerateOptions {
        output: cli.output,
        format: cli.format,
        keep_intermediate: !cli.no_temp,
    };

    let path = generate_book(&client, &client, &client, &params, &options, &config)
        .await
        .context("Book generation failed")?;
    println!("Book generated: {}", path.display());
    Ok(())
}

struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn line(&mut self, label: &str) -> io::Result<String> {
        write!(self.output, "{label}: ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim().to_string())
    }

    fn required(&mut self, label: &str) -> io::Result<String> {
        loop {
            let answer = self.line(label)?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            writeln!(self.output, "This field is required.")?;
        }
    }

    fn optional(&mut self, label: &str) -> io::Result<Option<String>> {
        let answer = self.line(label)?;
        Ok((!answer.is_empty()).then_some(answer))
    }

    fn audience(&mut self) -> io::Result<Audience> {
        loop {
            match self.required("Audience (children, young adults, adults)")?.parse::<Audience>() {
                Ok(audience) => return Ok(audience),
                Err(e) => writeln!(self.output, "{e}")?,
            }
        }
    }

    fn book_parameters(&mut self) -> io::Result<BookParameters> {
        let title = self.required("Title")?;
        let topic = self.optional("Topic")?;
        let audience = self.audience()?;
        let age_range = self.required("Age range (e.g. 7-9)")?;

        let mut params = BookParameters::new(title, audience, age_range);
        params.topic = topic;
        params.academic_level = self.optional("Academic level")?;
        params.approach = self.optional("Approach")?;
        params.language_register = self.optional("Language register")?;
        params.desired_pages = self.optional("Desired pages")?;
        params.depth = self.optional("Depth")?;
        Ok(params)
    }
}
