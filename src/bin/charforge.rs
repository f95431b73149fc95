//! CLI for Character Forge - reimagine a character image with Gemini.

use charforge::{
    GenerationClient, GenerationOutcome, ImprovementOutcome, QualityTier, ReferenceImage, Session,
};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "charforge")]
#[command(about = "Reimagine a character image in a new scene or style (Gemini)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform a character image according to a prompt
    Forge(ForgeArgs),

    /// Improve a prompt, or invent one when none is given
    Improve(ImproveArgs),
}

#[derive(Args)]
struct ForgeArgs {
    /// The scene or style to put the character in
    prompt: String,

    /// Reference character image
    #[arg(short, long)]
    input: PathBuf,

    /// Directory the result is saved into
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Use the high quality model (square 1K output)
    #[arg(long)]
    high: bool,

    /// Improve the prompt before forging
    #[arg(long)]
    improve: bool,
}

#[derive(Args)]
struct ImproveArgs {
    /// Prompt to improve (leave empty for a random one)
    #[arg(default_value = "")]
    prompt: String,

    /// Do not ask before inventing a random prompt
    #[arg(short, long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Forge(args) => forge(args, cli.json).await?,
        Commands::Improve(args) => improve(args, cli.json).await?,
    }

    Ok(())
}

async fn forge(args: ForgeArgs, json_output: bool) -> anyhow::Result<()> {
    let client = GenerationClient::from_env()?;
    let mut session = Session::new();

    session.set_reference(ReferenceImage::from_file(&args.input)?);
    session.set_prompt(args.prompt);
    if args.high {
        session.set_quality_tier(QualityTier::High);
    }

    if args.improve {
        session.improve_prompt(&client).await;
    }

    let result = match session.generate(&client).await {
        GenerationOutcome::Succeeded(result) => result,
        GenerationOutcome::Skipped => anyhow::bail!("a prompt and a reference image are required"),
        GenerationOutcome::Failed { error, .. } => {
            if error.is_credential_missing() {
                eprintln!("Check that GOOGLE_API_KEY is set to a key with access to Gemini image models.");
            }
            return Err(error.into());
        }
    };

    std::fs::create_dir_all(&args.output_dir)?;
    let path = result.save_to_dir(&args.output_dir)?;

    if json_output {
        let output = serde_json::json!({
            "success": true,
            "id": result.id,
            "output": path.display().to_string(),
            "prompt": result.prompt_text,
            "quality": session.quality_tier().to_string(),
            "created_at": result.created_at,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Forged image: {}", path.display());
        println!("Prompt: {}", result.prompt_text);
    }

    Ok(())
}

async fn improve(args: ImproveArgs, json_output: bool) -> anyhow::Result<()> {
    let client = GenerationClient::from_env()?;
    let mut session = Session::new();
    session.set_prompt(args.prompt);

    let mut outcome = session.improve_prompt(&client).await;
    if outcome == ImprovementOutcome::AwaitingConfirmation {
        if args.yes || confirm_random_prompt()? {
            outcome = session.confirm_and_improve(&client).await;
        } else {
            session.decline_empty_prompt();
            return Ok(());
        }
    }

    let ImprovementOutcome::Replaced(prompt) = outcome else {
        anyhow::bail!("prompt improvement did not run");
    };

    if json_output {
        println!("{}", serde_json::json!({ "prompt": prompt }));
    } else {
        println!("{}", prompt);
    }
    Ok(())
}

fn confirm_random_prompt() -> anyhow::Result<bool> {
    eprint!("You didn't provide a prompt. Do you want me to create something randomly for you? [y/N] ");
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
