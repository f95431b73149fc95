//! Drives a session the way a front end would: improve, forge, then reuse
//! the result as the next reference.
//!
//! Run with: `cargo run --example forge_session -- <character.png>`
//!
//! Requires `GOOGLE_API_KEY` environment variable.

use charforge::{GenerationClient, GenerationOutcome, ReferenceImage, Session};

#[tokio::main]
async fn main() -> charforge::Result<()> {
    let input_path = std::env::args()
        .nth(1)
        .expect("Usage: forge_session <character.png>");

    let client = GenerationClient::from_env()?;
    let mut session = Session::new();
    session.set_reference(ReferenceImage::from_file(&input_path)?);
    session.set_prompt("a pirate on a stormy sea");

    session.improve_prompt(&client).await;
    println!("Improved prompt: {}", session.prompt());

    for round in 1..=2 {
        match session.generate(&client).await {
            GenerationOutcome::Succeeded(result) => {
                let path = result.save_to_dir(".")?;
                println!("Round {}: saved {}", round, path.display());
                session.use_as_reference(&result.id)?;
                session.set_prompt("the same character, now as a watercolor painting");
            }
            GenerationOutcome::Failed { error, .. } => return Err(error),
            GenerationOutcome::Skipped => break,
        }
    }

    println!("History: {} image(s)", session.history().len());
    Ok(())
}
