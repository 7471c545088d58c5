use std::env;
use std::error;
use std::process;
use std::time::Duration;

use reqwest::Url;

/// Probes a running server, e.g. `whisper_runner_health http://localhost:8000/`.
/// Exits with a non-zero code unless the server answers with a success status.
fn main() -> Result<(), Box<dyn error::Error>> {
    let Some(url) = env::args().nth(1) else {
        eprintln!("Missing URL argument");
        process::exit(2);
    };
    let url = Url::parse(&url)?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let response = client.get(url).send()?;
    if !response.status().is_success() {
        eprintln!("Health check failed with status {}", response.status());
        process::exit(1);
    }

    Ok(())
}
