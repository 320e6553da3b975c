use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for the peer relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key (admin commands only).
    #[arg(short, long, env = "RELAY_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay system status
    Status,
    /// List connected peers and frame counters
    Connections,
    /// Log in and print an access + renewal credential pair
    Login {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        password: String,
    },
    /// Exchange a renewal credential for a new access credential
    Refresh {
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{base}/admin/status"))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Connections => {
            let res = client
                .get(format!("{base}/admin/connections"))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Login { id, password } => {
            let res = client
                .post(format!("{base}/login"))
                .query(&[("id", id.to_string()), ("password", password)])
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Refresh { token } => {
            let res = client
                .post(format!("{base}/refresh"))
                .query(&[("refresh_token", token)])
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
