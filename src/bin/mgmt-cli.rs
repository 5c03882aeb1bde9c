use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "mgmt-cli")]
#[command(about = "Operator CLI for the management server", long_about = None)]
struct Cli {
    /// Base URL of the plain listener
    #[arg(short, long, default_value = "http://localhost:4080")]
    url: String,

    /// Operator API token
    #[arg(short, long, env = "MGMT_API_TOKEN", default_value = "")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server status
    Status,
    /// Show the recovered application state
    State,
    /// Print the root CA certificate
    Ca,
    /// Generate a key, enroll it and write the client identity to a directory
    Enroll {
        /// Hostname the certificate is issued for
        hostname: String,
        /// Output directory for client.pem, client.key and ca.pem
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// Enrollment passphrase, if the server requires one
        #[arg(short, long)]
        passphrase: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if !cli.token.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.token))?,
        );
    }

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/api/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::State => {
            let res = client.get(format!("{}/api/state", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Ca => {
            let res = client.get(format!("{}/cert/ca", cli.url)).send().await?;
            if !res.status().is_success() {
                eprintln!("Error: server returned status {}", res.status());
                return Ok(());
            }
            print!("{}", res.text().await?);
        }
        Commands::Enroll { hostname, out_dir, passphrase } => {
            let key = rcgen::KeyPair::generate()?;
            let csr = rcgen::CertificateParams::new(vec![hostname.clone()])?
                .serialize_request(&key)?
                .pem()?;

            let res = client.post(format!("{}/cert/enroll", cli.url))
                .json(&json!({ "hostname": hostname, "csr": csr, "passphrase": passphrase }))
                .send()
                .await?;
            let status = res.status();
            let body: Value = res.json().await?;
            if !status.is_success() || body["result"] != "OK" {
                eprintln!("Error: enrollment refused ({status}): {}", body["message"]);
                return Ok(());
            }

            std::fs::create_dir_all(&out_dir)?;
            std::fs::write(out_dir.join("client.pem"), body["certificate"].as_str().unwrap_or_default())?;
            std::fs::write(out_dir.join("client.key"), key.serialize_pem())?;
            std::fs::write(out_dir.join("ca.pem"), body["ca"].as_str().unwrap_or_default())?;
            println!("Enrolled {hostname}; identity written to {}", out_dir.display());
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
