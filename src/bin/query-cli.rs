//! Management CLI: post JSON-RPC queries at a running gateway.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "query-cli")]
#[command(about = "JSON-RPC client for the query gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9071")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a JSON-RPC query and print the reply
    Call {
        /// Method name, e.g. "ping"
        method: String,

        /// First positional parameter
        #[arg(default_value = "")]
        params: String,

        /// Client request id echoed in the reply
        #[arg(short, long, default_value_t = 1)]
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Call { method, params, id } => {
            let request = json!({
                "id": id,
                "method": method,
                "params": [params],
            });

            let response = client.post(&cli.url).json(&request).send().await?;
            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() {
                eprintln!("Error: gateway returned status {status}");
            }

            match serde_json::from_str::<Value>(&body) {
                Ok(parsed) => println!("{}", serde_json::to_string_pretty(&parsed)?),
                Err(_) => println!("{body}"),
            }
        }
    }

    Ok(())
}
