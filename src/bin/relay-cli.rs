use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Command-line client for a running meta-relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8545")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay liveness and the latest block
    Health,
    /// List accounts the relay can sign for
    Accounts,
    /// Send an arbitrary JSON-RPC call
    Call {
        method: String,
        /// JSON array of params
        #[arg(default_value = "[]")]
        params: String,
    },
    /// Sign and publish a transaction
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "0x0")]
        value: String,
        #[arg(long, default_value = "0x")]
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Accounts => {
            let res = client.post(&cli.url).json(&rpc("eth_accounts", json!([]))).send().await?;
            print_response(res).await?;
        }
        Commands::Call { method, params } => {
            let params: Value = serde_json::from_str(&params)?;
            let res = client.post(&cli.url).json(&rpc(&method, params)).send().await?;
            print_response(res).await?;
        }
        Commands::Send { from, to, value, data } => {
            let tx = json!({ "from": from, "to": to, "value": value, "data": data });
            let res = client
                .post(&cli.url)
                .json(&rpc("eth_sendTransaction", json!([tx])))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn rpc(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params })
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
