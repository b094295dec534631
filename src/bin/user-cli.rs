use clap::{Parser, Subcommand, ValueEnum};
use reqwest::StatusCode;
use serde_json::{json, Value};

use user_service::rpc::RpcClient;
use user_service::store::UserFields;

#[derive(Parser)]
#[command(name = "user-cli")]
#[command(about = "Management CLI for the user service", long_about = None)]
struct Cli {
    /// Which protocol surface to talk to.
    #[arg(short, long, value_enum, default_value_t = Transport::Http)]
    transport: Transport,

    #[arg(long, default_value = "http://localhost:8080")]
    http_url: String,

    #[arg(long, default_value = "localhost:50051")]
    rpc_addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Http,
    Rpc,
}

#[derive(Subcommand)]
enum Commands {
    /// List all users
    List,
    /// Show one user
    Get { id: String },
    /// Create a user
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        age: i32,
    },
    /// Replace a user's fields
    Update {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        age: i32,
    },
    /// Delete a user
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let output = match cli.transport {
        Transport::Http => via_http(&cli.http_url, cli.command).await?,
        Transport::Rpc => via_rpc(&cli.rpc_addr, cli.command).await?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn via_http(base: &str, command: Commands) -> Result<Value, Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let users = format!("{}/api/users", base.trim_end_matches('/'));

    let request = match command {
        Commands::List => client.get(&users),
        Commands::Get { id } => client.get(format!("{users}/{id}")),
        Commands::Create { name, email, age } => client
            .post(&users)
            .json(&UserFields { name, email, age }),
        Commands::Update {
            id,
            name,
            email,
            age,
        } => client
            .put(format!("{users}/{id}"))
            .json(&UserFields { name, email, age }),
        Commands::Delete { id } => client.delete(format!("{users}/{id}")),
    };

    let res = request.send().await?;
    let status = res.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(json!({ "deleted": true }));
    }
    let body: Value = res.json().await?;
    if !status.is_success() {
        eprintln!("Error: REST API returned status {}", status);
    }
    Ok(body)
}

async fn via_rpc(addr: &str, command: Commands) -> Result<Value, Box<dyn std::error::Error>> {
    let mut client = RpcClient::connect(addr).await?;

    let output = match command {
        Commands::List => serde_json::to_value(client.list_users().await?)?,
        Commands::Get { id } => serde_json::to_value(client.get_user(&id).await?)?,
        Commands::Create { name, email, age } => {
            serde_json::to_value(client.create_user(UserFields { name, email, age }).await?)?
        }
        Commands::Update {
            id,
            name,
            email,
            age,
        } => serde_json::to_value(
            client
                .update_user(&id, UserFields { name, email, age })
                .await?,
        )?,
        Commands::Delete { id } => json!({ "deleted": client.delete_user(&id).await? }),
    };
    Ok(output)
}
