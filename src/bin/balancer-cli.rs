use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "balancer-cli")]
#[command(about = "Management CLI for agent-balancer", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "BALANCER_ADMIN_KEY", default_value = "admin-secret-key")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Low,
    Normal,
    High,
}

impl PriorityArg {
    fn as_str(self) -> &'static str {
        match self {
            PriorityArg::Low => "low",
            PriorityArg::Normal => "normal",
            PriorityArg::High => "high",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check balancer status and backend counts
    Status,
    /// Show full balancer statistics
    Stats,
    /// Ask the balancer to select a backend
    Select {
        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,
        #[arg(long)]
        quality_critical: bool,
        #[arg(long)]
        cost_sensitive: bool,
    },
    /// Register a backend
    Register {
        id: String,
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
        #[arg(long)]
        health_url: Option<String>,
    },
    /// Unregister a backend
    Unregister { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")).send().await?,
        Commands::Stats => client.get(format!("{base}/admin/stats")).send().await?,
        Commands::Select {
            priority,
            quality_critical,
            cost_sensitive,
        } => {
            client
                .get(format!("{base}/admin/select"))
                .query(&[
                    ("priority", priority.as_str().to_string()),
                    ("quality_critical", quality_critical.to_string()),
                    ("cost_sensitive", cost_sensitive.to_string()),
                ])
                .send()
                .await?
        }
        Commands::Register {
            id,
            weight,
            health_url,
        } => {
            client
                .post(format!("{base}/admin/backends"))
                .json(&json!({ "id": id, "weight": weight, "health_url": health_url }))
                .send()
                .await?
        }
        Commands::Unregister { id } => {
            client
                .delete(format!("{base}/admin/backends/{id}"))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> anyhow::Result<()> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: Admin API returned status {status}");
        if !text.is_empty() {
            eprintln!("Response: {text}");
        }
        std::process::exit(1);
    }

    if text.is_empty() {
        println!("{status}");
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
