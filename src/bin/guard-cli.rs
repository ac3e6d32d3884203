use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Inspect and reset circuit breakers and rate limits", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GUARD_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "GUARD_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon status
    Status,
    /// Metrics for every registered breaker
    Breakers,
    /// Show one breaker's state
    Check { name: String },
    /// Force one breaker back to closed
    Reset { name: String },
    /// Force every registered breaker back to closed
    ResetAll,
    /// Rate-limit usage for a service
    Usage { service: String },
    /// Clear a service's rate-limit counters
    ResetLimits { service: String },
    /// Latest health report
    Health,
}

struct AdminClient {
    http: reqwest::Client,
    base: String,
    headers: HeaderMap,
}

impl AdminClient {
    fn new(base: &str, key: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
        Ok(Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            headers,
        })
    }

    async fn send(&self, method: Method, path: &str) -> Result<Value, Box<dyn std::error::Error>> {
        let res = self
            .http
            .request(method, format!("{}{}", self.base, path))
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(format!("admin API returned {status}: {body}").into());
        }
        Ok(res.json().await?)
    }

    async fn get(&self, path: &str) -> Result<Value, Box<dyn std::error::Error>> {
        self.send(Method::GET, path).await
    }

    async fn post(&self, path: &str) -> Result<Value, Box<dyn std::error::Error>> {
        self.send(Method::POST, path).await
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let client = AdminClient::new(&cli.url, &cli.key)?;

    match cli.command {
        Commands::Status => print_json(&client.get("/admin/status").await?)?,
        Commands::Breakers => print_json(&client.get("/admin/breakers").await?)?,
        Commands::Check { name } => {
            let snapshot = client.get(&format!("/admin/breakers/{name}")).await?;
            let state = field(&snapshot, "current_state");
            println!("Circuit breaker: {name}");
            println!("State: {state}");
            println!("Failure count: {}", field(&snapshot, "failure_count"));
            if state == "open" {
                println!();
                println!("Circuit is OPEN. Run `guard-cli reset {name}` to close it.");
            }
        }
        Commands::Reset { name } => {
            let outcome = client.post(&format!("/admin/breakers/{name}/reset")).await?;
            let before = &outcome["before"];
            let after = &outcome["after"];
            println!(
                "Before: state={} failures={}",
                field(before, "state"),
                field(before, "failure_count")
            );
            println!(
                "After:  state={} failures={}",
                field(after, "state"),
                field(after, "failure_count")
            );
        }
        Commands::ResetAll => print_json(&client.post("/admin/breakers/reset").await?)?,
        Commands::Usage { service } => print_json(&client.get(&format!("/admin/limits/{service}")).await?)?,
        Commands::ResetLimits { service } => {
            let usage = client.post(&format!("/admin/limits/{service}/reset")).await?;
            println!("Rate limits reset for {service}");
            print_json(&usage)?;
        }
        Commands::Health => print_json(&client.get("/admin/health").await?)?,
    }

    Ok(())
}

fn field(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
