//! Orchestrator CLI - Command-line client for the orchestrator daemon
//! Every subcommand maps to one JSON-RPC tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Remote orchestrator CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "ORCHESTRATOR_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Print raw JSON results
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Upload,
    Download,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Upload => "upload",
            Direction::Download => "download",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command on a server
    Exec {
        alias: String,
        /// Command line (joined with spaces)
        #[arg(required = true, trailing_var_arg = true)]
        cmd: Vec<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Seconds before a still-running job carries a reminder
        #[arg(long)]
        rappel: Option<u64>,
    },

    /// Run a command on a dedicated shell, answering prompts
    Interactive {
        alias: String,
        #[arg(required = true, trailing_var_arg = true)]
        cmd: Vec<String>,
        /// Do not answer known prompts
        #[arg(long)]
        no_auto_respond: bool,
        /// Extra prompt answers as `prompt=response`
        #[arg(long = "respond", value_name = "PROMPT=RESPONSE")]
        responses: Vec<String>,
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run commands in order on one connection
    Seq {
        alias: String,
        #[arg(required = true)]
        commands: Vec<String>,
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Upload or download files (local may be a glob on upload)
    Transfer {
        alias: String,
        #[arg(value_enum)]
        direction: Direction,
        local: String,
        remote: String,
    },

    /// Recent pm2 logs
    Pm2Logs {
        alias: String,
        app: Option<String>,
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
        /// Error stream only
        #[arg(long)]
        errors: bool,
    },

    /// Tail of a container's log
    DockerLogs {
        alias: String,
        container: String,
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        timestamps: bool,
    },

    /// Last lines of a remote file
    Tail {
        alias: String,
        path: String,
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// Show one job
    Status { id: String },

    /// List jobs, newest first
    Queue {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        alias: Option<String>,
    },

    /// Show submitted commands
    History {
        #[arg(long)]
        alias: Option<String>,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Retry a failed or crashed job
    Retry { id: String },

    /// Show diagnostic log entries
    Logs {
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Queue and pool statistics
    Stats,

    /// System diagnostics
    Diag {
        #[arg(long)]
        verbose: bool,
    },

    /// Manage the server catalog
    Server {
        #[command(subcommand)]
        command: ServerCommands,
    },
}

#[derive(Subcommand)]
enum ServerCommands {
    /// Add or update an alias
    Add {
        alias: String,
        host: String,
        user: String,
        #[arg(long, default_value = "22")]
        port: u16,
        #[arg(long)]
        key_path: Option<String>,
        #[arg(long, env = "ORCHESTRATOR_SERVER_PASSWORD")]
        password: Option<String>,
    },
    /// List aliases
    List,
    /// Remove an alias
    Remove { alias: String },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Tabled)]
struct JobRow {
    id: String,
    #[tabled(rename = "type")]
    job_type: String,
    alias: String,
    status: String,
    duration: String,
}

#[derive(Tabled)]
struct ServerRow {
    alias: String,
    host: String,
    port: u64,
    user: String,
    auth: String,
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        let code = error
            .data
            .as_ref()
            .and_then(|d| d["errorCode"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.code.to_string());
        anyhow::bail!("{} ({}): {}", method, code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn colored_status(status: &str) -> String {
    match status {
        "completed" => status.green().to_string(),
        "failed" => status.red().to_string(),
        "partial" | "crashed" => status.yellow().to_string(),
        "running" => status.cyan().to_string(),
        _ => status.to_string(),
    }
}

/// `prompt=response` pairs into the interactive response table
fn parse_responses(pairs: &[String]) -> Result<serde_json::Map<String, Value>> {
    pairs
        .iter()
        .map(|pair| {
            let (prompt, response) = pair
                .split_once('=')
                .with_context(|| format!("Expected PROMPT=RESPONSE, got '{}'", pair))?;
            Ok((prompt.to_string(), Value::String(response.to_string())))
        })
        .collect()
}

fn print_task(result: &Value) {
    let job = &result["job"];
    let status = job["status"].as_str().unwrap_or("unknown");
    println!(
        "{} {} [{}]",
        "Job".bold(),
        result["jobId"].as_str().unwrap_or("?"),
        colored_status(status)
    );
    if let Some(output) = job["output"].as_str().filter(|o| !o.is_empty()) {
        println!();
        println!("{}", output);
    }
    if let Some(error) = job["error"].as_str() {
        println!("{} {}", "Error:".red().bold(), error);
    }
    if let Some(reminder) = job["reminder"].as_str() {
        println!("{}", reminder.yellow());
    }
    if !result["completed"].as_bool().unwrap_or(false) {
        println!("{}", result["message"].as_str().unwrap_or_default().cyan());
    }
}

fn print_jobs(result: &Value) {
    let rows: Vec<JobRow> = result["jobs"]
        .as_array()
        .map(|jobs| {
            jobs.iter()
                .map(|job| JobRow {
                    id: job["id"].as_str().unwrap_or_default().to_string(),
                    job_type: job["type"].as_str().unwrap_or_default().to_string(),
                    alias: job["alias"].as_str().unwrap_or_default().to_string(),
                    status: colored_status(job["status"].as_str().unwrap_or_default()),
                    duration: job["durationMs"]
                        .as_i64()
                        .map(|ms| format!("{}ms", ms))
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    if rows.is_empty() {
        println!("{}", "No jobs".yellow());
    } else {
        println!("{}", Table::new(rows));
    }
}

fn print_servers(result: &Value) {
    let rows: Vec<ServerRow> = result["servers"]
        .as_object()
        .map(|servers| {
            servers
                .iter()
                .map(|(alias, server)| ServerRow {
                    alias: alias.clone(),
                    host: server["host"].as_str().unwrap_or_default().to_string(),
                    port: server["port"].as_u64().unwrap_or(22),
                    user: server["user"].as_str().unwrap_or_default().to_string(),
                    auth: if server["key_path"].is_string() {
                        "key".to_string()
                    } else if server["password"].is_string() {
                        "password".to_string()
                    } else {
                        "none".to_string()
                    },
                })
                .collect()
        })
        .unwrap_or_default();

    if rows.is_empty() {
        println!("{}", "No servers configured".yellow());
    } else {
        println!("{}", Table::new(rows));
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let url = cli.rpc_url.as_str();

    match cli.command {
        Commands::Exec {
            alias,
            cmd,
            timeout,
            rappel,
        } => {
            let params = json!({
                "alias": alias,
                "cmd": cmd.join(" "),
                "timeout": timeout,
                "rappel": rappel,
            });
            let result = call_rpc(url, "task_exec", params).await?;
            if cli.json {
                return print_json(&result);
            }
            print_task(&result);
        }

        Commands::Interactive {
            alias,
            cmd,
            no_auto_respond,
            responses,
            timeout,
        } => {
            let params = json!({
                "alias": alias,
                "cmd": cmd.join(" "),
                "autoRespond": !no_auto_respond,
                "responses": parse_responses(&responses)?,
                "timeout": timeout,
            });
            let result = call_rpc(url, "task_exec_interactive", params).await?;
            if cli.json {
                return print_json(&result);
            }
            print_task(&result);
        }

        Commands::Seq {
            alias,
            commands,
            continue_on_error,
        } => {
            let params = json!({
                "alias": alias,
                "commands": commands,
                "continueOnError": continue_on_error,
            });
            let result = call_rpc(url, "task_exec_sequence", params).await?;
            if cli.json {
                return print_json(&result);
            }
            print_task(&result);
        }

        Commands::Transfer {
            alias,
            direction,
            local,
            remote,
        } => {
            let params = json!({
                "alias": alias,
                "direction": direction.as_str(),
                "local": local,
                "remote": remote,
            });
            let result = call_rpc(url, "task_transfer", params).await?;
            if cli.json {
                return print_json(&result);
            }
            print_task(&result);
        }

        Commands::Pm2Logs {
            alias,
            app,
            lines,
            errors,
        } => {
            let params = json!({
                "alias": alias,
                "app": app,
                "lines": lines,
                "errors": errors,
            });
            let result = call_rpc(url, "get_pm2_logs", params).await?;
            if cli.json {
                return print_json(&result);
            }
            print_task(&result);
        }

        Commands::DockerLogs {
            alias,
            container,
            lines,
            since,
            timestamps,
        } => {
            let params = json!({
                "alias": alias,
                "container": container,
                "lines": lines,
                "since": since,
                "timestamps": timestamps,
            });
            let result = call_rpc(url, "get_docker_logs", params).await?;
            if cli.json {
                return print_json(&result);
            }
            print_task(&result);
        }

        Commands::Tail { alias, path, lines } => {
            let params = json!({ "alias": alias, "filepath": path, "lines": lines });
            let result = call_rpc(url, "tail_file", params).await?;
            if cli.json {
                return print_json(&result);
            }
            print_task(&result);
        }

        Commands::Status { id } => {
            let result = call_rpc(url, "task_status", json!({ "id": id })).await?;
            print_json(&result)?;
        }

        Commands::Queue { status, alias } => {
            let params = json!({ "status": status, "alias": alias });
            let result = call_rpc(url, "task_queue", params).await?;
            if cli.json {
                return print_json(&result);
            }
            print_jobs(&result);
        }

        Commands::History { alias, limit } => {
            let params = json!({ "alias": alias, "limit": limit });
            let result = call_rpc(url, "task_history", params).await?;
            if cli.json {
                return print_json(&result);
            }
            for entry in result["entries"].as_array().into_iter().flatten() {
                println!(
                    "{} {} {} {}",
                    entry["job_id"].as_str().unwrap_or_default().bold(),
                    entry["alias"].as_str().unwrap_or_default().cyan(),
                    entry["type"].as_str().unwrap_or_default(),
                    entry["command"].as_str().unwrap_or_default()
                );
            }
        }

        Commands::Retry { id } => {
            let result = call_rpc(url, "task_retry", json!({ "id": id })).await?;
            if cli.json {
                return print_json(&result);
            }
            println!("{}", format!("✓ Job {} retried", id).green().bold());
            print_task(&result);
        }

        Commands::Logs {
            level,
            search,
            limit,
        } => {
            let params = json!({ "level": level, "search": search, "limit": limit });
            let result = call_rpc(url, "task_logs", params).await?;
            if cli.json {
                return print_json(&result);
            }
            for entry in result["entries"].as_array().into_iter().flatten() {
                let level = entry["level"].as_str().unwrap_or_default();
                let label = match level {
                    "error" => level.red().to_string(),
                    "warn" => level.yellow().to_string(),
                    _ => level.to_string(),
                };
                println!(
                    "{} [{}] {}",
                    entry["timestamp"],
                    label,
                    entry["message"].as_str().unwrap_or_default()
                );
            }
        }

        Commands::Stats => {
            let queue = call_rpc(url, "queue_stats", json!({})).await?;
            let pool = call_rpc(url, "pool_stats", json!({})).await?;
            if cli.json {
                return print_json(&json!({ "queue": queue, "pool": pool }));
            }

            println!("{}", "Queue".cyan().bold());
            println!("  {} {}", "Total Jobs:".bold(), queue["stats"]["total"]);
            for (status, count) in queue["stats"]["by_status"].as_object().into_iter().flatten() {
                println!("  {} {}", format!("{}:", status).bold(), count);
            }
            println!("  {} {}%", "Success Rate:".bold(), queue["stats"]["success_rate"]);
            println!("  {} {}", "Crashed:".bold(), queue["crashedJobs"]);
            println!();
            println!("{}", "Pool".cyan().bold());
            println!("  {} {}", "Connections:".bold(), pool["total_connections"]);
            for (alias, stats) in pool["by_alias"].as_object().into_iter().flatten() {
                println!(
                    "  {} {} total, {} in use",
                    format!("{}:", alias).bold(),
                    stats["total"],
                    stats["in_use"]
                );
            }
        }

        Commands::Diag { verbose } => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(url, "system_diagnostics", json!({ "verbose": verbose })).await {
                Ok(diag) => {
                    if cli.json {
                        return print_json(&diag);
                    }
                    println!("  {} {}", "RPC URL:".bold(), url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Version:".bold(), diag["version"]);
                    println!("  {} {} seconds", "Uptime:".bold(), diag["uptimeSecs"]);
                    println!("  {} {}", "Jobs:".bold(), diag["queue"]["total"]);
                    println!("  {} {}", "Connections:".bold(), diag["pool"]["total_connections"]);
                    println!("  {} {}", "Servers:".bold(), diag["servers"]);
                    println!("  {} {}", "Crashed:".bold(), diag["crashed"]);
                    for entry in diag["logs"].as_array().into_iter().flatten() {
                        println!("    [{}] {}", entry["level"], entry["message"]);
                    }
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Server { command } => match command {
            ServerCommands::Add {
                alias,
                host,
                user,
                port,
                key_path,
                password,
            } => {
                let params = json!({
                    "alias": alias,
                    "host": host,
                    "port": port,
                    "user": user,
                    "keyPath": key_path,
                    "password": password,
                });
                let result = call_rpc(url, "server_add", params).await?;
                println!(
                    "{}",
                    format!("✓ Server {} {}", alias, result["status"].as_str().unwrap_or("saved"))
                        .green()
                        .bold()
                );
            }
            ServerCommands::List => {
                let result = call_rpc(url, "server_list", json!({})).await?;
                if cli.json {
                    return print_json(&result);
                }
                print_servers(&result);
            }
            ServerCommands::Remove { alias } => {
                call_rpc(url, "server_remove", json!({ "alias": alias })).await?;
                println!("{}", format!("✓ Server {} removed", alias).green().bold());
            }
        },
    }

    Ok(())
}
