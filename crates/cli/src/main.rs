use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rook")]
#[command(about = "Rook chess assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory with a default config.json and the editable agent prompts.
    Init {
        /// Config file path (default: ROOK_CONFIG_PATH or ~/.rook/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the HTTP API (chat, Chess.com analysis, knowledge base).
    Serve {
        /// Config file path (default: ROOK_CONFIG_PATH or ~/.rook/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8000)
        #[arg(long, short)]
        port: Option<u16>,

        /// Bind address (default from config or 127.0.0.1)
        #[arg(long, short)]
        bind: Option<String>,
    },

    /// Chat with the assistant through a running server (interactive).
    Chat {
        /// Config file path (default: ROOK_CONFIG_PATH or ~/.rook/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Server URL (default: derived from the config's bind and port)
        #[arg(long, short, value_name = "URL")]
        url: Option<String>,

        /// Optional existing session id to continue.
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Some(Commands::Serve { .. }) => "info",
        _ => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Some(Commands::Version) => {
            println!("rook {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port, bind }) => {
            if let Err(e) = run_serve(config, port, bind).await {
                log::error!("server failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            url,
            session,
        }) => {
            if let Err(e) = run_chat(config, url, session).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(rook::config::default_config_path);
    let dir = rook::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, path) = rook::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    if let Some(b) = bind {
        config.server.bind = b;
    }
    log::info!(
        "starting server on {}:{}",
        config.server.bind,
        config.server.port
    );
    rook::gateway::run_server(config, path).await
}

/// Base URL for the configured server; a wildcard bind is reached over loopback.
fn server_url(config: &rook::config::Config) -> String {
    let bind = config.server.bind.trim();
    let host = match bind {
        "" | "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    format!("http://{}:{}", host, config.server.port)
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    response: String,
    #[serde(default)]
    agent_used: String,
    #[serde(default)]
    conversation_state: Value,
}

async fn run_chat(
    config_path: Option<PathBuf>,
    url: Option<String>,
    session: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let base = match url {
        Some(u) => u.trim_end_matches('/').to_string(),
        None => {
            let (config, _) = rook::config::load_config(config_path)?;
            server_url(&config)
        }
    };
    let client = reqwest::Client::new();
    let mut state: Option<Value> = session.map(|id| json!({ "session_id": id }));
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        match chat_turn(&client, &base, input, state.clone()).await {
            Ok(reply) => {
                log::debug!("answered by {}", reply.agent_used);
                state = Some(reply.conversation_state);
                println!("< {}", reply.response.trim());
            }
            Err(e) => {
                eprintln!("chat error: {}", e);
            }
        }
    }

    Ok(())
}

/// POST /analyze/chat; the OpenAI key is left to the server's env/config.
async fn chat_turn(
    client: &reqwest::Client,
    base: &str,
    message: &str,
    state: Option<Value>,
) -> Result<ChatReply, String> {
    let mut body = json!({ "message": message });
    if let Some(s) = state {
        body["state"] = s;
    }
    let res = client
        .post(format!("{}/analyze/chat", base))
        .json(&body)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let status = res.status();
    let data: Value = res.json().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        let detail = data
            .get("detail")
            .and_then(|v| v.as_str())
            .unwrap_or("request failed");
        return Err(format!("{} {}", status.as_u16(), detail));
    }
    serde_json::from_value(data).map_err(|e| e.to_string())
}
