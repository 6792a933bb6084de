use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::process::Child;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kb_mcp_server::client::{spawn_server, StdioSession};
use kb_mcp_server::config::{InferenceConfig, Profile};
use kb_mcp_server::handlers::knowledge_base::MAIN_URI;
use kb_mcp_server::handlers::llm::ASSISTANT_PERSONA;
use kb_mcp_server::inference::{ChatMessage, CompletionBackend, CompletionRequest, LlamaServerBackend};

/// Interactive client for the knowledge-base MCP server.
#[derive(Parser)]
#[command(name = "kb-mcp-client")]
#[command(version)]
#[command(about = "Talk to a knowledge-base MCP server or a local model")]
#[command(after_help = "EXAMPLES:\n    \
    kb-mcp-client menu                   Browse and edit the knowledge base\n    \
    kb-mcp-client prompt                 Send prompts through the llm server\n    \
    kb-mcp-client list --profile demo    Show what a server offers\n    \
    kb-mcp-client chat                   Chat with the local model directly")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse, query and edit the knowledge base
    Menu(ServerArgs),
    /// Send prompts to the local model through the llm server
    Prompt(ServerArgs),
    /// List the tools, resources and prompts a server offers
    List {
        #[command(flatten)]
        server: ServerArgs,
        /// Server profile to start
        #[arg(long, default_value = "knowledge-base")]
        profile: Profile,
    },
    /// Chat with the local model directly, keeping conversation history
    Chat,
}

#[derive(Args, Clone)]
struct ServerArgs {
    /// Server executable (defaults to kb-mcp-server next to this binary)
    #[arg(long)]
    server: Option<PathBuf>,

    /// Knowledge-base file handed to the server
    #[arg(long)]
    kb_path: Option<PathBuf>,

    /// Extra arguments passed to the server
    #[arg(long = "server-arg")]
    server_args: Vec<String>,
}

impl ServerArgs {
    fn program(&self) -> PathBuf {
        if let Some(path) = &self.server {
            return path.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("kb-mcp-server")))
            .filter(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from("kb-mcp-server"))
    }

    /// Spawn the server with `profile` and complete the handshake.
    ///
    /// The returned child is killed when dropped, so callers hold it for as
    /// long as the session is in use.
    async fn connect(&self, profile: Profile) -> Result<(StdioSession, Child)> {
        let mut envs = vec![("KB_SERVER_PROFILE".to_string(), profile.to_string())];
        if let Some(path) = &self.kb_path {
            envs.push(("KB_PATH".to_string(), path.display().to_string()));
        }

        let program = self.program();
        let (mut session, child) = spawn_server(&program, &self.server_args, &envs)
            .with_context(|| format!("cannot start {}", program.display()))?;

        session.initialize().await.context("handshake failed")?;
        Ok((session, child))
    }
}

/// Line-oriented terminal input.
struct Terminal {
    lines: Lines<BufReader<Stdin>>,
}

impl Terminal {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Print `label` and read one line; `None` at end of input.
    async fn ask(&mut self, label: &str) -> Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(label.as_bytes()).await?;
        stdout.flush().await?;
        Ok(self.lines.next_line().await?)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "kb_mcp_server=debug,kb_mcp_client=debug"
    } else {
        "kb_mcp_server=warn,kb_mcp_client=warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).without_time())
        .init();

    match cli.command {
        Commands::Menu(args) => knowledge_base_menu(args).await,
        Commands::Prompt(args) => prompt_loop(args).await,
        Commands::List { server, profile } => list(server, profile).await,
        Commands::Chat => local_chat().await,
    }
}

async fn list(args: ServerArgs, profile: Profile) -> Result<()> {
    let (mut session, _server) = args.connect(profile).await?;
    print_capabilities(&mut session).await
}

async fn print_capabilities(session: &mut StdioSession) -> Result<()> {
    let tools: Vec<String> = session.list_tools().await?.into_iter().map(|t| t.name).collect();
    println!("Available tools: {tools:?}");

    let mut resources: Vec<String> = session.list_resources().await?.into_iter().map(|r| r.uri).collect();
    resources.extend(session.list_resource_templates().await?.into_iter().map(|r| r.uri));
    println!("Available resources: {resources:?}");

    let prompts: Vec<String> = session.list_prompts().await?.into_iter().map(|p| p.name).collect();
    println!("Available prompts: {prompts:?}");
    Ok(())
}

async fn knowledge_base_menu(args: ServerArgs) -> Result<()> {
    println!("Connecting to the knowledge base server...");
    let (mut session, _server) = args.connect(Profile::KnowledgeBase).await?;
    print_capabilities(&mut session).await?;

    let mut terminal = Terminal::new();

    loop {
        println!("\n--- KNOWLEDGE BASE ---");
        println!("1. View entire knowledge base");
        println!("2. View a specific section");
        println!("3. Query the knowledge base with the LLM");
        println!("4. Add entry to a section");
        println!("5. Create a new section");
        println!("6. Exit");

        let Some(choice) = terminal.ask("\nEnter your choice (1-6): ").await? else {
            break;
        };

        match choice.trim() {
            "1" => {
                println!("\nReading full knowledge base...");
                let result = session.read_resource(MAIN_URI).await?;
                println!("\n{}", result.first_text());
            }
            "2" => {
                let Some(section) = terminal.ask("Enter section number: ").await? else {
                    break;
                };
                println!("\nReading section {section}...");
                match session
                    .read_resource(&format!("kb://section/{}", section.trim()))
                    .await
                {
                    Ok(result) => println!("\n{}", result.first_text()),
                    Err(e) => println!("\nError: {e}"),
                }
            }
            "3" => {
                let Some(query) = terminal.ask("Enter your query for the knowledge base: ").await? else {
                    break;
                };
                println!("\nProcessing query with the LLM...");
                let result = session.call_tool("query_kb", json!({ "query": query })).await?;
                println!("\nAssistant says: {}", result.first_text());
            }
            "4" => {
                let Some(section) = terminal.ask("Enter section number: ").await? else {
                    break;
                };
                let Some(entry) = terminal.ask("Enter new entry: ").await? else {
                    break;
                };
                match section.trim().parse::<i64>() {
                    Ok(number) => {
                        println!("\nAdding entry...");
                        let result = session
                            .call_tool("add_to_kb", json!({ "section": number, "entry": entry }))
                            .await?;
                        println!("\nResult: {}", result.first_text());
                    }
                    Err(_) => println!("\nInvalid section number: {section}"),
                }
            }
            "5" => {
                let Some(title) = terminal.ask("Enter new section title: ").await? else {
                    break;
                };
                println!("\nCreating section...");
                let result = session.call_tool("create_section", json!({ "title": title })).await?;
                println!("\nResult: {}", result.first_text());
            }
            "6" => {
                println!("Exiting knowledge base interface...");
                break;
            }
            other => {
                debug!(choice = other, "unrecognised menu choice");
                println!("Invalid choice, please try again");
            }
        }

        if terminal.ask("\nPress Enter to continue...").await?.is_none() {
            break;
        }
    }

    Ok(())
}

async fn prompt_loop(args: ServerArgs) -> Result<()> {
    let (mut session, _server) = args.connect(Profile::Llm).await?;
    let tools: Vec<String> = session.list_tools().await?.into_iter().map(|t| t.name).collect();
    println!("Available tools: {tools:?}");

    let mut terminal = Terminal::new();
    while let Some(input) = terminal.ask("\nEnter a prompt (or 'exit' to quit): ").await? {
        if input.trim().eq_ignore_ascii_case("exit") {
            break;
        }
        println!("Calling the LLM through MCP...");
        let result = session.call_tool("query_llm", json!({ "prompt": input })).await?;
        println!("\nResponse: {}", result.first_text());
    }
    Ok(())
}

async fn local_chat() -> Result<()> {
    let config = InferenceConfig::from_env().map_err(anyhow::Error::msg)?;
    println!("Using model {}", config.model_path.display());
    let backend = Arc::new(LlamaServerBackend::new(config));

    let mut messages = vec![ChatMessage::system(ASSISTANT_PERSONA)];
    let mut terminal = Terminal::new();

    println!("\nChat with the local model (type 'exit' to quit):");
    let outcome = async {
        while let Some(input) = terminal.ask("\nYou: ").await? {
            if input.trim().eq_ignore_ascii_case("exit") {
                println!("Goodbye!");
                break;
            }
            messages.push(ChatMessage::user(input));

            println!("Generating response...");
            let request = CompletionRequest::from_messages(&messages);
            let worker = Arc::clone(&backend);
            let response = tokio::task::spawn_blocking(move || worker.complete(&request)).await??;

            println!("\nAssistant: {response}");
            messages.push(ChatMessage::assistant(response));
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    backend.shutdown();
    outcome
}
