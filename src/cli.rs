//! CLI module
//!
//! This module provides the command-line interface for taskforge: running
//! the server and talking to a running server as a signed-in user.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use uuid::Uuid;

use crate::{
    api::{serve, server::init_tracing, AppState, ClientConfig, HttpClient, ServerConfig, TodoClient},
    auth::{AuthProvider, InMemoryAuth, SupabaseAuth, SupabaseConfig},
    llm::{LlmGateway, OpenRouterConfig, OpenRouterTransport, DEFAULT_MODEL},
    models::{CreateTaskCommand, TaskListItem, TaskSource, UpdateTaskCommand},
    session::ProposalSession,
    store::{GenerationRepository, InMemoryStore, PostgresStore, TaskRepository},
    tree::TaskTree,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(short, long, env = "TASKFORGE_SERVER", default_value = "http://localhost:3000")]
    server: String,

    /// Access token from `login`
    #[arg(short, long, env = "TASKFORGE_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the taskforge API server
    Serve(ServeArgs),

    /// Sign in and print an access token
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// End the session belonging to the token
    Logout,

    /// Show the user the token belongs to
    Whoami,

    /// Task management commands
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Generate task proposals from a goal description
    Generate {
        /// What you want to achieve
        description: String,

        /// Save the proposals as tasks
        #[arg(long)]
        accept: bool,

        /// Drop a proposal before accepting (1-based, repeatable)
        #[arg(long = "drop", value_name = "N")]
        drop: Vec<usize>,

        /// Retitle a proposal before accepting, as N=TITLE (repeatable)
        #[arg(long = "retitle", value_name = "N=TITLE")]
        retitle: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Keep tasks and users in memory instead of Postgres and Supabase
    #[arg(long)]
    in_memory: bool,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Maximum pooled database connections
    #[arg(long, default_value_t = 10)]
    db_pool_size: u32,

    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    openrouter_api_key: Option<String>,

    /// Model used for task generation
    #[arg(long, env = "AI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    supabase_anon_key: Option<String>,

    /// Page the password reset email links to
    #[arg(long, env = "PASSWORD_RESET_REDIRECT")]
    reset_redirect: Option<String>,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List tasks with their subtasks
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Add a task, or a subtask with --parent
    Add {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        parent: Option<Uuid>,
    },

    /// Change a task's title and description
    Edit {
        id: Uuid,

        title: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Toggle completion
    Done { id: Uuid },

    /// Delete a task and its subtasks
    Rm { id: Uuid },
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve(args) => {
            init_tracing().map_err(|e| e as Box<dyn std::error::Error>)?;
            let state = build_state(args).await?;
            let config = ServerConfig {
                address: (args.host, args.port).into(),
            };
            println!("Starting taskforge API server on {}...", config.address);
            serve(state, config).await?;
            Ok(())
        }

        Commands::Login { email, password } => {
            let client = create_client(&cli.server, None);
            let response = client.login(email, password).await?;
            println!(
                "Signed in as {}",
                response.user.email.as_deref().unwrap_or("unknown").bold()
            );
            println!("export TASKFORGE_TOKEN={}", response.session.access_token);
            Ok(())
        }

        Commands::Logout => {
            let client = create_client(&cli.server, cli.token.clone());
            client.logout().await?;
            println!("Signed out");
            Ok(())
        }

        Commands::Whoami => {
            let client = create_client(&cli.server, cli.token.clone());
            let session = client.session().await?;
            println!(
                "{} ({})",
                session.user.email.as_deref().unwrap_or("unknown"),
                session.user.id.to_string().dimmed()
            );
            Ok(())
        }

        Commands::Tasks { command } => {
            let client = create_client(&cli.server, cli.token.clone());
            match command {
                TaskCommands::List { page, limit } => {
                    let response = client.fetch_tasks(*page, *limit).await?;
                    if response.tasks.is_empty() {
                        println!("No tasks yet. Add one with 'tasks add'.");
                    }
                    for task in &response.tasks {
                        print_task(task);
                    }
                    let p = response.pagination;
                    println!(
                        "{}",
                        format!("page {} ({} per page, {} tasks)", p.page, p.limit, p.total)
                            .dimmed()
                    );
                }

                TaskCommands::Add {
                    title,
                    description,
                    parent,
                } => {
                    let mut command = CreateTaskCommand::manual(title.clone(), description.clone());
                    command.parent_task_id = *parent;
                    let created = client.create_task(&command).await?;
                    println!("Added task: \"{}\" ({})", created.title, created.id);
                }

                TaskCommands::Edit {
                    id,
                    title,
                    description,
                } => {
                    let command = UpdateTaskCommand {
                        title: title.clone(),
                        description: description.clone(),
                    };
                    let updated = client.update_task(*id, &command).await?;
                    println!("Updated task: \"{}\"", updated.title);
                }

                TaskCommands::Done { id } => {
                    println!("{}", client.complete_task(*id).await?.message);
                }

                TaskCommands::Rm { id } => {
                    println!("{}", client.delete_task(*id).await?.message);
                }
            }
            Ok(())
        }

        Commands::Generate {
            description,
            accept,
            drop,
            retitle,
        } => {
            let client = Arc::new(create_client(&cli.server, cli.token.clone()));
            let mut session = ProposalSession::new(client.clone());
            session.open();
            session.generate(description).await?;

            let ids: Vec<Uuid> = session.proposals().iter().map(|p| p.temp_id).collect();
            for edit in retitle {
                let (index, title) = edit
                    .split_once('=')
                    .ok_or_else(|| format!("Expected N=TITLE, got '{}'", edit))?;
                let id = proposal_id(&ids, index.trim().parse()?)?;
                let description = session
                    .proposals()
                    .iter()
                    .find(|p| p.temp_id == id)
                    .and_then(|p| p.description.clone());
                session.update_proposal(id, title.trim(), description);
            }
            for index in drop {
                session.delete_proposal(proposal_id(&ids, *index)?);
            }

            for (i, proposal) in session.proposals().iter().enumerate() {
                let marker = if proposal.is_edited {
                    " (edited)".yellow().to_string()
                } else {
                    String::new()
                };
                println!("{}. {}{}", i + 1, proposal.title.bold(), marker);
                if let Some(description) = &proposal.description {
                    println!("   {}", description);
                }
            }

            if *accept {
                let mut tree = TaskTree::new(client);
                let created = session.accept(&mut tree).await?;
                println!("{}", format!("Saved {} tasks", created).green());
            } else {
                session.reject();
                println!(
                    "{}",
                    "Nothing saved. Re-run with --accept to keep these tasks.".dimmed()
                );
            }
            Ok(())
        }

        Commands::Completions { shell } => {
            // Generate completions for the specified shell
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

/// Wires stores, auth and the LLM gateway from the serve flags
async fn build_state(args: &ServeArgs) -> Result<AppState, Box<dyn std::error::Error>> {
    let api_key = args
        .openrouter_api_key
        .clone()
        .ok_or("Server configuration error: OpenRouter API key is missing.")?;
    let transport = OpenRouterTransport::new(OpenRouterConfig::new(api_key));
    let gateway = LlmGateway::new(Arc::new(transport), args.model.clone());

    let (tasks, generations): (Arc<dyn TaskRepository>, Arc<dyn GenerationRepository>) =
        match (&args.database_url, args.in_memory) {
            (Some(url), false) => {
                let store = PostgresStore::connect(url, args.db_pool_size)?;
                store.ensure_schema().await?;
                repositories(store)
            }
            (None, false) => {
                return Err("DATABASE_URL is required unless --in-memory is set".into());
            }
            (_, true) => {
                tracing::warn!("Using the in-memory store; data is lost on exit");
                repositories(InMemoryStore::new())
            }
        };

    let auth: Arc<dyn AuthProvider> = if args.in_memory {
        Arc::new(InMemoryAuth::new())
    } else {
        match (&args.supabase_url, &args.supabase_anon_key) {
            (Some(url), Some(anon_key)) => Arc::new(SupabaseAuth::new(SupabaseConfig {
                url: url.clone(),
                anon_key: anon_key.clone(),
                redirect_to: args.reset_redirect.clone(),
            })),
            _ => {
                return Err(
                    "SUPABASE_URL and SUPABASE_ANON_KEY are required unless --in-memory is set"
                        .into(),
                )
            }
        }
    };

    Ok(AppState::new(tasks, generations, auth, gateway))
}

/// Both ports served by one store
fn repositories<S>(store: S) -> (Arc<dyn TaskRepository>, Arc<dyn GenerationRepository>)
where
    S: TaskRepository + GenerationRepository + 'static,
{
    let store = Arc::new(store);
    let tasks: Arc<dyn TaskRepository> = store.clone();
    let generations: Arc<dyn GenerationRepository> = store;
    (tasks, generations)
}

fn create_client(server_url: &str, access_token: Option<String>) -> HttpClient {
    let config = ClientConfig {
        base_url: server_url.to_string(),
        access_token,
    };

    HttpClient::with_config(config)
}

/// Maps a 1-based proposal number to its id
fn proposal_id(ids: &[Uuid], number: usize) -> Result<Uuid, String> {
    number
        .checked_sub(1)
        .and_then(|i| ids.get(i).copied())
        .ok_or_else(|| format!("No proposal number {}", number))
}

fn source_tag(source: TaskSource) -> String {
    match source {
        TaskSource::Manual => String::new(),
        TaskSource::AiFull => format!(" [{}]", source).cyan().to_string(),
        TaskSource::AiEdited => format!(" [{}]", source).yellow().to_string(),
    }
}

fn checkbox(completed: bool) -> colored::ColoredString {
    if completed {
        "[x]".green()
    } else {
        "[ ]".normal()
    }
}

fn print_task(task: &TaskListItem) {
    println!(
        "{} {}{} {}",
        checkbox(task.completed),
        task.title.bold(),
        source_tag(task.source),
        task.id.to_string().dimmed()
    );
    if let Some(description) = &task.description {
        println!("    {}", description);
    }
    for subtask in &task.subtasks {
        println!(
            "    {} {}{} {}",
            checkbox(subtask.completed),
            subtask.title,
            source_tag(subtask.source),
            subtask.id.to_string().dimmed()
        );
    }
}
