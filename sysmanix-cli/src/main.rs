mod client;
mod ops;
mod session;

use clap::{Parser, Subcommand};
use ops::{
    admin_list_tokens, admin_revoke_user, hash_password, health, list_services, list_tokens,
    login, logs_service, refresh_token, revoke_all_tokens, revoke_token, start_service,
    status_service, stop_service, OutputFormat,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI wrapper around the SysManix HTTP API.
#[derive(Parser)]
#[command(name = "smx", author, version, about = "CLI for SysManix API")]
struct Cli {
    /// API base url
    #[arg(long, env = "SMX_API_BASE", default_value = "http://127.0.0.1:8080")]
    api_base: String,

    /// Bearer token（缺省使用 login 保存的 token）
    #[arg(long, env = "SMX_TOKEN")]
    token: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // ==================== 认证 ====================
    /// 登录并保存 token
    Login {
        /// 用户名（缺省交互输入）
        #[arg(long, short)]
        username: Option<String>,
        /// 密码（缺省交互输入）
        #[arg(long, short)]
        password: Option<String>,
    },
    /// 当前用户的 token 管理
    #[command(subcommand)]
    Tokens(TokenCommands),
    /// 管理员命令
    #[command(subcommand)]
    Admin(AdminCommands),
    /// 生成凭据文件用的 Argon2id 哈希（本地执行）
    HashPassword {
        /// 密码（缺省交互输入并确认）
        #[arg(long, short)]
        password: Option<String>,
    },

    // ==================== 服务 ====================
    /// Server health
    Health,
    /// List services
    List,
    /// Show status
    Status { name: String },
    /// Start a service
    Start { name: String },
    /// Stop a service
    Stop { name: String },
    /// Show recent logs
    Logs {
        name: String,
        /// 条数（服务端默认 100）
        #[arg(long, short = 'n')]
        lines: Option<usize>,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// 列出当前用户的有效 token
    List,
    /// 撤销指定 token
    Revoke { token_id: String },
    /// 撤销当前用户的全部 token
    RevokeAll,
    /// 换发当前 token
    Refresh,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// 列出全部有效 token，或指定用户的
    Tokens {
        #[arg(long)]
        user: Option<String>,
    },
    /// 撤销某用户的全部 token
    RevokeUser { user: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载 .env 文件（如果存在），忽略错误
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    let token = session::resolve_token(cli.token);
    let client = client::build_client(token.as_deref())?;
    let base = cli.api_base.trim_end_matches('/');

    match cli.command {
        Commands::Login { username, password } => {
            login(&client, base, username, password, cli.output).await?
        }
        Commands::Tokens(cmd) => match cmd {
            TokenCommands::List => list_tokens(&client, base, cli.output).await?,
            TokenCommands::Revoke { token_id } => {
                revoke_token(&client, base, &token_id, cli.output).await?
            }
            TokenCommands::RevokeAll => revoke_all_tokens(&client, base, cli.output).await?,
            TokenCommands::Refresh => refresh_token(&client, base, cli.output).await?,
        },
        Commands::Admin(cmd) => match cmd {
            AdminCommands::Tokens { user } => {
                admin_list_tokens(&client, base, user.as_deref(), cli.output).await?
            }
            AdminCommands::RevokeUser { user } => {
                admin_revoke_user(&client, base, &user, cli.output).await?
            }
        },
        Commands::HashPassword { password } => hash_password(password).await?,

        Commands::Health => health(&client, base, cli.output).await?,
        Commands::List => list_services(&client, base, cli.output).await?,
        Commands::Status { name } => status_service(&client, base, &name, cli.output).await?,
        Commands::Start { name } => start_service(&client, base, &name, cli.output).await?,
        Commands::Stop { name } => stop_service(&client, base, &name, cli.output).await?,
        Commands::Logs { name, lines } => {
            logs_service(&client, base, &name, lines, cli.output).await?
        }
    }

    Ok(())
}

fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
