//! 登录与 token 管理 CLI 操作

use super::output::{print_json, OutputFormat};
use super::ui::{
    print_empty, print_header, print_hint, print_kv, print_section, print_success,
    print_table_header, print_warning,
};
use crate::client::read_envelope;
use crate::session;
use anyhow::Context;
use crossterm::style::Stylize;
use dialoguer::{Input, Password};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sysmanix_core::auth::{LoginResponse, TokenRecord};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeCount {
    count: usize,
}

/// 用户登录，成功后把 token 保存到本地
pub async fn login(
    client: &Client,
    base: &str,
    username: Option<String>,
    password: Option<String>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let username = match username {
        Some(u) => u,
        None => Input::new().with_prompt("Username").interact_text()?,
    };
    let password = match password {
        Some(p) => p,
        None => Password::new().with_prompt("Password").interact()?,
    };

    let resp = client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await?;
    let token: LoginResponse = read_envelope(resp).await?.into_data()?;
    let saved = session::save_token(&token.token);

    match output {
        OutputFormat::Json => print_json(&token)?,
        OutputFormat::Table => {
            print_header("🔐 LOGIN SUCCESSFUL");
            print_kv("User", &username);
            print_kv("Roles", &token.roles.join(", "));
            print_kv("Token ID", &token.token_id);
            print_kv("Expires", &token.expires_at.to_rfc3339());
            println!();
            match &saved {
                Ok(path) => print_success(&format!("Token saved to {}", path.display())),
                Err(e) => {
                    print_warning(&format!("Token not saved: {}", e));
                    print_hint(&format!(
                        "Export it instead: {}",
                        "SMX_TOKEN=<token>".cyan()
                    ));
                    println!("  {}", token.token);
                }
            }
        }
    }
    Ok(())
}

/// 列出当前用户的 token
pub async fn list_tokens(client: &Client, base: &str, output: OutputFormat) -> anyhow::Result<()> {
    let resp = client.get(format!("{}/auth/tokens", base)).send().await?;
    let tokens: Vec<TokenRecord> = read_envelope(resp).await?.into_data()?;
    render_tokens("🔑 MY TOKENS", &tokens, output)
}

/// 管理员：列出全部或指定用户的 token
pub async fn admin_list_tokens(
    client: &Client,
    base: &str,
    user: Option<&str>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let request = match user {
        Some(u) => client
            .get(format!("{}/auth/admin/tokens/user", base))
            .query(&[("userId", u)]),
        None => client.get(format!("{}/auth/admin/tokens", base)),
    };
    let tokens: Vec<TokenRecord> = read_envelope(request.send().await?).await?.into_data()?;
    let title = match user {
        Some(u) => format!("🔑 TOKENS OF {}", u),
        None => "🔑 ALL ACTIVE TOKENS".to_string(),
    };
    render_tokens(&title, &tokens, output)
}

fn render_tokens(title: &str, tokens: &[TokenRecord], output: OutputFormat) -> anyhow::Result<()> {
    if output == OutputFormat::Json {
        return print_json(&tokens);
    }
    print_header(title);
    if tokens.is_empty() {
        print_empty("No active tokens.");
        return Ok(());
    }
    print_table_header(&[("TOKEN ID", 36), ("USER", 16), ("ROLES", 14), ("EXPIRES", 25)]);
    for t in tokens {
        println!(
            "  {:<36} {:<16} {:<14} {}",
            t.token_id.as_str().cyan(),
            t.user_id,
            t.roles.join(","),
            t.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();
    Ok(())
}

pub async fn revoke_token(
    client: &Client,
    base: &str,
    token_id: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let resp = client
        .post(format!("{}/auth/tokens/revoke", base))
        .json(&json!({ "tokenId": token_id }))
        .send()
        .await?;
    let envelope = read_envelope::<Value>(resp).await?;

    match output {
        OutputFormat::Json => print_json(&json!({
            "status": envelope.status,
            "message": envelope.message,
        }))?,
        OutputFormat::Table if envelope.is_warning() => print_warning(&envelope.message),
        OutputFormat::Table => print_success(&envelope.message),
    }
    Ok(())
}

/// 撤销当前用户全部 token；本地保存的 token 随之失效，一并删除
pub async fn revoke_all_tokens(
    client: &Client,
    base: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let resp = client
        .post(format!("{}/auth/tokens/revoke-all", base))
        .send()
        .await?;
    let result: RevokeCount = read_envelope(resp).await?.into_data()?;
    session::clear_token()?;

    match output {
        OutputFormat::Json => print_json(&json!({ "count": result.count }))?,
        OutputFormat::Table => {
            print_success(&format!("{} token(s) revoked", result.count));
            print_hint("Run 'login' again to obtain a new token");
        }
    }
    Ok(())
}

/// 刷新当前 token，新 token 覆盖本地保存的
pub async fn refresh_token(client: &Client, base: &str, output: OutputFormat) -> anyhow::Result<()> {
    let resp = client
        .post(format!("{}/auth/tokens/refresh", base))
        .send()
        .await?;
    let token: LoginResponse = read_envelope(resp).await?.into_data()?;
    let saved = session::save_token(&token.token);

    match output {
        OutputFormat::Json => print_json(&token)?,
        OutputFormat::Table => {
            print_success("Token refreshed");
            print_kv("Token ID", &token.token_id);
            print_kv("Expires", &token.expires_at.to_rfc3339());
            if let Err(e) = saved {
                print_warning(&format!("Token not saved: {}", e));
                println!("  {}", token.token);
            }
        }
    }
    Ok(())
}

/// 管理员：撤销某用户的全部 token
pub async fn admin_revoke_user(
    client: &Client,
    base: &str,
    user: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let resp = client
        .post(format!("{}/auth/admin/tokens/revoke", base))
        .json(&json!({ "userId": user }))
        .send()
        .await?;
    let result: RevokeCount = read_envelope(resp).await?.into_data()?;

    match output {
        OutputFormat::Json => print_json(&json!({ "count": result.count, "userId": user }))?,
        OutputFormat::Table => {
            print_success(&format!("{} token(s) of '{}' revoked", result.count, user))
        }
    }
    Ok(())
}

/// 本地生成 Argon2id 哈希，填入凭据文件的 passwordHash
pub async fn hash_password(password: Option<String>) -> anyhow::Result<()> {
    let password = match password {
        Some(p) => p,
        None => Password::new()
            .with_prompt("Password")
            .with_confirmation("Repeat password", "Passwords do not match")
            .interact()?,
    };
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    let hashed = sysmanix_core::auth::hash_password(&password)
        .await
        .context("failed to hash password")?;

    print_section("passwordHash");
    println!("  {}", hashed);
    println!();
    Ok(())
}
