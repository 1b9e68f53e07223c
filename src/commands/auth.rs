use anyhow::Context as _;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Password;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

use super::Context;
use crate::session::Credential;

/// Asks on the terminal without echoing the password.
async fn prompt_password() -> anyhow::Result<String> {
    tokio::task::spawn_blocking(|| {
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Password")
            .interact()
    })
    .await
    .context("password prompt was interrupted")?
    .context("failed to read the password")
}

/// `piped` carries the password when stdin is not a terminal.
pub async fn login<R: AsyncBufRead + Unpin>(
    ctx: &Context,
    email: &str,
    password: Option<String>,
    piped: Option<R>,
) -> anyhow::Result<Credential> {
    let password = match (password, piped) {
        (Some(password), _) => password,
        (None, Some(input)) => input
            .lines()
            .next_line()
            .await?
            .context("no password given")?,
        (None, None) => prompt_password().await?,
    };

    let token = ctx
        .backend
        .login(email, password.trim())
        .await
        .context("login failed")?;
    let credential = Credential::issue(token, Some(email.to_string()));
    ctx.store.save(&credential)?;
    info!(email, "Logged in");

    match credential.expires_at {
        Some(expires_at) => println!("Logged in as {email} until {expires_at}."),
        None => println!("Logged in as {email}."),
    }
    Ok(credential)
}

pub fn logout(ctx: &Context) -> anyhow::Result<()> {
    if ctx.store.clear()? {
        println!("Logged out; removed {}.", ctx.store.path().display());
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

pub async fn whoami(ctx: &Context) -> anyhow::Result<()> {
    let credential = ctx.credential()?;
    let profile = ctx
        .backend
        .fetch_profile(&credential)
        .await
        .context("failed to load the profile")?;

    let name = profile.username.as_deref().unwrap_or("(no username)");
    println!("{name} <{}>", profile.email);
    if let Some(created_at) = &profile.created_at {
        println!("Member since {created_at}");
    }
    if let Some(expires_at) = credential.expires_at {
        println!("Session expires {expires_at}");
    }
    Ok(())
}
