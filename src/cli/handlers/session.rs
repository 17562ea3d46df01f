use time::format_description::well_known::Rfc3339;

use curator::config::LoginArgs;

use crate::cli::{CliError, Ctx};

pub async fn login(ctx: &Ctx, args: LoginArgs) -> Result<(), CliError> {
    let password = match args.password {
        Some(password) => password,
        None => ctx
            .terminal
            .read_line("Password: ")
            .await?
            .ok_or_else(|| CliError::InvalidInput("password required".into()))?,
    };

    let session = ctx.console.session().login(&args.email, &password).await?;
    let expires = session
        .expires_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| session.expires_at.to_string());
    println!("Signed in as {} until {expires}", session.user.email);
    Ok(())
}

pub async fn logout(ctx: &Ctx) -> Result<(), CliError> {
    ctx.console.logout().await;
    println!("Signed out");
    Ok(())
}

pub fn whoami(ctx: &Ctx) -> Result<(), CliError> {
    let session = ctx.console.session().require()?;
    let expires = session
        .expires_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| session.expires_at.to_string());
    println!("{} (session valid until {expires})", session.user.email);
    Ok(())
}
