//! Account command handlers: signup, login, logout, whoami.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use photobox_core::auth::{AuthForm, AuthMode, FormOutcome};
use photobox_core::backend::BackendErrorKind;
use photobox_core::config::Config;
use photobox_core::credentials::mask_token;
use photobox_core::signout::{Navigator, ServerLogout, View};

use super::{Services, open_store, sign_out_flow};

/// Prints where the user should go next instead of switching pages.
struct ConsoleNavigator;

impl ConsoleNavigator {
    fn announce(view: View) {
        match view {
            View::Login => println!("Signed out. Run `photobox login` to sign in again."),
            View::Photos => println!("Run `photobox gallery` to browse photos."),
        }
    }
}

impl Navigator for ConsoleNavigator {
    fn push(&mut self, view: View) {
        Self::announce(view);
    }

    fn refresh(&mut self) {
        tracing::debug!("View refresh requested");
    }

    fn hard_navigate(&mut self, view: View) {
        tracing::warn!(path = view.path(), "Hard navigation after sign-out fallback");
        Self::announce(view);
    }
}

fn resolve_password(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    eprint!("Password: ");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn submit(
    config: &Config,
    mode: AuthMode,
    email: &str,
    password: Option<String>,
) -> Result<FormOutcome> {
    let password = resolve_password(password)?;
    let services = Services::new(config)?;
    let client = services.auth();
    let mut store = open_store();
    let mut form = AuthForm::new(mode);

    eprintln!("{}", form.heading());
    match form.submit(&client, &mut store, email, &password).await {
        Some(Ok(outcome)) => Ok(outcome),
        Some(Err(e)) => Err(e.into()),
        None => bail!("A submission is already in progress."),
    }
}

pub async fn signup(config: &Config, email: &str, password: Option<String>) -> Result<()> {
    let outcome = submit(config, AuthMode::SignUp, email, password).await?;
    println!("{}", outcome.message());
    Ok(())
}

pub async fn login(config: &Config, email: &str, password: Option<String>) -> Result<()> {
    let outcome = submit(config, AuthMode::SignIn, email, password).await?;
    let FormOutcome::LoggedIn(login) = outcome else {
        bail!("Unexpected sign-up result for login");
    };

    if login.saved.is_saved() {
        println!("{}", login.message());
        println!("Logged in as {}", login.session.email);
        ConsoleNavigator.push(View::Photos);
    } else {
        eprintln!("{}", login.message());
    }
    Ok(())
}

pub async fn logout(config: Option<&Config>) -> Result<()> {
    let flow = sign_out_flow(config);
    let mut store = open_store();

    let report = flow.sign_out(&mut store, &mut ConsoleNavigator).await;
    if report.server == ServerLogout::Unavailable {
        tracing::info!("Signed out locally; app server was not reachable");
    }
    if let Some(message) = report.error {
        eprintln!("{message}");
    }
    Ok(())
}

pub async fn whoami(config: &Config) -> Result<()> {
    let store = open_store();
    let Some(session) = store.load().context("read stored session")? else {
        println!("Not logged in.");
        return Ok(());
    };

    let services = Services::new(config)?;
    match services.auth().current_user(&session.access_token).await {
        Ok(user) => {
            let email = user.email.unwrap_or(session.email);
            println!("Logged in as {email} (user {})", user.id);
            println!("Token: {}", mask_token(&session.access_token));
            Ok(())
        }
        Err(e) if e.kind == BackendErrorKind::HttpStatus && matches!(e.status, Some(401 | 403)) => {
            println!("Session expired. Run `photobox login` to sign in again.");
            Ok(())
        }
        Err(e) => Err(e).context("verify session"),
    }
}
