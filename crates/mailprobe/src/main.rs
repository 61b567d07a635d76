//! `mailprobe` - check mailbox existence and send test messages over SMTP.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use mailprobe_core::{
    DohResolver, MailboxCheck, MxResolver, OutgoingMessage, ProbeOptions, SendOptions, Settings,
    StaticResolver, check_mailbox, send_mail,
};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Cmd};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so JSON output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailprobe=info,mailprobe_core=info,mailprobe_smtp=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let path = cli.settings.unwrap_or_else(Settings::path);

    match cli.cmd {
        Cmd::Init { force } => init(&path, force).await,
        Cmd::Check {
            email,
            json,
            timeout_ms,
            mx,
            sender,
        } => {
            let settings = load(&path).await?;
            let mut options = settings.probe_options();
            if let Some(ms) = timeout_ms {
                options.timeout = Duration::from_millis(ms);
            }
            if let Some(sender) = sender {
                options.sender = sender;
            }

            let check = if mx.is_empty() {
                let resolver = DohResolver::new(settings.resolver.endpoints)?;
                probe(&resolver, &email, &options).await?
            } else {
                probe(&StaticResolver::new(mx), &email, &options).await?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&check)?);
            } else {
                print_check(&check);
            }
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Send {
            host,
            port,
            security,
            from,
            to,
            user,
            password,
            subject,
            body,
            timeout_ms,
        } => {
            let smtp = load(&path).await?.smtp;
            let Some(host) = host.or(smtp.host) else {
                bail!("no SMTP host given (use --host or set smtp.host)");
            };
            let Some(from) = from.or(smtp.from) else {
                bail!("no sender given (use --from or set smtp.from)");
            };

            let mut options = SendOptions::new(host);
            options.port = port.or(smtp.port);
            options.security = security.map_or(smtp.security, Into::into);
            options.user = user.or(smtp.user);
            options.password = password;
            if let Some(ms) = timeout_ms {
                options.timeout = Duration::from_millis(ms);
            }

            let message = to
                .into_iter()
                .fold(OutgoingMessage::new(from, subject, body), OutgoingMessage::to);

            match send_mail(&options, &message).await {
                Ok(()) => {
                    println!("sent via {} ({})", options.host, options.security.display_name());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("send failed: {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

async fn load(path: &Path) -> anyhow::Result<Settings> {
    let settings = Settings::load_from(path)
        .await
        .with_context(|| format!("loading settings from {}", path.display()))?;
    debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}

async fn probe<R: MxResolver>(
    resolver: &R,
    email: &str,
    options: &ProbeOptions,
) -> anyhow::Result<MailboxCheck> {
    Ok(check_mailbox(resolver, email, options).await?)
}

async fn init(path: &Path, force: bool) -> anyhow::Result<ExitCode> {
    if !force && tokio::fs::try_exists(path).await? {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    Settings::default()
        .save_to(path)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn print_check(check: &MailboxCheck) {
    let status = match check.exists {
        Some(true) => "exists",
        Some(false) => "does not exist",
        None => "unknown",
    };
    println!("{}: {status} ({})", check.email, check.reason);
    for attempt in &check.attempts {
        println!(
            "  {} [{}] {}: {}",
            attempt.host, attempt.strategy, attempt.verdict, attempt.detail
        );
    }
}
