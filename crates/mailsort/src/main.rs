//! Command-line front end.

use std::path::PathBuf;

use chrono::Local;
use log::{info, warn};
use secrecy::SecretString;

use mailsort::config::default_config_path;
use mailsort::dispatch::{list_folder, DispatchError};
use mailsort::secrets::read_password_file;
use mailsort::{
    logging, CredentialVault, DispatchPipeline, IngestPipeline, KeyringBackend, MachineIdentity,
    MailboxSession, MailsortError, SentFileTracker, SmtpSender,
};

const USAGE: &str = "\
Usage: mailsort [--config PATH] [--dry-run] [COMMAND]

Commands:
  fetch                                   Save attachments from the mailbox (default)
  send-file FILE [--to ADDR] [--subject S]
  send-folder [DIR] [--to ADDR] [--subject S]
  set-password --password-file FILE [--remove-password-file] [--smtp]
  clear-password [--smtp]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Fetch,
    SendFile {
        file: PathBuf,
        to: Option<String>,
        subject: Option<String>,
    },
    SendFolder {
        dir: Option<PathBuf>,
        to: Option<String>,
        subject: Option<String>,
    },
    SetPassword {
        password_file: String,
        remove: bool,
        smtp: bool,
    },
    ClearPassword {
        smtp: bool,
    },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    dry_run: bool,
    command: Command,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args, String> {
    let mut config = None;
    let mut dry_run = false;
    let mut to = None;
    let mut subject = None;
    let mut password_file = None;
    let mut remove = false;
    let mut smtp = false;
    let mut positional = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match arg.as_str() {
            "-h" | "--help" => positional.insert(0, "help".to_string()),
            "-c" | "--config" => config = Some(PathBuf::from(value(&arg)?)),
            "--dry-run" => dry_run = true,
            "--to" => to = Some(value(&arg)?),
            "--subject" => subject = Some(value(&arg)?),
            "--password-file" => password_file = Some(value(&arg)?),
            "--remove-password-file" => remove = true,
            "--smtp" => smtp = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option '{}'", flag)),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None | Some("fetch") => Command::Fetch,
        Some("help") => Command::Help,
        Some("send-file") => Command::SendFile {
            file: positional
                .next()
                .map(PathBuf::from)
                .ok_or("send-file requires a FILE")?,
            to,
            subject,
        },
        Some("send-folder") => Command::SendFolder {
            dir: positional.next().map(PathBuf::from),
            to,
            subject,
        },
        Some("set-password") => Command::SetPassword {
            password_file: password_file.ok_or("set-password requires --password-file")?,
            remove,
            smtp,
        },
        Some("clear-password") => Command::ClearPassword { smtp },
        Some(other) => return Err(format!("unknown command '{}'", other)),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument '{}'", extra));
    }

    Ok(Args {
        config,
        dry_run,
        command,
    })
}

/// Returns `Ok(false)` when the run finished but some items failed.
async fn run(args: Args) -> Result<bool, MailsortError> {
    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = mailsort::load_config(&config_path)?;
    logging::init(&config.logging)?;
    info!("Loaded configuration from {}", config_path.display());

    let vault = CredentialVault::new(KeyringBackend, MachineIdentity::detect(&config_path));

    match args.command {
        Command::Help => Ok(true),

        Command::Fetch => {
            let mut pipeline = IngestPipeline::new(&config)?.dry_run(args.dry_run);
            let mut session = mailsort::ImapSession::open(&config.imap, &vault).await?;
            let result = pipeline.run(&mut session, Local::now().date_naive()).await;
            if let Err(e) = session.logout().await {
                warn!("Logout failed: {}", e);
            }

            let summary = result?;
            println!("{}", summary);
            for (extension, count) in &summary.file_stats {
                let label = if extension.is_empty() {
                    "(none)"
                } else {
                    extension
                };
                println!("  {}: {}", label, count);
            }
            Ok(!summary.has_errors())
        }

        Command::SendFile { file, to, subject } => {
            if !file.is_file() {
                return Err(DispatchError::NotAFile(file).into());
            }
            send(&config, &vault, vec![file], to, subject, args.dry_run).await
        }

        Command::SendFolder { dir, to, subject } => {
            let smtp = config.smtp.as_ref().ok_or(DispatchError::NotConfigured)?;
            let dir = dir
                .or_else(|| smtp.send_folder.clone())
                .ok_or_else(|| DispatchError::NotADirectory(PathBuf::new()))?;
            let files = list_folder(&dir)?;
            send(&config, &vault, files, to, subject, args.dry_run).await
        }

        Command::SetPassword {
            password_file,
            remove,
            smtp,
        } => {
            let principal = principal(&config, smtp)?;
            let password: SecretString = read_password_file(&password_file, remove)?;
            vault.store(&principal, &password)?;
            println!("Password stored for {}", principal);
            Ok(true)
        }

        Command::ClearPassword { smtp } => {
            let principal = principal(&config, smtp)?;
            vault.clear(&principal)?;
            println!("Password cleared for {}", principal);
            Ok(true)
        }
    }
}

fn principal(config: &mailsort::Config, smtp: bool) -> Result<String, MailsortError> {
    if smtp {
        config
            .smtp_user()
            .map(str::to_string)
            .ok_or_else(|| DispatchError::NotConfigured.into())
    } else {
        Ok(config.imap.user.clone())
    }
}

async fn send(
    config: &mailsort::Config,
    vault: &CredentialVault<KeyringBackend>,
    files: Vec<PathBuf>,
    to: Option<String>,
    subject: Option<String>,
    dry_run: bool,
) -> Result<bool, MailsortError> {
    let smtp = config.smtp.as_ref().ok_or(DispatchError::NotConfigured)?;
    let recipient = to
        .or_else(|| smtp.default_recipient.clone())
        .ok_or(DispatchError::NoRecipient)?;

    let mut tracker = SentFileTracker::open(&smtp.sent_files_dir)?;
    let mut pipeline = DispatchPipeline::new(smtp, &mut tracker)?;

    let summary = if dry_run {
        pipeline
            .dispatch::<SmtpSender>(&files, &recipient, subject.as_deref(), None)
            .await?
    } else {
        let user = config.smtp_user().ok_or(DispatchError::NotConfigured)?;
        let sender = SmtpSender::open(smtp, user, vault).await?;
        pipeline
            .dispatch(&files, &recipient, subject.as_deref(), Some(&sender))
            .await?
    };

    println!(
        "{}messages sent {}, failed {}, files sent {}, already sent {}, too large {}, unreadable {}",
        if summary.dry_run { "[dry run] " } else { "" },
        summary.messages_sent,
        summary.messages_failed,
        summary.files_sent,
        summary.already_sent,
        summary.oversized.len(),
        summary.unreadable.len()
    );
    Ok(!summary.has_failures())
}

#[tokio::main]
async fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {}\n\n{}", message, USAGE);
            std::process::exit(2);
        }
    };

    if args.command == Command::Help {
        println!("{}", USAGE);
        return;
    }

    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_default_is_fetch() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.command, Command::Fetch);
        assert!(!args.dry_run);
        assert_eq!(args.config, None);
    }

    #[test]
    fn test_send_file_with_options() {
        let args = parse(&[
            "--config",
            "/etc/mailsort.yaml",
            "send-file",
            "report.pdf",
            "--to",
            "a@example.com",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/mailsort.yaml")));
        assert!(args.dry_run);
        assert_eq!(
            args.command,
            Command::SendFile {
                file: PathBuf::from("report.pdf"),
                to: Some("a@example.com".to_string()),
                subject: None,
            }
        );
    }

    #[test]
    fn test_send_folder_dir_optional() {
        let args = parse(&["send-folder"]).unwrap();
        assert_eq!(
            args.command,
            Command::SendFolder {
                dir: None,
                to: None,
                subject: None
            }
        );
    }

    #[test]
    fn test_set_password_requires_file() {
        assert!(parse(&["set-password"]).is_err());
        let args = parse(&[
            "set-password",
            "--password-file",
            "~/pw.txt",
            "--remove-password-file",
            "--smtp",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::SetPassword {
                password_file: "~/pw.txt".to_string(),
                remove: true,
                smtp: true,
            }
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["launch"]).is_err());
        assert!(parse(&["send-file"]).is_err());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["fetch", "extra"]).is_err());
    }
}
