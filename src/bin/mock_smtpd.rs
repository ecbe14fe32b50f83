//! Mock SMTP server binary for integration testing
//!
//! Accepts the same flags as the real server and answers with the reply
//! codes the scenario scripts expect, so the harness can be tested without
//! the real server or a leak checker. Mailbox layout follows the real
//! server's `-r` mode: each message is written to `tmp/<n>.mail`, numbered
//! from 0, then moved to `cur/` when the recipient domain is the advertised
//! hostname and to `relay/` otherwise. The body is stored line by line as
//! received, each line followed by CRLF.

use std::io::Write;
use std::net::{Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser, Debug)]
struct Args {
    /// Bind address
    #[arg(short = 'd')]
    bind: String,

    /// Listening port
    #[arg(short = 'p')]
    port: u16,

    /// Log file
    #[arg(short = 'l')]
    log: PathBuf,

    /// Mailbox directory
    #[arg(short = 'm')]
    maildir: PathBuf,

    /// Relay flag
    #[arg(short = 'r')]
    relay: bool,

    /// Advertised hostname
    #[arg(short = 'n')]
    hostname: String,

    /// Ignore SIGINT (exercise the kill path)
    #[arg(long)]
    hang_on_interrupt: bool,

    /// Exit code used after SIGINT
    #[arg(long, default_value = "0")]
    exit_code: i32,
}

struct Shared {
    hostname: String,
    maildir: PathBuf,
    deliveries: AtomicU32,
    log: Mutex<std::fs::File>,
}

impl Shared {
    fn log(&self, msg: &str) {
        if let Ok(mut file) = self.log.lock() {
            let _ = writeln!(file, "{}", msg);
        }
    }

    fn deliver(&self, recipient: &str, body: &[String]) -> std::io::Result<()> {
        let n = self.deliveries.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}.mail", n);
        let staged = self.maildir.join("tmp").join(&name);

        let mut content = String::new();
        for line in body {
            content.push_str(line);
            content.push_str("\r\n");
        }
        std::fs::write(&staged, content)?;

        // Without a domain the message stays in tmp/.
        let Some(domain) = recipient_domain(recipient) else {
            self.log(&format!("no domain, {} left in tmp", name));
            return Ok(());
        };
        let dest = if domain == self.hostname { "cur" } else { "relay" };
        std::fs::rename(&staged, self.maildir.join(dest).join(&name))
    }
}

/// Domain part of `<user@domain>`
fn recipient_domain(recipient: &str) -> Option<&str> {
    let (_, domain) = recipient.rsplit_once('@')?;
    let domain = domain.trim_end().trim_end_matches('>');
    (!domain.is_empty()).then_some(domain)
}

#[cfg(not(unix))]
fn main() {
    eprintln!("mock_smtpd: only supported on Unix");
    std::process::exit(2);
}

#[cfg(unix)]
#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Registered first so an early SIGINT is never lost.
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("mock_smtpd: cannot install SIGINT handler: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = prepare_maildir(&args.maildir) {
        eprintln!("mock_smtpd: cannot create maildir: {}", e);
        std::process::exit(2);
    }
    let log = match std::fs::File::create(&args.log) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("mock_smtpd: cannot open log: {}", e);
            std::process::exit(2);
        }
    };

    let shared = Arc::new(Shared {
        hostname: args.hostname.clone(),
        maildir: args.maildir.clone(),
        deliveries: AtomicU32::new(0),
        log: Mutex::new(log),
    });
    shared.log(&format!("starting, relay={}", args.relay));

    let v4 = match TcpListener::bind((args.bind.as_str(), args.port)).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("mock_smtpd: bind failed: {}", e);
            std::process::exit(2);
        }
    };
    // The real server answers on both families whatever -d says.
    let v6 = TcpListener::bind(SocketAddr::from((Ipv6Addr::LOCALHOST, args.port)))
        .await
        .ok();

    loop {
        tokio::select! {
            accepted = v4.accept() => {
                if let Ok((stream, _)) = accepted {
                    tokio::spawn(serve(stream, shared.clone()));
                }
            }
            accepted = accept_optional(v6.as_ref()) => {
                if let Ok((stream, _)) = accepted {
                    tokio::spawn(serve(stream, shared.clone()));
                }
            }
            _ = interrupt.recv() => {
                shared.log("interrupted");
                if !args.hang_on_interrupt {
                    std::process::exit(args.exit_code);
                }
            }
        }
    }
}

async fn accept_optional(
    listener: Option<&TcpListener>,
) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(l) => l.accept().await,
        None => std::future::pending().await,
    }
}

fn prepare_maildir(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root.join("cur"))?;
    std::fs::create_dir_all(root.join("tmp"))?;
    std::fs::create_dir_all(root.join("relay"))?;
    Ok(())
}

#[derive(Default)]
struct Transaction {
    from: Option<String>,
    recipients: Vec<String>,
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut tx = Transaction::default();

    let greeting = format!("220 {} Service ready\r\n", shared.hostname);
    if writer.write_all(greeting.as_bytes()).await.is_err() {
        return;
    }

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        shared.log(&format!("C: {}", command));
        let upper = command.to_ascii_uppercase();

        let reply = if upper.starts_with("HELO ") {
            format!("250 {} greets {}\r\n", shared.hostname, &command[5..])
        } else if upper.starts_with("EHLO ") {
            format!("250-{} greets {}\r\n250 VRFY\r\n", shared.hostname, &command[5..])
        } else if upper.starts_with("MAIL FROM:") {
            tx = Transaction {
                from: Some(command[10..].to_string()),
                recipients: Vec::new(),
            };
            "250 OK\r\n".to_string()
        } else if upper.starts_with("RCPT TO:") {
            if tx.from.is_none() {
                "503 Bad sequence of commands\r\n".to_string()
            } else {
                tx.recipients.push(command[8..].to_string());
                "250 OK\r\n".to_string()
            }
        } else if upper == "DATA" {
            if tx.recipients.is_empty() {
                "503 Bad sequence of commands\r\n".to_string()
            } else {
                if writer
                    .write_all(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
                    .await
                    .is_err()
                {
                    return;
                }
                let Some(body) = read_body(&mut reader).await else {
                    return;
                };
                // The last recipient decides where the message goes.
                let recipient = tx.recipients.last().cloned().unwrap_or_default();
                tx = Transaction::default();
                match shared.deliver(&recipient, &body) {
                    Ok(()) => "250 OK\r\n".to_string(),
                    Err(_) => "451 Requested action aborted: error in processing\r\n".to_string(),
                }
            }
        } else if upper == "RSET" {
            tx = Transaction::default();
            "250 OK\r\n".to_string()
        } else if upper == "NOOP" {
            "250 OK\r\n".to_string()
        } else if upper.starts_with("VRFY ") {
            "550 No such user here\r\n".to_string()
        } else if upper == "QUIT" {
            let bye = format!("221 {} Service closing transmission channel\r\n", shared.hostname);
            let _ = writer.write_all(bye.as_bytes()).await;
            let _ = writer.shutdown().await;
            return;
        } else {
            "500 Syntax error, command unrecognized\r\n".to_string()
        };

        if writer.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Read message lines up to the lone dot, stored as received
async fn read_body<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Option<Vec<String>> {
    let mut body = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let text = line.trim_end_matches(['\r', '\n']);
        if text == "." {
            return Some(body);
        }
        body.push(text.to_string());
    }
}
