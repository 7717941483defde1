//! parley terminal client
//!
//! Line-oriented client for the parley relay. Logs in with the name given
//! on the command line, prints incoming traffic, and reads commands from
//! stdin:
//!
//! ```text
//! /msg <user> <text>      send a private message
//! /create <group>         create a group
//! /join <group>           join a group
//! /g <group> <text>       send a group message
//! /quit                   exit
//! ```
//!
//! Sent messages are echoed locally; the server never echoes a message
//! back to its sender.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::warn;

use parley_protocol::{ClientCodec, ClientFrame, ServerFrame};
use parley_utils::{ParleyError, Result};

/// Default relay endpoint to connect to
const DEFAULT_ADDR: &str = "127.0.0.1:12345";

const HELP: &str =
    "commands: /msg <user> <text>, /create <group>, /join <group>, /g <group> <text>, /quit";

/// Parsed stdin input
#[derive(Debug, PartialEq)]
enum Input {
    Frame(ClientFrame),
    Quit,
    Unknown,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" => Input::Quit,
        "/create" if !rest.is_empty() => Input::Frame(ClientFrame::CreateGroup(rest.to_string())),
        "/join" if !rest.is_empty() => Input::Frame(ClientFrame::JoinGroup(rest.to_string())),
        "/msg" => match rest.split_once(' ') {
            Some((recipient, message)) if !message.trim().is_empty() => {
                Input::Frame(ClientFrame::PrivateMsg {
                    recipient: recipient.to_string(),
                    message: message.trim().to_string(),
                })
            }
            _ => Input::Unknown,
        },
        "/g" => match rest.split_once(' ') {
            Some((group, message)) if !message.trim().is_empty() => {
                Input::Frame(ClientFrame::GroupMsg {
                    group: group.to_string(),
                    message: message.trim().to_string(),
                })
            }
            _ => Input::Unknown,
        },
        _ => Input::Unknown,
    }
}

fn render(frame: &ServerFrame) {
    match frame {
        ServerFrame::UserList(users) => println!("[users] {}", users.join(", ")),
        ServerFrame::GroupList(groups) if groups.is_empty() => println!("[groups] none"),
        ServerFrame::GroupList(groups) => {
            let rendered: Vec<String> = groups
                .iter()
                .map(|(group, members)| format!("{} ({})", group, members.join(", ")))
                .collect();
            println!("[groups] {}", rendered.join("; "));
        }
        ServerFrame::RecvPrivate { sender, message } => {
            println!("[private from {}] {}", sender, message);
        }
        ServerFrame::RecvGroup {
            sender,
            group,
            message,
        } => println!("[{} | {}] {}", group, sender, message),
        ServerFrame::Error(text) => println!("[server error] {}", text),
    }
}

/// Local echo for a frame we just sent
fn echo(frame: &ClientFrame) {
    match frame {
        ClientFrame::PrivateMsg { recipient, message } => {
            println!("[private to {}] {}", recipient, message);
        }
        ClientFrame::GroupMsg { group, message } => println!("[{} | you] {}", group, message),
        _ => {}
    }
}

async fn send(framed: &mut Framed<TcpStream, ClientCodec>, frame: ClientFrame) -> Result<()> {
    framed
        .send(frame)
        .await
        .map_err(|e| ParleyError::connection(e.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    parley_utils::init_logging()?;

    let mut args = std::env::args().skip(1);
    let Some(name) = args.next() else {
        eprintln!("usage: parley-client <name> [addr]");
        std::process::exit(2);
    };
    let addr = args
        .next()
        .or_else(|| std::env::var("PARLEY_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| ParleyError::connection(format!("{}: {}", addr, e)))?;
    println!("connected to {} as {}", addr, name);

    let mut framed = Framed::new(stream, ClientCodec::new());
    send(&mut framed, ClientFrame::Login(name)).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            incoming = framed.next() => match incoming {
                Some(Ok(frame)) => render(&frame),
                Some(Err(e)) if e.is_fatal() => {
                    println!("connection error: {}", e);
                    break;
                }
                Some(Err(e)) => warn!("bad frame from server: {}", e),
                None => {
                    println!("server closed the connection");
                    break;
                }
            },
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match parse_input(&line) {
                    Input::Frame(frame) => {
                        echo(&frame);
                        send(&mut framed, frame).await?;
                    }
                    Input::Quit => break,
                    Input::Unknown => println!("{}", HELP),
                },
                None => break,
            },
        }
    }

    Ok(())
}
