//! Plain-TCP IRC adapter.
//!
//! Each joined channel is one shared player (`irc:#garden`) and only lines
//! addressed to the bot (`tinypet: feed`) count there. A private message
//! makes the sender's nick the player (`irc:alice`).

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use crate::config::IrcConfig;
use crate::gateway::adapter::{Adapter, DeliveryError, Inbound};

/// Payload bytes per PRIVMSG, leaving room for the prefix the server adds.
const MAX_LINE_BYTES: usize = 400;

#[derive(Debug, PartialEq, Eq)]
struct Line<'a> {
    nick: Option<&'a str>,
    command: &'a str,
    params: Vec<&'a str>,
}

fn parse_line(raw: &str) -> Option<Line<'_>> {
    let raw = raw.trim_end_matches(['\r', '\n']);
    let (prefix, rest) = match raw.strip_prefix(':') {
        Some(stripped) => {
            let (prefix, rest) = stripped.split_once(' ')?;
            (Some(prefix), rest)
        }
        None => (None, raw),
    };
    let (middle, trailing) = match rest.split_once(" :") {
        Some((middle, trailing)) => (middle, Some(trailing)),
        None => (rest, None),
    };
    let mut words = middle.split(' ').filter(|w| !w.is_empty());
    let command = words.next()?;
    let mut params: Vec<&str> = words.collect();
    params.extend(trailing);
    let nick = prefix.map(|p| p.split_once('!').map(|(nick, _)| nick).unwrap_or(p));
    Some(Line {
        nick,
        command,
        params,
    })
}

/// Decide whether a PRIVMSG is for us and which chat it belongs to.
fn to_inbound(own_nick: &str, line: &Line<'_>) -> Option<Inbound> {
    let [target, text] = line.params.as_slice() else {
        return None;
    };
    let sender = line.nick?;
    if target.starts_with('#') || target.starts_with('&') {
        // Nicks compare case-insensitively; "tinypetty: hi" is not for "tinypet".
        let head = text.get(..own_nick.len())?;
        if !head.eq_ignore_ascii_case(own_nick) {
            return None;
        }
        let rest = &text[own_nick.len()..];
        let rest = match rest.chars().next() {
            Some(':' | ',') => &rest[1..],
            Some(c) if c.is_whitespace() => rest,
            _ => return None,
        };
        let rest = rest.trim();
        if rest.is_empty() {
            return None;
        }
        Some(Inbound::new("irc", target, rest))
    } else if target.eq_ignore_ascii_case(own_nick) {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Inbound::new("irc", sender, text))
    } else {
        None
    }
}

/// Split reply text into IRC-sized lines, never cutting a character.
fn wrap(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let mut current = String::new();
        for ch in line.chars() {
            if current.len() + ch.len_utf8() > MAX_LINE_BYTES {
                out.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

pub struct IrcAdapter {
    config: IrcConfig,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl IrcAdapter {
    pub fn new(config: IrcConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
        }
    }

    async fn write_raw(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "not connected",
            ));
        };
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\r\n").await?;
            writer.flush().await
        }
        .await;
        if result.is_err() {
            *guard = None;
        }
        result
    }

    /// One connection, from registration until the server hangs up.
    async fn session(&self, inbound: &mpsc::UnboundedSender<Inbound>) -> anyhow::Result<()> {
        let address = format!("{}:{}", self.config.server, self.config.port);
        let stream = TcpStream::connect(&address).await?;
        info!("connected to {}", address);
        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);

        let nick = self.config.nick.clone();
        self.write_raw(&format!("NICK {}", nick)).await?;
        self.write_raw(&format!("USER {} 0 * :tinypet", nick)).await?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(raw) = lines.next_line().await? {
            let Some(line) = parse_line(&raw) else {
                continue;
            };
            match line.command {
                "PING" => {
                    let token = line.params.first().copied().unwrap_or_default();
                    self.write_raw(&format!("PONG :{}", token)).await?;
                }
                "001" => {
                    for channel in &self.config.channels {
                        self.write_raw(&format!("JOIN {}", channel)).await?;
                    }
                }
                "433" => return Err(anyhow!("nick {} is already in use", nick)),
                "PRIVMSG" => {
                    if let Some(msg) = to_inbound(&nick, &line) {
                        if inbound.send(msg).is_err() {
                            return Ok(());
                        }
                    }
                }
                "ERROR" => {
                    return Err(anyhow!("server closed link: {}", line.params.join(" ")));
                }
                _ => {}
            }
        }
        Err(anyhow!("connection closed"))
    }
}

#[async_trait]
impl Adapter for IrcAdapter {
    fn name(&self) -> &str {
        "irc"
    }

    async fn run(&self, inbound: mpsc::UnboundedSender<Inbound>) -> anyhow::Result<()> {
        let pause = Duration::from_secs(self.config.reconnect_secs.max(1));
        loop {
            let result = self.session(&inbound).await;
            *self.writer.lock().await = None;
            if inbound.is_closed() {
                return Ok(());
            }
            match result {
                Ok(()) => return Ok(()),
                Err(e) => warn!("irc session ended: {:#}; reconnecting in {:?}", e, pause),
            }
            tokio::time::sleep(pause).await;
        }
    }

    async fn send(&self, chat: &str, text: &str) -> Result<(), DeliveryError> {
        if chat.is_empty() || chat.contains(' ') {
            return Err(DeliveryError::Unreachable(format!("bad target {:?}", chat)));
        }
        for line in wrap(text) {
            self.write_raw(&format!("PRIVMSG {} :{}", chat, line))
                .await
                .map_err(|e| DeliveryError::Transient(e.to_string()))?;
        }
        debug!("sent to irc:{}", chat);
        Ok(())
    }
}
