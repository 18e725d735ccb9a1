use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use crate::error::Error;

/// First TCP port of X servers, display `n` listens on `6000 + n`.
pub const X_TCP_PORT: u16 = 6000;

const UNIX_SOCKET_DIR: &str = "/tmp/.X11-unix";

/// Parsed X display name `[protocol/][host]:display[.screen]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName {
    protocol: Option<String>,
    host: String,
    display: u16,
    screen: u16,
}

/// Where to reach an X server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint<'a> {
    Tcp { host: &'a str, port: u16 },
    Unix { path: PathBuf },
}

fn parse_number(s: &str, what: &'static &'static str) -> Result<u16, Error> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::ParseError(what));
    }
    s.parse::<u16>().map_err(|_| Error::ParseError(what))
}

impl DisplayName {
    pub fn parse(name: &str) -> Result<DisplayName, Error> {
        let (protocol, remains) = match name.split_once('/') {
            None => (None, name),
            Some((protocol, _)) if protocol.is_empty() => return Err(Error::ParseError(&"empty protocol")),
            Some((protocol, remains)) => (Some(protocol.to_string()), remains),
        };
        let (host, number) = if remains.starts_with('[') {
            let i = match remains.find("]:") {
                None => return Err(Error::ParseError(&"unterminated ipv6 address")),
                Some(i) => i,
            };
            (&remains[1..i], &remains[i + 2..])
        } else {
            match remains.rfind(':') {
                None => return Err(Error::ParseError(&"no display number")),
                Some(i) => (&remains[..i], &remains[i + 1..]),
            }
        };
        let (display, screen) = match number.split_once('.') {
            None => (number, None),
            Some((display, screen)) => (display, Some(screen)),
        };
        let display = parse_number(display, &"invalid display number")?;
        let screen = match screen {
            None => 0,
            Some(screen) => parse_number(screen, &"invalid screen number")?,
        };
        Ok(DisplayName { protocol, host: host.to_string(), display, screen })
    }

    /// Parses display name from environment variable `DISPLAY`.
    pub fn from_env() -> Result<DisplayName, Error> {
        match std::env::var("DISPLAY") {
            Ok(name) => Self::parse(&name),
            Err(_) => Err(Error::ParseError(&"DISPLAY not set")),
        }
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn display(&self) -> u16 {
        self.display
    }

    /// Preferred screen, `0` if unspecified.
    pub fn screen(&self) -> u16 {
        self.screen
    }

    fn is_local(&self) -> bool {
        match self.protocol() {
            Some("unix") => true,
            Some(_) => false,
            None => self.host.is_empty() || self.host == "unix",
        }
    }

    pub fn endpoint(&self) -> Endpoint<'_> {
        if self.is_local() {
            return Endpoint::Unix { path: PathBuf::from(format!("{}/X{}", UNIX_SOCKET_DIR, self.display)) };
        }
        let host = if self.host.is_empty() { "localhost" } else { self.host.as_str() };
        Endpoint::Tcp { host, port: X_TCP_PORT.saturating_add(self.display) }
    }
}

impl Display for DisplayName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(protocol) = self.protocol() {
            write!(f, "{}/", protocol)?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        write!(f, ":{}.{}", self.display, self.screen)
    }
}
