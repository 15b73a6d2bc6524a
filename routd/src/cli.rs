//! CLI argv adapter: option parsing, stdin body, response printing.
//!
//! Accepted argument forms: `name=value`, `-name value`, `-name=value`,
//! `--name value`; a bare `-name` becomes boolean true; repeated
//! occurrences promote a scalar to a vector. `--` (exactly two dashes)
//! ends option parsing and the remaining tokens form the `passed` list.
//! Every non-option token is a path segment.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use routd_flex::Packet;
use routd_router::{proto_router, Context, Meta, RoutableProtocol, Router};
use routd_x::Error;

const MARK_PASSED_SEPARATOR: &str = "--";
const MARK_ASSIGNMENT: char = '=';
const MARK_ARG_PREFIX: &str = "-";

pub type Cli = Context<CliProtocol>;

enum ArgKind {
    Assign,
    PrefixName,
    PassedSeparator,
    Path,
}

fn classify(arg: &str) -> ArgKind {
    if arg.contains(MARK_ASSIGNMENT) {
        ArgKind::Assign
    } else if arg == MARK_PASSED_SEPARATOR {
        ArgKind::PassedSeparator
    } else if arg.starts_with(MARK_ARG_PREFIX) {
        ArgKind::PrefixName
    } else {
        ArgKind::Path
    }
}

pub struct CliProtocol {
    meta: Meta<Vec<String>>,
    /// Tokens after the `--` separator, handed through untouched.
    pub passed: Vec<String>,
    path: String,
    scalars: HashMap<String, String>,
    vectors: HashMap<String, Vec<String>>,
    body: Bytes,
}

impl CliProtocol {
    pub fn parse(args: Vec<String>, body: Bytes) -> Self {
        let mut protocol = CliProtocol {
            meta: Meta::new(args.clone()),
            passed: Vec::new(),
            path: String::new(),
            scalars: HashMap::new(),
            vectors: HashMap::new(),
            body,
        };
        let mut paths: Vec<&str> = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            match classify(arg) {
                ArgKind::Assign => {
                    let (name, value) = arg.split_once(MARK_ASSIGNMENT).expect("assign arg");
                    protocol.set_value(name, value.to_string());
                }
                ArgKind::PrefixName => {
                    if let Some(next) = args.get(i + 1) {
                        if matches!(classify(next), ArgKind::Path) {
                            protocol.set_value(arg, next.clone());
                            i += 2;
                            continue;
                        }
                    }
                    protocol.set_value(arg, "true".to_string());
                }
                ArgKind::PassedSeparator => {
                    protocol.passed = args[i + 1..].to_vec();
                    break;
                }
                ArgKind::Path => paths.push(arg),
            }
            i += 1;
        }
        protocol.path = paths.join("/");
        protocol
    }

    /// Option keys are stored without their dash prefix, so `-name v`,
    /// `--name v` and `name=v` address the same option.
    fn set_value(&mut self, name: &str, value: String) {
        let key = name.trim_start_matches(MARK_ARG_PREFIX).to_string();
        if let Some(vector) = self.vectors.get_mut(&key) {
            self.scalars.remove(&key);
            vector.push(value);
        } else {
            self.scalars.insert(key.clone(), value.clone());
            self.vectors.insert(key, vec![value]);
        }
    }

    /// Whether the flag was given (bare `-name`, or an explicit truthy
    /// value).
    pub fn bool_arg(&self, key: &str) -> bool {
        matches!(self.scalars.get(key).map(String::as_str), Some("true") | Some("1"))
    }

    pub fn arg(&self, key: &str) -> &str {
        self.scalars.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn arg_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.scalars.get(key).map(String::as_str).unwrap_or(default)
    }

    pub fn args(&self, key: &str) -> &[String] {
        self.vectors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn scalars(&self) -> &HashMap<String, String> {
        &self.scalars
    }

    pub fn vectors(&self) -> &HashMap<String, Vec<String>> {
        &self.vectors
    }
}

impl RoutableProtocol for CliProtocol {
    type Req = Vec<String>;

    fn meta(&self) -> &Meta<Vec<String>> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta<Vec<String>> {
        &mut self.meta
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn body(&mut self) -> Result<Bytes, Error> {
        Ok(self.body.clone())
    }

    fn sid(&self) -> String {
        self.arg("sid").to_string()
    }
}

/// The process-wide CLI router singleton.
pub fn cli_router() -> Arc<Router<CliProtocol>> {
    proto_router("cli")
}

/// Reads the request body from stdin when stdin is redirected. The
/// 32 ms timeout on the first byte avoids blocking forever when the
/// terminal detection misfires (some IDE runners pipe an open-ended
/// stdin).
pub async fn read_stdin_body() -> Bytes {
    if std::io::stdin().is_terminal() {
        return Bytes::new();
    }
    let mut stdin = tokio::io::stdin();
    let mut first = [0u8; 1];
    match tokio::time::timeout(Duration::from_millis(32), stdin.read(&mut first)).await {
        Ok(Ok(n)) if n > 0 => {
            let mut body = first[..n].to_vec();
            let _ = stdin.read_to_end(&mut body).await;
            Bytes::from(body)
        }
        _ => Bytes::new(),
    }
}

/// Routes the process argv (skipping the first `base` tokens) through
/// the CLI router and prints the buffered response; a rotated sid is
/// appended as a notice.
pub async fn route(base: usize) {
    let args: Vec<String> = std::env::args().skip(base).collect();
    let body = read_stdin_body().await;
    let mut ctx = Context::new(CliProtocol::parse(args, body));
    cli_router().route(&mut ctx).await;
    ctx.rp.log_error();
    if ctx.api.as_ref().is_some_and(|api| api.api.responsive) {
        let sid = ctx.rp.resp_sid();
        if !sid.is_empty() {
            ctx.rp.write_str(&format!("\n\nNew sid: {sid}"));
        }
        let response = ctx.rp.clear_buffer();
        println!("{}", String::from_utf8_lossy(&response));
    }
}

/// Serializes the buffered response as a flex packet, mirroring the
/// stream transports; useful when a CLI front-end proxies to one.
pub fn response_packet(ctx: &Cli) -> Bytes {
    let (code, message) = ctx.rp.error_units();
    let packet = Packet {
        sid: ctx.rp.resp_sid(),
        code,
        message,
        body: ctx.rp.clear_buffer(),
        ..Packet::default()
    };
    packet.encode()
}
