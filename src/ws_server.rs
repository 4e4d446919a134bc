use crate::error::Result;
use crate::types::{Command, FretboardFrame, ShellEvent};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use sha1_smol::Sha1;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// The fretboard page, compiled into the binary.
pub const PAGE_HTML: &str = include_str!("../assets/fretboard.html");

/// Combined HTTP + WebSocket server.
///
/// - `GET /` or `GET /index.html` → serves the fretboard page
/// - `GET /command?c=<command>` → queues a command for the shell
/// - WebSocket upgrade → streams every FretboardFrame as JSON, starting with
///   the latest one
///
/// Single port, no separate HTTP server needed.
pub struct WsServer {
    frame_rx: Receiver<FretboardFrame>,
    command_tx: Sender<ShellEvent>,
    addr: String,
}

struct WsClient {
    stream: TcpStream,
    alive: bool,
}

impl WsClient {
    fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nonblocking(true);
        let _ = stream.set_nodelay(true);
        Self {
            stream,
            alive: true,
        }
    }

    fn send_text(&mut self, text: &str) -> bool {
        let payload = text.as_bytes();
        let len = payload.len();
        let mut frame = Vec::with_capacity(10 + len);
        frame.push(0x81); // FIN + text opcode
        if len < 126 {
            frame.push(len as u8);
        } else if len < 65536 {
            frame.push(126);
            frame.push((len >> 8) as u8);
            frame.push((len & 0xFF) as u8);
        } else {
            frame.push(127);
            for i in (0..8).rev() {
                frame.push(((len >> (i * 8)) & 0xFF) as u8);
            }
        }
        frame.extend_from_slice(payload);
        match self.stream.write_all(&frame) {
            Ok(()) => true,
            Err(_) => {
                self.alive = false;
                false
            }
        }
    }
}

/// Connected WebSocket clients plus the last frame sent, for late joiners.
#[derive(Default)]
struct Broadcast {
    clients: Vec<WsClient>,
    latest: Option<String>,
}

type SharedBroadcast = Arc<Mutex<Broadcast>>;

fn lock(shared: &SharedBroadcast) -> MutexGuard<'_, Broadcast> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Parsed HTTP request, enough to decide WS vs HTTP.
struct HttpRequest {
    path: String,
    is_upgrade: bool,
    ws_key: Option<String>,
}

fn parse_request(stream: &mut TcpStream) -> std::result::Result<HttpRequest, String> {
    let reader = BufReader::new(stream.try_clone().map_err(|e| e.to_string())?);
    parse_head(reader)
}

/// Read the request line and headers, up to the blank line.
fn parse_head(mut reader: impl BufRead) -> std::result::Result<HttpRequest, String> {
    let mut path = String::from("/");
    let mut is_upgrade = false;
    let mut ws_key = None;
    let mut first = true;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).map_err(|e| e.to_string())?;
        let trimmed = line.trim();
        if n == 0 || trimmed.is_empty() {
            break;
        }
        if first {
            // Parse "GET /path HTTP/1.1"
            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            if parts.len() >= 2 {
                path = parts[1].to_string();
            }
            first = false;
            continue;
        }
        let Some((name, value)) = trimmed.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("upgrade")
            && value.to_ascii_lowercase().contains("websocket")
        {
            is_upgrade = true;
        }
        if name.eq_ignore_ascii_case("sec-websocket-key") {
            ws_key = Some(value.to_string());
        }
    }
    Ok(HttpRequest {
        path,
        is_upgrade,
        ws_key,
    })
}

fn accept_key(key: &str) -> String {
    let magic = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
    let mut hasher = Sha1::new();
    hasher.update(format!("{}{}", key, magic).as_bytes());
    base64_encode(&hasher.digest().bytes())
}

fn ws_handshake(stream: &mut TcpStream, key: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(key)
    );
    stream.write_all(response.as_bytes())
}

fn respond(stream: &mut TcpStream, status: &str, content_type: &str, body: &[u8]) {
    let header = format!(
        "HTTP/1.1 {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         Cache-Control: no-cache\r\n\
         \r\n",
        status,
        content_type,
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(body);
}

fn serve_404(stream: &mut TcpStream) {
    let body = b"<h1>404</h1><p>Open <a href=\"/\">/</a> for the fretboard</p>";
    respond(stream, "404 Not Found", "text/html", body);
}

fn base64_encode(data: &[u8]) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut result = String::new();
    for chunk in data.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;
        result.push(CHARS[((triple >> 18) & 0x3F) as usize] as char);
        result.push(CHARS[((triple >> 12) & 0x3F) as usize] as char);
        if chunk.len() > 1 {
            result.push(CHARS[((triple >> 6) & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
        if chunk.len() > 2 {
            result.push(CHARS[(triple & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
    }
    result
}

/// Decode `%XX` escapes and `+` as space. `None` on bad escapes or non-UTF-8.
fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = s.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).ok()
}

/// Value of `key` in a `/path?a=1&b=2` request target.
fn query_param(path: &str, key: &str) -> Option<String> {
    let (_, query) = path.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| percent_decode(v))
}

fn handle_command(stream: &mut TcpStream, path: &str, command_tx: &Sender<ShellEvent>) {
    let Some(text) = query_param(path, "c") else {
        respond(stream, "400 Bad Request", "text/plain", b"missing c parameter");
        return;
    };
    match text.parse::<Command>() {
        Ok(command) => {
            debug!("web: {:?}", command);
            if command_tx.send(ShellEvent::Command(command)).is_ok() {
                respond(stream, "202 Accepted", "text/plain", b"queued");
            } else {
                respond(stream, "503 Service Unavailable", "text/plain", b"shell stopped");
            }
        }
        Err(e) => {
            let body = e.to_string();
            respond(stream, "400 Bad Request", "text/plain", body.as_bytes())
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    shared: SharedBroadcast,
    command_tx: Sender<ShellEvent>,
) {
    match parse_request(&mut stream) {
        Ok(req) if req.is_upgrade => {
            let Some(key) = req.ws_key else {
                let body = b"missing Sec-WebSocket-Key";
                respond(&mut stream, "400 Bad Request", "text/plain", body);
                return;
            };
            if let Err(e) = ws_handshake(&mut stream, &key) {
                warn!("WS handshake failed: {}", e);
                return;
            }
            info!("WebSocket client connected");
            let mut client = WsClient::new(stream);
            let mut b = lock(&shared);
            if let Some(latest) = &b.latest {
                client.send_text(latest);
            }
            if client.alive {
                b.clients.push(client);
            }
        }
        Ok(req) => {
            let route = req.path.split('?').next().unwrap_or("/");
            match route {
                "/" | "/index.html" => respond(
                    &mut stream,
                    "200 OK",
                    "text/html; charset=utf-8",
                    PAGE_HTML.as_bytes(),
                ),
                "/command" => handle_command(&mut stream, &req.path, &command_tx),
                _ => serve_404(&mut stream),
            }
        }
        Err(e) => warn!("Request parse error: {}", e),
    }
}

impl WsServer {
    pub fn new(
        frame_rx: Receiver<FretboardFrame>,
        command_tx: Sender<ShellEvent>,
        addr: String,
    ) -> Self {
        Self {
            frame_rx,
            command_tx,
            addr,
        }
    }

    /// Bind the configured address and serve until the frame channel closes.
    pub fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).map_err(|e| {
            error!("Server failed to bind {}: {}", self.addr, e);
            e
        })?;
        self.serve(listener)
    }

    /// Serve on an already bound listener.
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Server listening on http://{}", addr);

        let shared: SharedBroadcast = Arc::new(Mutex::new(Broadcast::default()));

        let accept_shared = shared.clone();
        let command_tx = self.command_tx.clone();
        thread::Builder::new().name("ws-accept".into()).spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let shared = accept_shared.clone();
                        let tx = command_tx.clone();
                        // HTTP connections close immediately; WS connections
                        // get moved to the client list
                        thread::spawn(move || handle_connection(stream, shared, tx));
                    }
                    Err(e) => warn!("TCP accept error: {}", e),
                }
            }
        })?;

        for frame in self.frame_rx.iter() {
            let json = match serde_json::to_string(&frame) {
                Ok(j) => j,
                Err(e) => {
                    warn!("JSON serialize error: {}", e);
                    continue;
                }
            };

            let mut b = lock(&shared);
            for client in b.clients.iter_mut() {
                client.send_text(&json);
            }
            b.clients.retain(|c| c.alive);
            b.latest = Some(json);
        }
        info!("Frame stream closed, server stopping");
        Ok(())
    }
}
