//! Scripted NNTP server on a local TLS port
//!
//! Speaks enough of RFC 3977 / 4643 for the engine: greeting, AUTHINFO
//! USER/PASS, GROUP, XOVER and QUIT. Every received command is logged so
//! tests can assert on the conversation. Connections use implicit TLS with
//! a self-signed certificate for `localhost` / `127.0.0.1`.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::DateTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

const CERTIFICATE: &[u8] = include_bytes!("certs/localhost.crt");
const PRIVATE_KEY: &[u8] = include_bytes!("certs/localhost.key");

pub const USERNAME: &str = "user";
pub const PASSWORD: &str = "secret";

/// One article as listed in overview responses
#[derive(Clone, Debug)]
pub struct TestArticle {
    pub number: u64,
    pub timestamp: i64,
    pub subject: String,
    pub from: String,
    pub bytes: u64,
}

impl TestArticle {
    pub fn new(number: u64, timestamp: i64, subject: &str) -> Self {
        Self {
            number,
            timestamp,
            subject: subject.to_string(),
            from: "poster <poster@example.com>".to_string(),
            bytes: 750_000,
        }
    }

    fn overview_line(&self) -> String {
        let date = DateTime::from_timestamp(self.timestamp, 0)
            .map(|d| format!("{} (UTC)", d.to_rfc2822()))
            .unwrap_or_default();
        format!(
            "{}\t{}\t{}\t{}\t<part{}@example.com>\t\t{}\t1",
            self.number, self.subject, self.from, date, self.number, self.bytes
        )
    }
}

#[derive(Default)]
struct ServerState {
    groups: Mutex<HashMap<String, BTreeMap<u64, TestArticle>>>,
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
    open: AtomicUsize,
    max_open: AtomicUsize,
}

/// Handle to a running test server; the listener stops when it is dropped
pub struct NntpTestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl Drop for NntpTestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl NntpTestServer {
    /// Start a server answering every command
    pub async fn start() -> Self {
        Self::spawn(false).await
    }

    /// Start a server that accepts connections but never sends a greeting
    pub async fn silent() -> Self {
        Self::spawn(true).await
    }

    async fn spawn(silent: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        let acceptor = tls_acceptor();

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let state = Arc::clone(&accept_state);
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if silent {
                        // hold the socket open without a handshake or greeting
                        let _stream = stream;
                        return std::future::pending::<()>().await;
                    }
                    let Ok(stream) = acceptor.accept(stream).await else {
                        return;
                    };
                    let now = state.open.fetch_add(1, Ordering::SeqCst) + 1;
                    state.max_open.fetch_max(now, Ordering::SeqCst);
                    serve(stream, &state).await.ok();
                    state.open.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        Self { addr, state, task }
    }

    pub fn with_group(self, name: &str, articles: Vec<TestArticle>) -> Self {
        self.state
            .groups
            .lock()
            .unwrap()
            .insert(name.to_string(), articles.into_iter().map(|a| (a.number, a)).collect());
        self
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of accepted TCP connections
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open sessions
    pub fn max_open(&self) -> usize {
        self.state.max_open.load(Ordering::SeqCst)
    }

    /// All commands received so far, passwords masked
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }
}

fn tls_acceptor() -> TlsAcceptor {
    let certificate = CertificateDer::from_pem_slice(CERTIFICATE).unwrap();
    let key = PrivateKeyDer::from_pem_slice(PRIVATE_KEY).unwrap();
    let config = tokio_rustls::rustls::ServerConfig::builder_with_provider(Arc::new(
        ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![certificate], key)
    .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

async fn serve<S>(stream: S, state: &ServerState) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    writer.write_all(b"200 test server ready\r\n").await?;
    writer.flush().await?;

    let mut user: Option<String> = None;
    let mut authenticated = false;
    let mut group: Option<String> = None;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_string();
        let mut words = command.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_uppercase();

        let logged = if command.to_ascii_uppercase().starts_with("AUTHINFO PASS") {
            "AUTHINFO PASS ****".to_string()
        } else {
            command.clone()
        };
        state.commands.lock().unwrap().push(logged);

        let response = match verb.as_str() {
            "AUTHINFO" => match (
                words.next().map(str::to_ascii_uppercase).as_deref(),
                words.next(),
            ) {
                (Some("USER"), Some(name)) => {
                    user = Some(name.to_string());
                    "381 password required\r\n".to_string()
                }
                (Some("PASS"), Some(pass)) => {
                    if user.as_deref() == Some(USERNAME) && pass == PASSWORD {
                        authenticated = true;
                        "281 authentication accepted\r\n".to_string()
                    } else {
                        "481 authentication rejected\r\n".to_string()
                    }
                }
                _ => "501 syntax error\r\n".to_string(),
            },
            "GROUP" if !authenticated => "480 authentication required\r\n".to_string(),
            "GROUP" => {
                let name = words.next().unwrap_or_default().to_string();
                let groups = state.groups.lock().unwrap();
                match groups.get(&name) {
                    Some(articles) => {
                        let first = articles.keys().next().copied().unwrap_or(1);
                        let last = articles.keys().next_back().copied().unwrap_or(0);
                        group = Some(name.clone());
                        format!("211 {} {first} {last} {name}\r\n", articles.len())
                    }
                    None => "411 no such newsgroup\r\n".to_string(),
                }
            }
            "XOVER" => match &group {
                None => "412 no newsgroup selected\r\n".to_string(),
                Some(name) => {
                    let (first, last) = parse_range(words.next().unwrap_or_default());
                    let groups = state.groups.lock().unwrap();
                    let lines: Vec<String> = groups
                        .get(name)
                        .map(|articles| {
                            if first > last {
                                return Vec::new();
                            }
                            articles
                                .range(first..=last)
                                .map(|(_, a)| a.overview_line())
                                .collect()
                        })
                        .unwrap_or_default();
                    if lines.is_empty() {
                        "420 no articles in range\r\n".to_string()
                    } else {
                        let mut response = "224 overview information follows\r\n".to_string();
                        for line in lines {
                            response.push_str(&line);
                            response.push_str("\r\n");
                        }
                        response.push_str(".\r\n");
                        response
                    }
                }
            },
            "QUIT" => {
                writer.write_all(b"205 closing connection\r\n").await?;
                writer.flush().await?;
                return writer.shutdown().await;
            }
            _ => "500 unknown command\r\n".to_string(),
        };
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
    }
}

fn parse_range(range: &str) -> (u64, u64) {
    let mut bounds = range.splitn(2, '-');
    let first = bounds.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    let last = bounds.next().and_then(|l| l.parse().ok()).unwrap_or(first);
    (first, last)
}
