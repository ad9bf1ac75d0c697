//! `warden`: a signing agent speaking newline delimited JSON over stdio.
//!
//! Every stdin line is a remote call, `{"approve": id}` or `{"deny": id}`. Host messages are
//! written to stdout, one per line. Logs go to stderr.

#[macro_use]
extern crate tracing;

use clap::Parser;
use eyre::{Result, WrapErr};
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;
use url::Url;
use warden::{
    HttpTransport, LocalChannel, MemoryStore, RequestProcessor, Session, Transport, WardenConfig,
    core::{ChainConfig, ChainFamily, ChainId, UiMode},
    rpc::{RemoteCall, RequestId},
};

/// Custodial signing agent.
#[derive(Clone, Debug, Parser)]
#[command(name = "warden", version, next_display_order = None)]
struct Args {
    /// Path to the config file.
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// The session's private key.
    #[arg(long, env = "WARDEN_PRIVATE_KEY", hide_env_values = true, value_name = "KEY")]
    private_key: String,

    /// UI mode, decides which calls need approval.
    #[arg(long, value_name = "MODE")]
    mode: Option<UiMode>,

    /// Chain family of the key.
    #[arg(long, value_name = "FAMILY")]
    family: Option<ChainFamily>,

    /// Chain to bind to at startup.
    #[arg(long, value_name = "CHAIN_ID")]
    chain: Option<ChainId>,

    /// RPC endpoint of `--chain`. Becomes the primary endpoint if the chain is configured,
    /// otherwise the chain is added with it.
    #[arg(long, requires = "chain", value_name = "URL")]
    rpc_url: Option<Url>,
}

impl Args {
    /// Loads the config file and applies the command line overrides.
    fn config(&self) -> Result<WardenConfig> {
        let mut config = WardenConfig::load(self.config.as_deref())
            .wrap_err("failed to load the configuration")?;
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(family) = self.family {
            config.family = family;
        }
        if let Some(chain) = &self.chain {
            config.default_chain = Some(chain.clone());
            if let Some(url) = &self.rpc_url {
                match config.networks.iter_mut().find(|network| &network.chain_id == chain) {
                    Some(network) => {
                        network.rpc_urls.retain(|existing| existing != url);
                        network.rpc_urls.insert(0, url.clone());
                    }
                    None => {
                        let name = format!("{} {chain}", config.family);
                        config.networks.push(ChainConfig::new(chain.clone(), name, url.clone()));
                    }
                }
            }
        }
        Ok(config)
    }
}

/// A line read from stdin.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Approve { approve: RequestId },
    Deny { deny: RequestId },
    Call(RemoteCall),
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.config()?;
    init_tracing(&config.log);
    run(args, config)
}

fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn run(args: Args, config: WardenConfig) -> Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.timeout())?);
    let store = Arc::new(MemoryStore::new());
    let session = Session::from_config(&config, &args.private_key, transport, store)
        .wrap_err("failed to start the session")?;
    let session = Arc::new(session);
    let account = session.router().account().await;
    info!(
        target: "warden",
        family = %config.family,
        mode = %config.mode,
        address = account.address(),
        "session started"
    );

    let (channel, mut outbound) = LocalChannel::pair();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = outbound.recv().await {
            let mut line = serde_json::to_vec(&message)?;
            line.push(b'\n');
            stdout.write_all(&line).await?;
            stdout.flush().await?;
        }
        eyre::Ok(())
    });
    session.attach(Arc::new(channel)).await;
    let processor = tokio::spawn(RequestProcessor::new(Arc::clone(&session)).run());

    serve(&session, BufReader::new(tokio::io::stdin())).await?;

    processor.abort();
    let _ = processor.await;
    // the channel closes with the last session handle, which ends the writer
    drop(session);
    writer.await.wrap_err("stdout writer panicked")??;
    Ok(())
}

/// Feeds input lines to the session until EOF, then answers every call still in the queue.
///
/// Undecided calls are denied at EOF since no decision can arrive anymore.
async fn serve<R: AsyncBufRead + Unpin>(session: &Arc<Session>, input: R) -> Result<()> {
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(line) {
            Ok(Inbound::Approve { approve }) => {
                let _ = session.approve(approve);
            }
            Ok(Inbound::Deny { deny }) => {
                let _ = session.deny(deny);
            }
            Ok(Inbound::Call(call)) => {
                session.on_call(call).await;
            }
            Err(err) => warn!(target: "warden", %err, "ignoring malformed line"),
        }
    }

    debug!(target: "warden", "stdin closed, shutting down");
    for pending in session.snapshot().pending {
        let _ = session.deny(pending.id());
    }
    let replies = RequestProcessor::new(Arc::clone(session)).drain().await;
    debug!(target: "warden", count = replies.len(), "answered remaining calls");
    Ok(())
}
