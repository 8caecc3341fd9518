use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use zeroize::Zeroizing;

use crate::clipboard::SystemClipboard;
use crate::config::Config;
use crate::crypto::Cipher;
use crate::relay::{RelayServer, RelaySettings};
use crate::sync::SyncEngine;
use crate::transport;
use crate::Result;

#[derive(Parser)]
#[command(name = "sync-clipboard")]
#[command(about = "Encrypted clipboard synchronization between two machines")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the relay server that forwards frames between clients")]
    Server {
        /// Address to bind to [default: 0.0.0.0]
        #[arg(short, long)]
        address: Option<String>,

        /// Port to listen on [default: 7878]
        #[arg(short, long)]
        port: Option<u16>,

        /// Shared secret used to derive the encryption key
        #[arg(short, long)]
        key: String,
    },

    #[command(about = "Connect to a relay or peer and sync the clipboard")]
    Client {
        /// Address to connect to [default: 127.0.0.1]
        #[arg(short, long)]
        address: Option<String>,

        /// Port to connect to [default: 7878]
        #[arg(short, long)]
        port: Option<u16>,

        /// Shared secret used to derive the encryption key
        #[arg(short, long)]
        key: String,
    },

    #[command(about = "Wait for one peer to connect and sync the clipboard with it")]
    Listen {
        /// Address to bind to [default: 127.0.0.1]
        #[arg(short, long)]
        address: Option<String>,

        /// Port to listen on [default: 7878]
        #[arg(short, long)]
        port: Option<u16>,

        /// Shared secret used to derive the encryption key
        #[arg(short, long)]
        key: String,
    },

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Generate example configuration")]
    Init {
        #[arg(long)]
        force: bool,
    },
}

pub struct CliHandler {
    config: Config,
    config_path: Option<PathBuf>,
}

impl CliHandler {
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Server { address, port, key } => {
                let address = address.unwrap_or_else(|| self.config.relay.bind_address.clone());
                let port = port.unwrap_or(self.config.network.port);
                self.run_relay(&address, port, Zeroizing::new(key)).await
            }
            Commands::Client { address, port, key } => {
                let address = address.unwrap_or_else(|| self.config.network.address.clone());
                let port = port.unwrap_or(self.config.network.port);
                self.run_client(&address, port, Zeroizing::new(key)).await
            }
            Commands::Listen { address, port, key } => {
                let address = address.unwrap_or_else(|| self.config.network.address.clone());
                let port = port.unwrap_or(self.config.network.port);
                self.run_listener(&address, port, Zeroizing::new(key)).await
            }
            Commands::Config { action } => self.handle_config_action(action),
        }
    }

    async fn run_relay(&self, address: &str, port: u16, key: Zeroizing<String>) -> Result<()> {
        let cipher = Arc::new(Cipher::from_passphrase(&key));
        let settings = RelaySettings {
            channel_capacity: self.config.relay.channel_capacity,
            max_frame_size: self.config.sync.max_frame_size,
        };

        let server = RelayServer::bind(address, port, cipher, settings).await?;
        server.run().await?;
        Ok(())
    }

    async fn run_client(&self, address: &str, port: u16, key: Zeroizing<String>) -> Result<()> {
        let engine = self.build_engine(&key)?;
        let stream = transport::connect(address, port).await?;
        info!("Connected to {}:{}", address, port);

        engine.run(stream).await?;
        info!("Connection closed");
        Ok(())
    }

    async fn run_listener(&self, address: &str, port: u16, key: Zeroizing<String>) -> Result<()> {
        let engine = self.build_engine(&key)?;
        let listener = transport::bind(address, port).await?;
        info!("Waiting for a peer on {}", listener.local_addr()?);

        let (stream, peer) = transport::accept(&listener).await?;
        drop(listener);
        info!("Peer connected: {}", peer);

        engine.run(stream).await?;
        info!("Connection closed");
        Ok(())
    }

    fn build_engine(&self, key: &str) -> Result<SyncEngine<SystemClipboard>> {
        let cipher = Arc::new(Cipher::from_passphrase(key));
        info!("Key fingerprint: {}", cipher.fingerprint());

        let clipboard = Arc::new(SystemClipboard::new()?);
        Ok(SyncEngine::new(clipboard, cipher, self.config.sync_config()))
    }

    fn handle_config_action(&self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                println!("Current Configuration:");
                print!("{}", self.config.to_toml()?);
            }
            ConfigAction::Init { force } => {
                let path = Config::write_example(self.config_path.as_deref(), force)?;
                println!("Example configuration written to {}", path.display());
            }
        }
        Ok(())
    }
}
